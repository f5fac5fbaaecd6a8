use bytes::BufMut;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{VgmError, VgmResult};

/// A single PSG-relevant occurrence in the command stream. Every other VGM
/// opcode (other-chip writes, data blocks, end-of-stream markers for chips we
/// don't model) is consumed during parsing for correct stream traversal but
/// never becomes an `Event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// SN76489 register write (opcode 0x50).
    Write { byte: u8 },
    /// Second-chip SN76489 register write (opcode 0x30); only ever produced
    /// while parsing a dual-chip source, always dropped before output.
    WriteDual { byte: u8 },
    /// Explicit 16-bit little-endian sample wait (opcode 0x61).
    Wait { samples: u16 },
    /// Canonical 735-sample wait, one NTSC frame (opcode 0x62).
    Wait60,
    /// Canonical 882-sample wait, one PAL frame (opcode 0x63).
    Wait50,
    /// Short wait, 1 to 16 samples (opcodes 0x70-0x7f).
    WaitN { n: u8 },
    /// Stream terminator (opcode 0x66).
    End,
}

impl Event {
    pub fn is_write(&self) -> bool {
        matches!(self, Event::Write { .. })
    }

    /// Total sample duration represented by this event, 0 for non-wait events.
    pub fn wait_samples(&self) -> u32 {
        match self {
            Event::Wait { samples } => *samples as u32,
            Event::Wait60 => 735,
            Event::Wait50 => 882,
            Event::WaitN { n } => *n as u32,
            _ => 0,
        }
    }
}

/// Parse the command stream starting at `offset` into a list of `Event`s,
/// stopping at the first `0x66` (End) or end of buffer.
pub fn parse_commands(data: &[u8], offset: usize, dual_chip: bool) -> VgmResult<Vec<Event>> {
    let mut events = Vec::new();
    let mut pos = offset;

    while pos < data.len() {
        let opcode = data[pos];
        pos += 1;

        match opcode {
            0x50 => {
                let byte = take_u8(data, pos)?;
                pos += 1;
                events.push(Event::Write { byte });
            }
            0x30 => {
                let byte = take_u8(data, pos)?;
                pos += 1;
                if dual_chip {
                    events.push(Event::WriteDual { byte });
                }
            }
            0x4f => {
                pos += 1; // stereo mask byte for a chip this pipeline ignores
            }
            0x51..=0x54 => {
                pos += 2;
            }
            0x61 => {
                let samples = take_u16_le(data, pos)?;
                pos += 2;
                events.push(Event::Wait { samples });
            }
            0x62 => events.push(Event::Wait60),
            0x63 => events.push(Event::Wait50),
            0x66 => {
                events.push(Event::End);
                break;
            }
            0x67 => {
                pos += 2; // compatibility byte + data-type byte
                let size = take_u32_le(data, pos)? as usize;
                pos += 4;
                pos = pos
                    .checked_add(size)
                    .filter(|&end| end <= data.len())
                    .ok_or_else(|| VgmError::Malformed("data block overruns buffer".into()))?;
            }
            0x70..=0x7f => {
                events.push(Event::WaitN {
                    n: (opcode & 0x0f) + 1,
                });
            }
            0x80..=0x8f => {
                // DAC stream write + wait, for a chip this pipeline ignores.
            }
            0xe0 => {
                pos += 4;
            }
            other => {
                warn!("unrecognized VGM opcode {:#04x} at offset {}, skipping", other, pos - 1);
            }
        }
    }

    Ok(events)
}

/// Serialize an event list back into a raw VGM command stream. Only the
/// opcodes this pipeline ever retains (`0x50, 0x61, 0x62, 0x63, 0x66,
/// 0x70-0x7f`) are ever produced.
pub fn write_commands(buf: &mut impl BufMut, events: &[Event]) {
    for event in events {
        match event {
            Event::Write { byte } => {
                buf.put_u8(0x50);
                buf.put_u8(*byte);
            }
            Event::WriteDual { .. } => unreachable!("dual-chip events are dropped before output"),
            Event::Wait { samples } => {
                buf.put_u8(0x61);
                buf.put_u16_le(*samples);
            }
            Event::Wait60 => buf.put_u8(0x62),
            Event::Wait50 => buf.put_u8(0x63),
            Event::WaitN { n } => buf.put_u8(0x70 | (n - 1)),
            Event::End => buf.put_u8(0x66),
        }
    }
}

fn take_u8(data: &[u8], pos: usize) -> VgmResult<u8> {
    data.get(pos)
        .copied()
        .ok_or_else(|| VgmError::Malformed("command stream truncated".into()))
}

fn take_u16_le(data: &[u8], pos: usize) -> VgmResult<u16> {
    if pos + 2 > data.len() {
        return Err(VgmError::Malformed("command stream truncated".into()));
    }
    Ok(u16::from_le_bytes([data[pos], data[pos + 1]]))
}

fn take_u32_le(data: &[u8], pos: usize) -> VgmResult<u32> {
    if pos + 4 > data.len() {
        return Err(VgmError::Malformed("command stream truncated".into()));
    }
    Ok(u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn parses_basic_write_wait_end() {
        let data = [0x50, 0x9f, 0x61, 0x10, 0x00, 0x66];
        let events = parse_commands(&data, 0, false).unwrap();
        assert_eq!(
            events,
            vec![
                Event::Write { byte: 0x9f },
                Event::Wait { samples: 16 },
                Event::End,
            ]
        );
    }

    #[test]
    fn drops_dual_chip_writes_when_not_enabled() {
        let data = [0x30, 0x9f, 0x50, 0x80, 0x66];
        let events = parse_commands(&data, 0, false).unwrap();
        assert_eq!(events, vec![Event::Write { byte: 0x80 }, Event::End]);
    }

    #[test]
    fn keeps_dual_chip_writes_when_enabled() {
        let data = [0x30, 0x9f, 0x66];
        let events = parse_commands(&data, 0, true).unwrap();
        assert_eq!(
            events,
            vec![Event::WriteDual { byte: 0x9f }, Event::End]
        );
    }

    #[test]
    fn skips_data_blocks() {
        let mut data = vec![0x67, 0x66, 0x00];
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0xAA; 4]);
        data.push(0x66);
        let events = parse_commands(&data, 0, false).unwrap();
        assert_eq!(events, vec![Event::End]);
    }

    #[test]
    fn canonical_waits_and_short_waits() {
        let data = [0x62, 0x63, 0x70, 0x7f, 0x66];
        let events = parse_commands(&data, 0, false).unwrap();
        assert_eq!(
            events,
            vec![
                Event::Wait60,
                Event::Wait50,
                Event::WaitN { n: 1 },
                Event::WaitN { n: 16 },
                Event::End,
            ]
        );
    }

    #[test]
    fn unrecognized_opcode_is_skipped_not_fatal() {
        let data = [0xAB, 0x66];
        let events = parse_commands(&data, 0, false).unwrap();
        assert_eq!(events, vec![Event::End]);
    }

    #[test]
    fn roundtrip_write_wait_end() {
        let events = vec![
            Event::Write { byte: 0x9f },
            Event::Wait { samples: 735 },
            Event::WaitN { n: 5 },
            Event::End,
        ];
        let mut buf = BytesMut::new();
        write_commands(&mut buf, &events);
        let reparsed = parse_commands(&buf, 0, false).unwrap();
        assert_eq!(events, reparsed);
    }
}
