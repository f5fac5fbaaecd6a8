use bytes::{BufMut, BytesMut};

use crate::errors::{VgmError, VgmResult};
use crate::event::Event;
use crate::header::HeaderData;
use crate::utils;

const EOF_SENTINEL: u8 = 0xFF;

/// Emit the compact per-tick packet binary format. The event list must
/// already be quantized to `header.rate`: its total wait-sample count has to
/// be an exact multiple of `44100 / header.rate` (individual wait events may
/// still be split across several canonical opcodes smaller than one tick).
///
/// When `author` is blank, the source filename's basename is used instead
/// (matching the GD3 author field's usual fallback).
pub fn write(
    header: &HeaderData,
    events: &[Event],
    title: &str,
    author: &str,
    source_filename: &str,
) -> VgmResult<Vec<u8>> {
    let rate_hz = header.rate;
    if rate_hz == 0 || 44100 % rate_hz != 0 {
        return Err(VgmError::BadQuantizationRate { rate: rate_hz });
    }
    let interval = 44100 / rate_hz;

    let total_wait_samples: u64 = events.iter().map(|e| e.wait_samples() as u64).sum();
    if total_wait_samples % interval as u64 != 0 {
        return Err(VgmError::StreamError(format!(
            "total wait samples {total_wait_samples} is not a multiple of the tick interval {interval}"
        )));
    }

    let packets = split_into_tick_packets(events, interval);
    let packet_count = packets.len() as u16;

    let ascii_title = utils::to_ascii_truncated(title, 254);
    let ascii_author = if author.trim().is_empty() {
        utils::to_ascii_truncated(utils::basename(source_filename), 254)
    } else {
        utils::to_ascii_truncated(author, 254)
    };

    let total_seconds = packet_count as u32 / rate_hz;
    let duration_min = (total_seconds / 60) as u8;
    let duration_sec = (total_seconds % 60) as u8;

    let mut out = BytesMut::new();
    out.put_u8(5); // header_len
    out.put_u8(rate_hz.min(u8::MAX as u32) as u8);
    out.put_u8((packet_count & 0xFF) as u8);
    out.put_u8((packet_count >> 8) as u8);
    out.put_u8(duration_min);
    out.put_u8(duration_sec);

    out.put_u8((ascii_title.len() + 1) as u8);
    out.put_slice(ascii_title.as_bytes());
    out.put_u8(0);

    out.put_u8((ascii_author.len() + 1) as u8);
    out.put_slice(ascii_author.as_bytes());
    out.put_u8(0);

    for packet in &packets {
        out.put_u8(packet.len() as u8);
        out.put_slice(packet);
    }
    out.put_u8(0); // trailing empty packet
    out.put_u8(EOF_SENTINEL);

    Ok(out.to_vec())
}

/// Group PSG register bytes into one record per tick. A wait event's sample
/// count is accumulated against `interval` rather than treated as one tick
/// outright: a single quantized tick can be split across several canonical
/// wait opcodes (e.g. two `Wait60`s at a 1470-sample interval), and those
/// must still collapse back into one packet boundary.
fn split_into_tick_packets(events: &[Event], interval: u32) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut accumulated = 0u32;

    for event in events {
        match event {
            Event::Write { byte } => current.push(*byte),
            Event::WriteDual { .. } => {}
            Event::End => {
                packets.push(std::mem::take(&mut current));
                break;
            }
            wait_event => {
                accumulated += wait_event.wait_samples();
                while accumulated >= interval {
                    packets.push(std::mem::take(&mut current));
                    accumulated -= interval;
                }
            }
        }
    }

    if !current.is_empty() {
        packets.push(current);
    }

    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ClockProfile;

    fn sample_header(rate: u32) -> HeaderData {
        HeaderData {
            version: 0x0151,
            sn76489_clock: ClockProfile::Ntsc.clock_hz(),
            gd3_offset: 0,
            total_samples: 441,
            loop_offset: 0,
            loop_samples: 0,
            rate,
            sn76489_feedback: ClockProfile::Ntsc.feedback(),
            sn76489_shift_register_width: ClockProfile::Ntsc.shift_register_width(),
            vgm_data_offset: 0x40,
        }
    }

    #[test]
    fn rejects_non_quantized_rate() {
        let header = sample_header(4000);
        assert!(write(&header, &[Event::End], "t", "a", "f.vgm").is_err());
    }

    #[test]
    fn rejects_stream_not_on_tick_grid() {
        let header = sample_header(100); // interval = 441
        let events = vec![Event::Wait { samples: 100 }, Event::End];
        assert!(matches!(
            write(&header, &events, "t", "a", "f.vgm"),
            Err(VgmError::StreamError(_))
        ));
    }

    #[test]
    fn emits_header_and_sentinel() {
        let header = sample_header(100);
        let events = vec![
            Event::Write { byte: 0x9f },
            Event::Wait { samples: 441 },
            Event::End,
        ];
        let bytes = write(&header, &events, "Title", "Author", "f.vgm").unwrap();
        assert_eq!(bytes[0], 5);
        assert_eq!(bytes[1], 100);
        assert_eq!(*bytes.last().unwrap(), 0xFF);
        assert_eq!(bytes[bytes.len() - 2], 0); // trailing empty packet
    }

    #[test]
    fn defaults_author_to_source_filename_when_blank() {
        let header = sample_header(100);
        let bytes = write(&header, &[Event::End], "Title", "", "path/to/f.vgm").unwrap();
        // header_len(1) + 5 fixed fields + title_len(1) + "Title"(5) + 0x00(1)
        let author_len_pos = 1 + 5 + 1 + 5 + 1;
        assert_eq!(bytes[author_len_pos], 6); // "f.vgm".len() + 1
        let author_start = author_len_pos + 1;
        assert_eq!(
            &bytes[author_start..author_start + 5],
            b"f.vgm"
        );
        assert_eq!(bytes[author_start + 5], 0);
    }

    #[test]
    fn packet_grouping_matches_tick_boundaries() {
        let events = vec![
            Event::Write { byte: 0x9f },
            Event::Write { byte: 0xbf },
            Event::Wait60,
            Event::Write { byte: 0x8f },
            Event::End,
        ];
        let packets = split_into_tick_packets(&events, 735);
        assert_eq!(packets, vec![vec![0x9f, 0xbf], vec![0x8f]]);
    }

    #[test]
    fn packet_grouping_merges_multi_chunk_ticks() {
        // At a 1470-sample interval, a single quantized tick can be emitted
        // as two Wait60 opcodes; both together must close exactly one packet.
        let events = vec![
            Event::Write { byte: 0x9f },
            Event::Wait60,
            Event::Wait60,
            Event::Write { byte: 0x8f },
            Event::Wait60,
            Event::Wait60,
            Event::End,
        ];
        let packets = split_into_tick_packets(&events, 1470);
        assert_eq!(packets, vec![vec![0x9f], vec![0x8f]]);
    }
}
