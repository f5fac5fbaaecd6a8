//! The stateful passes that make up the retune pipeline: channel filtering,
//! lossless/lossy redundancy elimination, clock-domain transposition, and
//! tick quantization.
//!
//! Grounded on `vgmconverter.py`'s `optimize()`, `sort_command_list()`/
//! `optimize2()`, `transpose()`, and `quantize()` for algorithm shape.

use log::debug;

use crate::errors::{VgmError, VgmResult};
use crate::event::Event;
use crate::psg::{self, LatchKind};

/// Drop every `Write` addressed to `channel` (0..=3). Non-`Write` events
/// (waits, end) always pass through untouched.
pub fn filter_channel(events: &[Event], channel: u8) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    let mut latched_channel = 0u8;

    for event in events {
        match event {
            Event::Write { byte } => {
                let (ch, kind) = psg::decode(*byte, latched_channel);
                if matches!(kind, LatchKind::VolumeLatch | LatchKind::ToneLatchLow4) {
                    latched_channel = ch;
                }
                if ch != channel {
                    out.push(*event);
                }
            }
            other => out.push(*other),
        }
    }

    debug!(
        "filter_channel({channel}): {} -> {} events",
        events.len(),
        out.len()
    );
    out
}

/// Lossless redundancy elimination: drop a volume or tone write that would
/// leave the channel's register at the value it already holds.
pub fn optimize(events: &[Event]) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    let mut latched_channel = 0u8;
    let mut cached_tone: [Option<u16>; 4] = [None, None, None, None];
    let mut cached_volume: [Option<u8>; 4] = [None, None, None, None];

    let mut i = 0;
    while i < events.len() {
        match events[i] {
            Event::Write { byte } => {
                let (ch, kind) = psg::decode(byte, latched_channel);
                let idx = ch as usize;

                match kind {
                    LatchKind::VolumeLatch => {
                        latched_channel = ch;
                        let volume = (byte & 0x0f) as u8;
                        if cached_volume[idx] != Some(volume) {
                            cached_volume[idx] = Some(volume);
                            out.push(events[i]);
                        }
                        i += 1;
                    }
                    LatchKind::ToneLatchLow4 => {
                        latched_channel = ch;
                        let (new_tone, consumed) = paired_tone_value(events, i, byte, cached_tone[idx]);
                        if cached_tone[idx] != Some(new_tone) {
                            cached_tone[idx] = Some(new_tone);
                            out.push(events[i]);
                            if consumed == 2 {
                                out.push(events[i + 1]);
                            }
                        }
                        i += consumed;
                    }
                    LatchKind::ToneDataHigh6 => {
                        // Orphan data byte (no preceding latch in this slice): tolerate.
                        out.push(events[i]);
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    debug!("optimize: {} -> {} events", events.len(), out.len());
    out
}

/// Per-tick reorder and dedup: within each run of `Write` events bounded by
/// wait/end events, keep only the last surviving volume and tone write per
/// channel, volumes before tones.
pub fn optimize2(events: &[Event]) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    let mut latched_channel = 0u8;
    let mut last_volume: [Option<Vec<Event>>; 4] = [None, None, None, None];
    let mut last_tone: [Option<Vec<Event>>; 4] = [None, None, None, None];

    let mut i = 0;
    while i < events.len() {
        match events[i] {
            Event::Write { byte } => {
                let (ch, kind) = psg::decode(byte, latched_channel);
                let idx = ch as usize;
                match kind {
                    LatchKind::VolumeLatch => {
                        latched_channel = ch;
                        last_volume[idx] = Some(vec![events[i]]);
                        i += 1;
                    }
                    LatchKind::ToneLatchLow4 => {
                        latched_channel = ch;
                        let mut unit = vec![events[i]];
                        let mut consumed = 1;
                        if let Some(Event::Write { byte: next }) = events.get(i + 1) {
                            if next & 0x80 == 0 {
                                unit.push(events[i + 1]);
                                consumed = 2;
                            }
                        }
                        last_tone[idx] = Some(unit);
                        i += consumed;
                    }
                    LatchKind::ToneDataHigh6 => {
                        out.push(events[i]);
                        i += 1;
                    }
                }
            }
            other => {
                flush_segment(&mut out, &mut last_volume, &mut last_tone);
                out.push(other);
                i += 1;
            }
        }
    }
    flush_segment(&mut out, &mut last_volume, &mut last_tone);

    debug!("optimize2: {} -> {} events", events.len(), out.len());
    out
}

fn flush_segment(
    out: &mut Vec<Event>,
    last_volume: &mut [Option<Vec<Event>>; 4],
    last_tone: &mut [Option<Vec<Event>>; 4],
) {
    for slot in last_volume.iter_mut() {
        if let Some(unit) = slot.take() {
            out.extend(unit);
        }
    }
    for slot in last_tone.iter_mut() {
        if let Some(unit) = slot.take() {
            out.extend(unit);
        }
    }
}

/// Reconstruct the 10-bit register a tone latch byte (plus its optional
/// paired data byte) would set, given the channel's previously cached value.
/// Returns the new value and how many events (1 or 2) were consumed.
fn paired_tone_value(
    events: &[Event],
    i: usize,
    latch_byte: u8,
    cached: Option<u16>,
) -> (u16, usize) {
    let low4 = psg::low4(latch_byte);
    if let Some(Event::Write { byte: next }) = events.get(i + 1) {
        if next & 0x80 == 0 {
            return ((psg::high6(*next) << 4) | low4, 2);
        }
    }
    let high6 = cached.unwrap_or(0) >> 4;
    ((high6 << 4) | low4, 1)
}

/// Retune every tone/periodic-noise register in place for a new chip clock.
/// A no-op if `source_clock == target_clock`.
pub fn transpose(events: &mut [Event], source_clock: u32, target_clock: u32) {
    if source_clock == target_clock {
        return;
    }

    let mut latched_channel = 0u8;
    let mut latched_tone: [u16; 4] = [0; 4];
    let mut latched_volume: [u8; 4] = [0; 4];
    let mut ch2_last: Option<(usize, Option<usize>)> = None;

    let mut i = 0;
    while i < events.len() {
        let byte = match events[i] {
            Event::Write { byte } => byte,
            _ => {
                i += 1;
                continue;
            }
        };

        let (ch, kind) = psg::decode(byte, latched_channel);
        let idx = ch as usize;

        match kind {
            LatchKind::VolumeLatch => {
                latched_channel = ch;
                latched_volume[idx] = (byte & 0x0f) as u8;
                i += 1;
            }
            LatchKind::ToneLatchLow4 => {
                latched_channel = ch;
                let low4 = psg::low4(byte);
                let data_idx = paired_data_index(events, i);
                let high6 = match data_idx {
                    Some(j) => match events[j] {
                        Event::Write { byte: next } => psg::high6(next),
                        _ => unreachable!(),
                    },
                    None => latched_tone[idx] >> 4,
                };
                let raw_tone = (high6 << 4) | low4;

                if ch == 3 {
                    latched_tone[3] = raw_tone;
                    if raw_tone & 0b11 == 0b11 && latched_volume[2] == 15 {
                        if let Some((latch_idx, ch2_data_idx)) = ch2_last {
                            let retuned =
                                psg::retune(source_clock, target_clock, latched_tone[2], true);
                            rewrite_tone(events, latch_idx, ch2_data_idx, retuned);
                            // latched_tone[2] stays the raw merged tone, as in the source:
                            // a later periodic-noise retune must scale from the original
                            // value, not from something already retuned.
                        }
                    }
                    i = data_idx.map_or(i + 1, |j| j + 1);
                    continue;
                }

                let periodic =
                    ch == 2 && latched_volume[2] == 15 && (latched_tone[3] & 0b11 == 0b11);
                let retuned = psg::retune(source_clock, target_clock, raw_tone, periodic);
                rewrite_tone(events, i, data_idx, retuned);
                latched_tone[idx] = raw_tone;

                if ch == 2 {
                    ch2_last = Some((i, data_idx));
                }

                i = data_idx.map_or(i + 1, |j| j + 1);
            }
            LatchKind::ToneDataHigh6 => {
                i += 1;
            }
        }
    }

    debug!("transpose: {source_clock} Hz -> {target_clock} Hz");
}

fn paired_data_index(events: &[Event], latch_idx: usize) -> Option<usize> {
    match events.get(latch_idx + 1) {
        Some(Event::Write { byte }) if byte & 0x80 == 0 => Some(latch_idx + 1),
        _ => None,
    }
}

fn rewrite_tone(events: &mut [Event], latch_idx: usize, data_idx: Option<usize>, new_tone: u16) {
    if let Event::Write { byte } = &mut events[latch_idx] {
        *byte = (*byte & 0xF0) | (new_tone & 0x0F) as u8;
    }
    if let Some(j) = data_idx {
        if let Event::Write { byte } = &mut events[j] {
            *byte = (*byte & 0xC0) | ((new_tone >> 4) & 0x3F) as u8;
        }
    }
}

/// Quantize an irregular event list onto a fixed tick grid of `44100 / rate_hz`
/// samples, grouping all writes that fall within the same tick.
pub fn quantize(events: &[Event], rate_hz: u32) -> VgmResult<Vec<Event>> {
    if rate_hz == 0 || 44100 % rate_hz != 0 {
        return Err(VgmError::BadQuantizationRate { rate: rate_hz });
    }
    let interval = (44100 / rate_hz) as u64;

    let mut out = Vec::with_capacity(events.len());
    let mut pending: Vec<Event> = Vec::new();
    let mut sample_now: u64 = 0;
    let mut tick_boundary: u64 = interval;
    let mut last_emitted_boundary: u64 = 0;

    for event in events {
        match event {
            Event::Write { .. } => pending.push(*event),
            Event::WriteDual { .. } => {}
            Event::End => {
                out.extend(pending.drain(..));
                out.push(Event::End);
                return Ok(out);
            }
            wait_event => {
                sample_now += wait_event.wait_samples() as u64;
                while sample_now >= tick_boundary {
                    let delta = tick_boundary - last_emitted_boundary;
                    emit_wait_chunks(&mut out, delta);
                    out.extend(pending.drain(..));
                    last_emitted_boundary = tick_boundary;
                    tick_boundary += interval;
                }
            }
        }
    }

    if !pending.is_empty() {
        out.extend(pending.drain(..));
    }
    out.push(Event::End);

    debug!("quantize({rate_hz}): {} -> {} events", events.len(), out.len());
    Ok(out)
}

/// Emit `samples` worth of wait, preferring the canonical 735/882 opcodes
/// when they divide evenly, otherwise falling back to explicit waits capped
/// at 65535 samples each.
fn emit_wait_chunks(out: &mut Vec<Event>, mut samples: u64) {
    while samples > 0 {
        if samples % 735 == 0 {
            for _ in 0..(samples / 735) {
                out.push(Event::Wait60);
            }
            return;
        }
        if samples % 882 == 0 {
            for _ in 0..(samples / 882) {
                out.push(Event::Wait50);
            }
            return;
        }
        let chunk = samples.min(65535);
        out.push(Event::Wait {
            samples: chunk as u16,
        });
        samples -= chunk;
    }
}
