use bytes::{BufMut, BytesMut};

use crate::event::{self, Event};
use crate::gd3::Gd3;
use crate::header::HeaderData;

const HEADER_SIZE: u32 = 0x40;

/// Re-emit a conformant VGM 1.51 container from a header, GD3 tag, and event
/// list. GD3 is written only if it carries any non-default content.
pub fn write(header: &HeaderData, gd3: &Gd3, events: &[Event]) -> Vec<u8> {
    let has_gd3 = gd3_has_content(gd3);

    let mut commands = BytesMut::new();
    event::write_commands(&mut commands, events);

    let mut out = BytesMut::with_capacity(HEADER_SIZE as usize + commands.len() + 256);
    header.write(&mut out);
    out.extend_from_slice(&commands);

    if has_gd3 {
        let gd3_absolute_offset = out.len() as u32;
        out.extend_from_slice(&gd3.to_bytes());
        let gd3_delta = gd3_absolute_offset - 0x14;
        out[0x14..0x18].copy_from_slice(&gd3_delta.to_le_bytes());
    }

    let eof_offset = out.len() as u32 - 4;
    out[4..8].copy_from_slice(&eof_offset.to_le_bytes());

    out.to_vec()
}

fn gd3_has_content(gd3: &Gd3) -> bool {
    !gd3.title_eng.is_empty()
        || !gd3.game_eng.is_empty()
        || !gd3.artist_eng.is_empty()
        || !gd3.notes.is_empty()
}
