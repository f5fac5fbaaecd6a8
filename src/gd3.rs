use bytes::{BufMut, BytesMut};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::ParserConfig;
use crate::errors::{VgmError, VgmResult};
use crate::utils::{read_u16_cstr, write_u16_cstr};

const GD3_TAG: [u8; 4] = [0x47, 0x64, 0x33, 0x20]; // "Gd3 "
const GD3_VERSION: u32 = 0x0000_0100;
const FIELD_COUNT: usize = 11;

/// The eleven GD3 text fields, in their on-wire order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gd3 {
    pub title_eng: String,
    pub title_jap: String,
    pub game_eng: String,
    pub game_jap: String,
    pub console_eng: String,
    pub console_jap: String,
    pub artist_eng: String,
    pub artist_jap: String,
    pub date: String,
    pub vgm_creator: String,
    pub notes: String,
}

impl Gd3 {
    /// Synthesize a default tag when none is present or the tag is malformed.
    pub fn synthesize_default(fallback_title: &str) -> Self {
        warn!("no usable GD3 tag found, synthesizing a default one");
        Gd3 {
            title_eng: fallback_title.to_string(),
            artist_eng: "Unknown".to_string(),
            ..Default::default()
        }
    }

    /// Parse a GD3 block starting at `offset` in `data` (the absolute header-resolved offset).
    pub fn from_bytes(data: &[u8], offset: usize, config: &ParserConfig) -> VgmResult<Self> {
        if offset == 0 {
            return Ok(Gd3::synthesize_default("unknown"));
        }
        if offset + 12 > data.len() {
            return Err(VgmError::Malformed("GD3 offset past end of file".into()));
        }
        if data[offset..offset + 4] != GD3_TAG {
            return Err(VgmError::Malformed("missing \"Gd3 \" tag".into()));
        }
        let _version = u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap());
        let length = u32::from_le_bytes(data[offset + 8..offset + 12].try_into().unwrap()) as usize;
        config.check_gd3_field_len(length)?;

        let body_start = offset + 12;
        let body_end = body_start
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| VgmError::Malformed("GD3 length overruns buffer".into()))?;

        let mut fields = Vec::with_capacity(FIELD_COUNT);
        let mut pos = body_start;
        while fields.len() < FIELD_COUNT && pos < body_end {
            let (field, next) = read_u16_cstr(data, pos, config.max_gd3_field_len)?;
            fields.push(field);
            pos = next;
        }

        if fields.len() < FIELD_COUNT {
            return Ok(Gd3::synthesize_default("unknown"));
        }

        Ok(Gd3 {
            title_eng: fields[0].clone(),
            title_jap: fields[1].clone(),
            game_eng: fields[2].clone(),
            game_jap: fields[3].clone(),
            console_eng: fields[4].clone(),
            console_jap: fields[5].clone(),
            artist_eng: fields[6].clone(),
            artist_jap: fields[7].clone(),
            date: fields[8].clone(),
            vgm_creator: fields[9].clone(),
            notes: fields[10].clone(),
        })
    }

    /// Serialize as a standalone GD3 block (tag + version + length + fields).
    pub fn to_bytes(&self) -> BytesMut {
        let mut body = BytesMut::new();
        for field in self.fields() {
            write_u16_cstr(&mut body, field);
        }

        let mut out = BytesMut::with_capacity(12 + body.len());
        out.put_slice(&GD3_TAG);
        out.put_u32_le(GD3_VERSION);
        out.put_u32_le(body.len() as u32);
        out.put_slice(&body);
        out
    }

    fn fields(&self) -> [&str; FIELD_COUNT] {
        [
            &self.title_eng,
            &self.title_jap,
            &self.game_eng,
            &self.game_jap,
            &self.console_eng,
            &self.console_jap,
            &self.artist_eng,
            &self.artist_jap,
            &self.date,
            &self.vgm_creator,
            &self.notes,
        ]
    }
}
