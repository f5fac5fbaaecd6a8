use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::errors::{VgmError, VgmResult};
use crate::utils::VGM_MAGIC;

/// Accepted VGM versions, compared as raw little-endian `u32` values (not BCD).
pub const SUPPORTED_VERSIONS: [u32; 6] = [0x0101, 0x0110, 0x0150, 0x0151, 0x0160, 0x0161];

pub const OUTPUT_VERSION: u32 = 0x0151;

const HEADER_SIZE: usize = 0x40;

/// Named SN76489 clock domains this pipeline knows how to retune between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockProfile {
    Ntsc,
    Pal,
    Bbc,
}

impl ClockProfile {
    pub fn clock_hz(self) -> u32 {
        match self {
            ClockProfile::Ntsc => 3_579_545,
            ClockProfile::Pal => 4_433_619,
            ClockProfile::Bbc => 4_000_000,
        }
    }

    pub fn feedback(self) -> u16 {
        match self {
            ClockProfile::Ntsc | ClockProfile::Pal => 0x0006,
            ClockProfile::Bbc => 0x0003,
        }
    }

    pub fn shift_register_width(self) -> u8 {
        match self {
            ClockProfile::Ntsc | ClockProfile::Pal => 16,
            ClockProfile::Bbc => 15,
        }
    }
}

/// The subset of VGM header fields relevant to a single-chip SN76489 stream.
///
/// Offsets (`gd3_offset`, `vgm_data_offset`) are stored resolved to absolute
/// positions; the on-wire delta-from-slot encoding is handled entirely by
/// `from_bytes`/`write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderData {
    pub version: u32,
    pub sn76489_clock: u32,
    pub gd3_offset: u32,
    pub total_samples: u32,
    pub loop_offset: u32,
    pub loop_samples: u32,
    pub rate: u32,
    pub sn76489_feedback: u16,
    pub sn76489_shift_register_width: u8,
    pub vgm_data_offset: u32,
}

impl HeaderData {
    /// True if the dual-chip bit (bit 30) of the stored SN76489 clock is set.
    pub fn is_dual_chip(&self) -> bool {
        self.sn76489_clock & (1 << 30) != 0
    }

    pub fn clear_dual_chip(&mut self) {
        self.sn76489_clock &= !(1 << 30);
    }

    pub fn apply_clock_profile(&mut self, profile: ClockProfile) {
        self.sn76489_clock = profile.clock_hz();
        self.sn76489_feedback = profile.feedback();
        self.sn76489_shift_register_width = profile.shift_register_width();
    }

    pub fn from_bytes(data: &[u8]) -> VgmResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(VgmError::Malformed("VGM header shorter than 64 bytes".into()));
        }
        if data[0..4] != VGM_MAGIC {
            return Err(VgmError::NotVgm);
        }

        let mut buf = &data[4..];
        let _eof_offset = buf.get_u32_le();
        let version = buf.get_u32_le();
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(VgmError::UnsupportedVersion { version });
        }

        let sn76489_clock = buf.get_u32_le();
        let ym2413_clock = buf.get_u32_le();
        let gd3_delta = buf.get_u32_le();
        let total_samples = buf.get_u32_le();
        let loop_delta = buf.get_u32_le();
        let loop_samples = buf.get_u32_le();
        let rate = buf.get_u32_le();
        let sn76489_feedback = buf.get_u16_le();
        let sn76489_shift_register_width = buf.get_u8();
        let _unused = buf.get_u8();
        let ym2612_clock = buf.get_u32_le();
        let ym2151_clock = buf.get_u32_le();
        let vgm_data_delta = buf.get_u32_le();

        if sn76489_clock & 0x3FFF_FFFF == 0 {
            return Err(VgmError::NotPsgOnly {
                reason: "sn76489_clock is zero".into(),
            });
        }
        if ym2413_clock != 0 || ym2612_clock != 0 || ym2151_clock != 0 {
            return Err(VgmError::NotPsgOnly {
                reason: "header declares a second sound chip clock".into(),
            });
        }

        let gd3_offset = if gd3_delta == 0 {
            0
        } else {
            0x14 + gd3_delta
        };
        let vgm_data_offset = if vgm_data_delta == 0 {
            0x40
        } else {
            0x34 + vgm_data_delta
        };
        let loop_offset = if loop_delta == 0 { 0 } else { 0x1C + loop_delta };

        Ok(HeaderData {
            version,
            sn76489_clock,
            gd3_offset,
            total_samples,
            loop_offset,
            loop_samples,
            rate,
            sn76489_feedback,
            sn76489_shift_register_width,
            vgm_data_offset,
        })
    }

    /// Serialize the 64-byte VGM 1.51 header. The GD3 delta field is always
    /// written as 0; the caller patches it in once the GD3 block's actual
    /// position in the output buffer is known (`self.gd3_offset` reflects
    /// where the tag was found in the *source* file and is otherwise
    /// meaningless for output).
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(&VGM_MAGIC);
        buf.put_u32_le(0); // eof_offset, patched by the caller once total size is known
        buf.put_u32_le(OUTPUT_VERSION);
        buf.put_u32_le(self.sn76489_clock & !(1 << 30));
        buf.put_u32_le(0); // ym2413_clock
        buf.put_u32_le(0); // gd3_offset, patched by the caller if a GD3 tag is appended
        buf.put_u32_le(self.total_samples);
        buf.put_u32_le(0); // loop_offset: never preserved on emit
        buf.put_u32_le(0); // loop_samples
        buf.put_u32_le(self.rate);
        buf.put_u16_le(self.sn76489_feedback);
        buf.put_u8(self.sn76489_shift_register_width);
        buf.put_u8(0); // reserved
        buf.put_u32_le(0); // ym2612_clock
        buf.put_u32_le(0); // ym2151_clock
        buf.put_u32_le(0x40u32.wrapping_sub(0x34)); // vgm_data_offset delta, data always at 0x40
        buf.put_u32_le(0); // sega_pcm_clock
        buf.put_u32_le(0); // spcm_interface
        debug_assert_eq!(buf.len(), HEADER_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header_bytes(version: u32, sn_clock: u32, other_clock: u32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_slice(&VGM_MAGIC);
        buf.put_u32_le(0); // eof
        buf.put_u32_le(version);
        buf.put_u32_le(sn_clock);
        buf.put_u32_le(other_clock); // ym2413
        buf.put_u32_le(0); // gd3
        buf.put_u32_le(44100); // total_samples
        buf.put_u32_le(0); // loop_offset
        buf.put_u32_le(0); // loop_samples
        buf.put_u32_le(44100); // rate (unused pre-quantize)
        buf.put_u16_le(0x0006); // feedback
        buf.put_u8(16); // shift register width
        buf.put_u8(0);
        buf.put_u32_le(0); // ym2612
        buf.put_u32_le(0); // ym2151
        buf.put_u32_le(0x0C); // vgm_data_offset delta -> 0x40
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.to_vec()
    }

    #[test]
    fn parses_minimal_valid_header() {
        let bytes = sample_header_bytes(0x0151, 3_579_545, 0);
        let header = HeaderData::from_bytes(&bytes).unwrap();
        assert_eq!(header.version, 0x0151);
        assert_eq!(header.sn76489_clock, 3_579_545);
        assert_eq!(header.vgm_data_offset, 0x40);
        assert!(!header.is_dual_chip());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_header_bytes(0x0151, 3_579_545, 0);
        bytes[0] = b'X';
        assert!(matches!(HeaderData::from_bytes(&bytes), Err(VgmError::NotVgm)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let bytes = sample_header_bytes(0x0200, 3_579_545, 0);
        assert!(matches!(
            HeaderData::from_bytes(&bytes),
            Err(VgmError::UnsupportedVersion { version: 0x0200 })
        ));
    }

    #[test]
    fn rejects_multi_chip_streams() {
        let bytes = sample_header_bytes(0x0151, 3_579_545, 3_579_545);
        assert!(matches!(
            HeaderData::from_bytes(&bytes),
            Err(VgmError::NotPsgOnly { .. })
        ));
    }

    #[test]
    fn dual_chip_bit_detected_and_clearable() {
        let bytes = sample_header_bytes(0x0151, 3_579_545 | (1 << 30), 0);
        let mut header = HeaderData::from_bytes(&bytes).unwrap();
        assert!(header.is_dual_chip());
        header.clear_dual_chip();
        assert!(!header.is_dual_chip());
    }

    #[test]
    fn clock_profile_constants_match_known_hardware() {
        assert_eq!(ClockProfile::Ntsc.clock_hz(), 3_579_545);
        assert_eq!(ClockProfile::Bbc.shift_register_width(), 15);
        assert_eq!(ClockProfile::Ntsc.shift_register_width(), 16);
    }
}
