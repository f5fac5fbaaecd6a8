use crate::errors::{VgmError, VgmResult};
use bytes::{BufMut, BytesMut};
use flate2::read::GzDecoder;
use std::io::Read;

/// Gzip magic bytes (RFC 1952)
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// VGM magic bytes ("Vgm ")
pub const VGM_MAGIC: [u8; 4] = [0x56, 0x67, 0x6d, 0x20];

pub fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0..2] == GZIP_MAGIC
}

pub fn is_vgm(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..4] == VGM_MAGIC
}

/// Detect the container format and return raw VGM bytes, decompressing a
/// gzipped (.vgz) stream if necessary.
pub fn detect_and_decompress(data: &[u8]) -> VgmResult<Vec<u8>> {
    if is_vgm(data) {
        return Ok(data.to_vec());
    }

    if is_gzipped(data) {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| VgmError::Malformed(format!("gzip decompression failed: {e}")))?;

        if !is_vgm(&decompressed) {
            return Err(VgmError::NotVgm);
        }
        return Ok(decompressed);
    }

    Err(VgmError::NotVgm)
}

/// Decode a zero-terminated UTF-16LE run starting at `offset`, returning the
/// decoded string and the offset just past its terminator.
pub fn read_u16_cstr(data: &[u8], offset: usize, max_units: usize) -> VgmResult<(String, usize)> {
    let mut units = Vec::new();
    let mut pos = offset;
    loop {
        if pos + 2 > data.len() {
            return Err(VgmError::Malformed("GD3 field ran past end of buffer".into()));
        }
        let unit = u16::from_le_bytes([data[pos], data[pos + 1]]);
        pos += 2;
        if unit == 0 {
            break;
        }
        if units.len() >= max_units {
            return Err(VgmError::Malformed("GD3 field exceeds configured limit".into()));
        }
        units.push(unit);
    }
    let s = String::from_utf16_lossy(&units);
    Ok((s, pos))
}

pub fn write_u16_cstr(buffer: &mut BytesMut, value: &str) {
    for unit in value.encode_utf16() {
        buffer.put_u16_le(unit);
    }
    buffer.put_u16_le(0);
}

/// Transcode to ASCII for the binary packet format's title/author fields,
/// dropping characters outside the 7-bit range and truncating to `max_len`.
pub fn to_ascii_truncated(value: &str, max_len: usize) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii())
        .take(max_len)
        .collect()
}

/// The final path component of `path`, accepting both `/` and `\` as
/// separators. Returns `path` unchanged if it has no separator.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    #[test]
    fn magic_bytes_detection() {
        let vgm_data = b"Vgm \x00\x00\x00\x00";
        assert!(is_vgm(vgm_data));
        assert!(!is_gzipped(vgm_data));

        let gzip_data = [0x1f, 0x8b, 0x08, 0x00];
        assert!(is_gzipped(&gzip_data));
        assert!(!is_vgm(&gzip_data));
    }

    #[test]
    fn detect_and_decompress_passes_through_vgm() {
        let mut vgm_data = Vec::new();
        vgm_data.extend_from_slice(&VGM_MAGIC);
        vgm_data.extend_from_slice(&[0u8; 60]);
        let result = detect_and_decompress(&vgm_data).unwrap();
        assert_eq!(result, vgm_data);
    }

    #[test]
    fn detect_and_decompress_unwraps_gzip() {
        let mut vgm_data = Vec::new();
        vgm_data.extend_from_slice(&VGM_MAGIC);
        vgm_data.extend_from_slice(&[0u8; 60]);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&vgm_data).unwrap();
        let compressed = encoder.finish().unwrap();

        let result = detect_and_decompress(&compressed).unwrap();
        assert_eq!(result, vgm_data);
    }

    #[test]
    fn detect_and_decompress_rejects_garbage() {
        assert!(matches!(
            detect_and_decompress(b"not vgm at all"),
            Err(VgmError::NotVgm)
        ));
    }

    #[test]
    fn u16_cstr_roundtrip() {
        let mut buf = BytesMut::new();
        write_u16_cstr(&mut buf, "Hello");
        let (s, next) = read_u16_cstr(&buf, 0, 1024).unwrap();
        assert_eq!(s, "Hello");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn ascii_transcode_drops_unmappable() {
        assert_eq!(to_ascii_truncated("Héllo", 100), "Hllo");
        assert_eq!(to_ascii_truncated("abcdef", 3), "abc");
    }

    #[test]
    fn basename_strips_path_components() {
        assert_eq!(basename("songs/track.vgm"), "track.vgm");
        assert_eq!(basename("C:\\songs\\track.vgm"), "track.vgm");
        assert_eq!(basename("f.vgm"), "f.vgm");
    }
}
