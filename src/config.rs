use crate::errors::{VgmError, VgmResult};

/// Resource limits applied while parsing untrusted VGM input.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum number of events to accumulate before giving up.
    pub max_events: usize,

    /// Maximum length, in UTF-16 code units, accepted for a single GD3 field.
    pub max_gd3_field_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_events: 2_000_000,
            max_gd3_field_len: 64 * 1024,
        }
    }
}

impl ParserConfig {
    /// A tighter configuration for parsing input from an untrusted source.
    pub fn security_focused() -> Self {
        Self {
            max_events: 200_000,
            max_gd3_field_len: 4 * 1024,
        }
    }

    pub fn check_event_count(&self, count: usize) -> VgmResult<()> {
        if count > self.max_events {
            return Err(VgmError::Malformed(format!(
                "event count {} exceeds limit {}",
                count, self.max_events
            )));
        }
        Ok(())
    }

    pub fn check_gd3_field_len(&self, len: usize) -> VgmResult<()> {
        if len > self.max_gd3_field_len {
            return Err(VgmError::Malformed(format!(
                "GD3 field length {} exceeds limit {}",
                len, self.max_gd3_field_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_generous() {
        let config = ParserConfig::default();
        assert!(config.max_events >= 1_000_000);
        assert!(config.check_event_count(1000).is_ok());
    }

    #[test]
    fn security_focused_is_stricter() {
        let default = ParserConfig::default();
        let strict = ParserConfig::security_focused();
        assert!(strict.max_events < default.max_events);
        assert!(strict.max_gd3_field_len < default.max_gd3_field_len);
    }

    #[test]
    fn rejects_oversized_counts() {
        let config = ParserConfig::security_focused();
        assert!(config.check_event_count(config.max_events + 1).is_err());
        assert!(config
            .check_gd3_field_len(config.max_gd3_field_len + 1)
            .is_err());
    }
}
