use thiserror::Error;

/// Error taxonomy for the VGM/PSG retune pipeline.
#[derive(Debug, Error)]
pub enum VgmError {
    #[error("input is not a VGM container (bad magic)")]
    NotVgm,

    #[error("malformed VGM data: {0}")]
    Malformed(String),

    #[error("unsupported VGM version: {version:#06x}")]
    UnsupportedVersion { version: u32 },

    #[error("input is not a single-chip SN76489 stream: {reason}")]
    NotPsgOnly { reason: String },

    #[error("quantization rate {rate} does not evenly divide 44100")]
    BadQuantizationRate { rate: u32 },

    #[error("command stream error: {0}")]
    StreamError(String),
}

pub type VgmResult<T> = Result<T, VgmError>;
