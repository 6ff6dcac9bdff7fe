//! Error types for the dotbeam decoder.
//!
//! Only configuration mistakes, unusable pixel buffers, premature reassembly and
//! capture-source failures are errors. Everything the detection/voting pipeline
//! recovers from on its own is reported as a [`crate::pipeline::TickOutcome`].

use thiserror::Error;

/// Rejected protocol or tuning configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ring count must be at least 1 (got {0})")]
    RingCount(usize),
    #[error("bits per dot must be within 1..=8 (got {0})")]
    BitsPerDot(u8),
    #[error("{bits_per_dot} bits per dot needs {needed} colors but the palette has {available}")]
    PaletteTooSmall {
        bits_per_dot: u8,
        needed: usize,
        available: usize,
    },
    #[error("frame rate must be at least 1 fps")]
    FrameRate,
    #[error("invalid decoder setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    #[error("malformed decoder config")]
    Json(#[from] serde_json::Error),
}

/// Failure to turn dot values back into a frame image.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer than two header bytes worth of bits were available.
    #[error("frame too short: {available_bits} bits available, 16 needed for the header")]
    TooShort { available_bits: usize },
}

/// A pixel buffer that does not match its declared dimensions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("image dimensions must be non-zero (got {width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("RGBA buffer holds {actual} bytes but {width}x{height} needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Reassembly was requested before every frame arrived.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("incomplete data: {received} of {} frames received", .total.map_or_else(|| "?".to_string(), |t| t.to_string()))]
    Incomplete { received: usize, total: Option<u8> },
}

/// Failure of the async scan loop.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The capture source could not deliver frames (permission denied, no device...).
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
