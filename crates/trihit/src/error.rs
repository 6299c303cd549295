//! Error types for trihit.

use thiserror::Error;
use trihit_compute::GpuError;

/// A flat buffer that does not hold a whole number of records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("buffer of {len} floats is not a multiple of the {stride}-float record stride")]
pub struct CodecError {
    /// Buffer length in floats.
    pub len: usize,
    /// Record stride in floats.
    pub stride: usize,
}

/// Errors that can occur while running intersections.
#[derive(Error, Debug)]
pub enum TrihitError {
    /// Malformed flat buffer.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The accelerator failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Invalid run settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Plot serialization failed.
    #[error("failed to serialize plot: {0}")]
    Plot(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trihit operations.
pub type Result<T> = std::result::Result<T, TrihitError>;
