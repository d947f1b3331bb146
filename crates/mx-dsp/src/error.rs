//! Error types for the DSP primitives

use thiserror::Error;

/// DSP error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DspError {
    /// Buffer failed entry validation (empty or non-finite samples)
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Parameter outside its valid range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;
