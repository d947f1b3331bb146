//! Error types for the mastering stage

use thiserror::Error;

/// Mastering error type
#[derive(Error, Debug)]
pub enum MasterError {
    /// A DSP primitive rejected the buffer or its parameters
    #[error(transparent)]
    Dsp(#[from] mx_dsp::DspError),

    /// Targets failed validation
    #[error("Invalid targets: {0}")]
    InvalidTargets(String),

    /// Targets JSON could not be parsed at all
    #[error("Malformed targets document: {0}")]
    MalformedTargets(String),
}

/// Result type for mastering operations
pub type MasterResult<T> = Result<T, MasterError>;
