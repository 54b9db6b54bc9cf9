//! Crate error types

use thiserror::Error;

/// Errors produced by model construction, training, decoding, and persistence
#[derive(Error, Debug)]
pub enum HmmError {
    #[error("dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("state {state} received no responsibility during re-estimation")]
    DegenerateState { state: usize },

    #[error("sequence likelihood underflowed to zero")]
    Underflow,

    #[error("incompatible model format version: found {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, HmmError>;
