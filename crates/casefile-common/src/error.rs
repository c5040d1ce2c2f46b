//! Error types shared across the casefile workspace

use thiserror::Error;

/// Result type alias for shared casefile operations
pub type Result<T> = std::result::Result<T, CasefileError>;

#[derive(Error, Debug)]
pub enum CasefileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid source reference: {0}")]
    InvalidSourceRef(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
