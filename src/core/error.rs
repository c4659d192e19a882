use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovtrailError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Role mismatch: expected {expected}, actual {actual} (session {session_id})")]
    Mismatch {
        expected: String,
        actual: String,
        session_id: String,
    },
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Usage error: {0}")]
    Usage(String),
}

impl GovtrailError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Mismatch { .. } => "mismatch",
            Self::IoError(_) => "io",
            Self::SerializationError(_) => "serialization",
            Self::Usage(_) => "usage",
        }
    }
}
