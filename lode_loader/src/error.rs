use crate::transform::HEADER_LENGTH;
use thiserror::Error;

/// Failures of the transport itself. All of them are considered transient and retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Resource not found")]
    NotFound,
    #[error("Unexpected response status {0}")]
    Status(u16),
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("Transport dropped the request")]
    Disconnected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The content does not carry the header of this build, never retried
    #[error("Header is wrong, expected {expected:02x?}, found {found:02x?}")]
    CorruptHeader {
        expected: [u8; HEADER_LENGTH],
        found: Vec<u8>,
    },
    #[error("Encryption key must start with 16 hex digits, got {0:?}")]
    InvalidKey(String),
    #[error("Header must be 32 hex digits, got {0:?}")]
    InvalidHeaderHex(String),
}

/// Why a [`crate::LoadUnit`] ended up in the error state
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("Failed to decode {0}")]
    Decode(String),
    #[error("Gave up loading {url} after exhausting retries")]
    ExhaustedRetries { url: String },
}

impl LoadError {
    pub fn is_corrupt_header(&self) -> bool {
        matches!(
            self,
            LoadError::Transform(TransformError::CorruptHeader { .. })
        )
    }
}
