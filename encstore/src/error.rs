use std::path::PathBuf;

use facekit_embedding::IdentityKey;
use thiserror::Error;

/// Errors returned by encoding store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("encstore: duplicate key {0}")]
    DuplicateKey(IdentityKey),

    #[error("encstore: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("encstore: invalid dimension {0}")]
    InvalidDimension(usize),

    #[error("encstore: invalid format: {0}")]
    InvalidFormat(String),

    #[error("encstore: corrupt snapshot {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("encstore: directory {} not writable: {reason}", path.display())]
    NotWritable { path: PathBuf, reason: String },

    #[error("encstore: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
