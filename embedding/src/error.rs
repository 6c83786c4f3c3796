use thiserror::Error;

use crate::key::IdentityKey;

/// Errors returned by embedding and matching operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding: empty vector")]
    EmptyEmbedding,

    #[error("embedding: non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("embedding: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding: unknown identity {0}")]
    UnknownIdentity(IdentityKey),

    #[error("embedding: invalid tolerance {0}")]
    InvalidTolerance(f32),
}
