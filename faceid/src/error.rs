use std::time::Duration;

use facekit_embedding::MatchError;
use facekit_encstore::StoreError;
use thiserror::Error;

use crate::extractor::ExtractionError;

/// Errors returned by the face identity workflows.
///
/// Use [`FaceIdError::is_input_error`] to tell a rejected image (the
/// caller's fault) from an internal failure.
#[derive(Debug, Error)]
pub enum FaceIdError {
    #[error("faceid: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("faceid: extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    #[error("faceid: store: {0}")]
    Store(#[from] StoreError),

    #[error("faceid: match: {0}")]
    Match(#[from] MatchError),

    #[error("faceid: config: {0}")]
    Config(String),

    #[error("faceid: task failed: {0}")]
    Task(String),
}

impl FaceIdError {
    /// True if the request was rejected because of the submitted image.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Extraction(e) if e.is_input_error())
    }
}
