use facekit_embedding::Embedding;
use thiserror::Error;

/// Errors returned by a [`FaceExtractor`].
///
/// Everything except [`ExtractionError::Model`] is the caller's fault: the
/// image itself was unusable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("could not decode image: {0}")]
    DecodeFailure(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("multiple faces detected ({0})")]
    MultipleFacesDetected(usize),

    #[error("model error: {0}")]
    Model(String),
}

impl ExtractionError {
    /// True for errors caused by the submitted image rather than the model.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Self::Model(_))
    }
}

/// Pixel bounds of the detected face, `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl FaceRect {
    pub fn width(&self) -> i64 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.bottom - self.top).max(0)
    }
}

/// The single face found in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub embedding: Embedding,
    pub face: FaceRect,
}

/// Turns raw image bytes into a face embedding.
///
/// Backed by an external pretrained model (detector, landmark aligner and
/// descriptor network). The image must contain exactly one face; zero or
/// several faces are errors, the extractor never picks one.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use. Calls may be slow; the
/// workflows run them on blocking threads and may abandon them on timeout.
pub trait FaceExtractor: Send + Sync {
    /// Detects the single face in `image` and computes its embedding.
    fn extract(&self, image: &[u8]) -> Result<Detection, ExtractionError>;

    /// Returns the dimensionality of the embeddings (e.g., 128).
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors() {
        assert!(ExtractionError::DecodeFailure("bad".into()).is_input_error());
        assert!(ExtractionError::NoFaceDetected.is_input_error());
        assert!(ExtractionError::MultipleFacesDetected(2).is_input_error());
        assert!(!ExtractionError::Model("oom".into()).is_input_error());
    }

    #[test]
    fn rect_size() {
        let r = FaceRect {
            left: 10,
            top: 20,
            right: 50,
            bottom: 80,
        };
        assert_eq!(r.width(), 40);
        assert_eq!(r.height(), 60);

        let inverted = FaceRect {
            left: 50,
            top: 80,
            right: 10,
            bottom: 20,
        };
        assert_eq!(inverted.width(), 0);
        assert_eq!(inverted.height(), 0);
    }
}
