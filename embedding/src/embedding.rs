use std::fmt;

use crate::error::MatchError;

/// A face embedding: a non-empty vector of finite `f32` values.
///
/// The dimension is fixed by the face model that produced it (e.g. 128).
/// Values are validated once at construction; everything downstream can rely
/// on them being finite.
#[derive(Clone, PartialEq)]
pub struct Embedding {
    values: Box<[f32]>,
}

impl Embedding {
    /// Creates an embedding, rejecting empty vectors and NaN/infinite values.
    pub fn new(values: Vec<f32>) -> Result<Self, MatchError> {
        if values.is_empty() {
            return Err(MatchError::EmptyEmbedding);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(MatchError::NonFinite { index });
        }
        Ok(Self {
            values: values.into_boxed_slice(),
        })
    }

    /// Creates an embedding that must have exactly `dim` components.
    pub fn with_dimension(values: Vec<f32>, dim: usize) -> Result<Self, MatchError> {
        let emb = Self::new(values)?;
        emb.ensure_dimension(dim)?;
        Ok(emb)
    }

    /// Returns an error unless this embedding has `dim` components.
    pub fn ensure_dimension(&self, dim: usize) -> Result<(), MatchError> {
        if self.values.len() != dim {
            return Err(MatchError::DimensionMismatch {
                expected: dim,
                got: self.values.len(),
            });
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values.into_vec()
    }
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedding")
            .field("dim", &self.values.len())
            .finish()
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = MatchError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.values
    }
}
