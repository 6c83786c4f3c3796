use std::collections::BTreeMap;

use crate::distance::precise_distance;
use crate::embedding::Embedding;
use crate::error::MatchError;
use crate::key::IdentityKey;

/// Enrolled embeddings keyed by identity.
pub type Mapping = BTreeMap<IdentityKey, Embedding>;

/// Default Euclidean tolerance for 128-d face descriptors.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Maximum Euclidean distance at which two embeddings are the same face.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tolerance(f32);

impl Tolerance {
    /// Creates a tolerance. Must be finite and non-negative.
    pub fn new(value: f32) -> Result<Self, MatchError> {
        if !value.is_finite() || value < 0.0 {
            return Err(MatchError::InvalidTolerance(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(DEFAULT_TOLERANCE)
    }
}

/// The closest enrolled identity to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub key: IdentityKey,

    /// Euclidean distance from the query. Never greater than the tolerance.
    pub distance: f32,
}

/// Distance-based decisions under one process-wide tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    tolerance: Tolerance,
}

impl Matcher {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// True if `distance` is within tolerance. The boundary is inclusive.
    pub fn accepts(&self, distance: f32) -> bool {
        self.within(distance as f64)
    }

    fn within(&self, distance: f64) -> bool {
        distance <= self.tolerance.0 as f64
    }

    /// 1:N search. Returns the nearest enrolled identity if it is within
    /// tolerance, `None` otherwise (including when `enrolled` is empty).
    ///
    /// Equidistant candidates resolve to the smallest key, regardless of the
    /// order in which `enrolled` is iterated. Fails if any enrolled vector
    /// has a different dimension than `query`.
    pub fn find_best_match(
        &self,
        query: &Embedding,
        enrolled: &Mapping,
    ) -> Result<Option<Match>, MatchError> {
        // Distances stay in f64 until after the tolerance check.
        let mut best: Option<(IdentityKey, f64)> = None;
        for (key, emb) in enrolled {
            let distance = precise_distance(query, emb)?;
            let closer = match best {
                None => true,
                Some((k, d)) => distance < d || (distance == d && *key < k),
            };
            if closer {
                best = Some((*key, distance));
            }
        }
        Ok(best
            .filter(|&(_, d)| self.within(d))
            .map(|(key, d)| Match {
                key,
                distance: d as f32,
            }))
    }

    /// 1:1 check of a query against a reference embedding.
    pub fn verify(&self, query: &Embedding, reference: &Embedding) -> Result<bool, MatchError> {
        Ok(self.within(precise_distance(query, reference)?))
    }

    /// 1:1 check against the enrolled embedding for `key`.
    ///
    /// Returns [`MatchError::UnknownIdentity`] if `key` is not enrolled.
    pub fn verify_identity(
        &self,
        query: &Embedding,
        enrolled: &Mapping,
        key: &IdentityKey,
    ) -> Result<bool, MatchError> {
        let reference = enrolled
            .get(key)
            .ok_or(MatchError::UnknownIdentity(*key))?;
        self.verify(query, reference)
    }
}
