//! Face embeddings and the matching engine.
//!
//! An [`Embedding`] is a fixed-dimension `f32` vector produced by an external
//! face model. Every enrolled face is stored under an [`IdentityKey`]. The
//! [`Matcher`] answers two questions against a set of enrolled embeddings:
//!
//! - 1:N, [`Matcher::find_best_match`]: which identity is closest to a query face?
//! - 1:1, [`Matcher::verify`]: is a query face the same as a reference?
//!
//! Both use plain Euclidean distance and accept when the distance is less
//! than or equal to a single [`Tolerance`] (default `0.6`).
//!
//! # Scaling
//!
//! Matching is a linear scan, O(N·D) per query. This is fine for small and
//! medium enrolled populations. `find_best_match` takes the whole mapping so
//! an index can replace the scan without changing callers.

mod distance;
mod embedding;
mod error;
mod key;
mod matcher;

pub use distance::euclidean_distance;
pub use embedding::Embedding;
pub use error::MatchError;
pub use key::IdentityKey;
pub use matcher::{Mapping, Match, Matcher, Tolerance, DEFAULT_TOLERANCE};
