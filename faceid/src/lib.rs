//! Face registration, recognition and verification.
//!
//! # Architecture
//!
//! Each request flows through three stages:
//!
//! 1. [`FaceExtractor::extract`]: image bytes -> [`Detection`] (embedding + face box)
//! 2. [`Matcher`](facekit_embedding::Matcher): embedding vs. enrolled embeddings
//! 3. [`EncodingStore`](facekit_encstore::EncodingStore): durable enrolled set
//!
//! [`FaceService`] wires them together:
//!
//! - [`FaceService::register`]: extract, assign a fresh key, persist, save thumbnail
//! - [`FaceService::recognize`]: extract, nearest enrolled identity within tolerance (1:N)
//! - [`FaceService::verify`]: extract, distance to one enrolled identity (1:1)
//!
//! # Errors
//!
//! Unusable images (undecodable, no face, several faces) are input errors,
//! see [`FaceIdError::is_input_error`]. Everything else is internal. An
//! unknown identity in `verify` is simply "not verified".

mod config;
mod error;
mod extractor;
mod service;
mod thumbnail;

pub use config::Config;
pub use error::FaceIdError;
pub use extractor::{Detection, ExtractionError, FaceExtractor, FaceRect};
pub use service::{FaceService, KeySource, Recognition};
pub use thumbnail::{CropThumbnails, NoThumbnails, ThumbnailError, ThumbnailSink, DEFAULT_PADDING};

pub use facekit_embedding::{Embedding, IdentityKey, Matcher, Tolerance};
pub use facekit_encstore::EncodingStore;
