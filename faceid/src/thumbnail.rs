use std::fs;
use std::path::{Path, PathBuf};

use facekit_embedding::IdentityKey;
use image::ImageFormat;
use thiserror::Error;

use crate::extractor::FaceRect;

/// Default margin around the face, in pixels.
pub const DEFAULT_PADDING: u32 = 20;

/// Errors returned by a [`ThumbnailSink`].
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("thumbnail: decode: {0}")]
    Decode(String),

    #[error("thumbnail: face rectangle lies outside the image")]
    EmptyCrop,

    #[error("thumbnail: encode: {0}")]
    Encode(String),

    #[error("thumbnail: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives the face of every successful registration.
///
/// Saving is best-effort: the registration is already committed when
/// [`ThumbnailSink::save`] runs, and its errors are only logged.
pub trait ThumbnailSink: Send + Sync {
    fn save(&self, key: &IdentityKey, image: &[u8], face: &FaceRect) -> Result<(), ThumbnailError>;
}

/// Discards every thumbnail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoThumbnails;

impl ThumbnailSink for NoThumbnails {
    fn save(&self, _: &IdentityKey, _: &[u8], _: &FaceRect) -> Result<(), ThumbnailError> {
        Ok(())
    }
}

/// Crops the detected face (plus padding) and writes `{dir}/{key}.jpg`.
#[derive(Debug, Clone)]
pub struct CropThumbnails {
    dir: PathBuf,
    padding: u32,
}

impl CropThumbnails {
    /// Creates the sink, creating `dir` if it does not exist.
    pub fn new(dir: impl Into<PathBuf>, padding: u32) -> Result<Self, ThumbnailError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, padding })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the thumbnail for `key`.
    pub fn path_for(&self, key: &IdentityKey) -> PathBuf {
        self.dir.join(format!("{key}.jpg"))
    }
}

impl ThumbnailSink for CropThumbnails {
    fn save(&self, key: &IdentityKey, image: &[u8], face: &FaceRect) -> Result<(), ThumbnailError> {
        let img =
            image::load_from_memory(image).map_err(|e| ThumbnailError::Decode(e.to_string()))?;
        let (w, h) = (img.width() as i64, img.height() as i64);
        let pad = self.padding as i64;

        let left = (face.left - pad).clamp(0, w);
        let top = (face.top - pad).clamp(0, h);
        let right = (face.right + pad).clamp(0, w);
        let bottom = (face.bottom + pad).clamp(0, h);
        if right <= left || bottom <= top {
            return Err(ThumbnailError::EmptyCrop);
        }

        let crop = img.crop_imm(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        );
        // JPEG has no alpha channel.
        crop.to_rgb8()
            .save_with_format(self.path_for(key), ImageFormat::Jpeg)
            .map_err(|e| ThumbnailError::Encode(e.to_string()))
    }
}
