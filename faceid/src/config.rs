//! Service configuration.
//!
//! Stored as YAML. Every field is optional. Empty paths and a zero
//! dimension fall back to the defaults below; `tolerance: 0` is kept and
//! means exact matches only.
//!
//! ```yaml
//! data_dir: /var/lib/faceid
//! tolerance: 0.6
//! dimension: 128
//! extract_timeout_ms: 5000
//! thumbnails: true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use facekit_embedding::DEFAULT_TOLERANCE;
use serde::{Deserialize, Serialize};

use crate::error::FaceIdError;
use crate::thumbnail::DEFAULT_PADDING;

/// Default base directory name under the user's home.
pub const DEFAULT_BASE_DIR: &str = ".facekit";
/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT_FILE: &str = "encodings.bin";
/// Default thumbnail subdirectory.
pub const DEFAULT_THUMBNAILS_DIR: &str = "cropped_faces";
/// Default embedding dimension (dlib-style 128-d face descriptors).
pub const DEFAULT_DIMENSION: usize = 128;

/// Face identity service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the snapshot and thumbnails.
    /// Default: `~/.facekit/faceid/data`.
    pub data_dir: PathBuf,

    /// Snapshot file name inside `data_dir`.
    pub snapshot_file: String,

    /// Thumbnail subdirectory inside `data_dir`.
    pub thumbnails_dir: String,

    /// Maximum Euclidean distance for a match. Default: 0.6.
    pub tolerance: f32,

    /// Embedding dimension the extractor produces. Default: 128.
    pub dimension: usize,

    /// Extraction timeout in milliseconds. 0 disables the timeout.
    pub extract_timeout_ms: u64,

    /// Save a cropped face for every registration.
    pub thumbnails: bool,

    /// Margin around the cropped face, in pixels.
    pub thumbnail_padding: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.into(),
            thumbnails_dir: DEFAULT_THUMBNAILS_DIR.into(),
            tolerance: DEFAULT_TOLERANCE,
            dimension: DEFAULT_DIMENSION,
            extract_timeout_ms: 0,
            thumbnails: true,
            thumbnail_padding: DEFAULT_PADDING,
        }
    }
}

impl Config {
    /// Returns `~/.facekit/faceid/data`, or `./data` without a home directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_BASE_DIR).join("faceid").join("data"))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Loads configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FaceIdError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FaceIdError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, FaceIdError> {
        let cfg: Config =
            serde_yaml::from_str(content).map_err(|e| FaceIdError::Config(e.to_string()))?;
        Ok(cfg.with_defaults())
    }

    /// Replaces empty paths and a zero dimension with defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = Self::default_data_dir();
        }
        if self.snapshot_file.is_empty() {
            self.snapshot_file = DEFAULT_SNAPSHOT_FILE.into();
        }
        if self.thumbnails_dir.is_empty() {
            self.thumbnails_dir = DEFAULT_THUMBNAILS_DIR.into();
        }
        if self.dimension == 0 {
            self.dimension = DEFAULT_DIMENSION;
        }
        self
    }

    /// Full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    /// Full path of the thumbnail directory.
    pub fn thumbnails_path(&self) -> PathBuf {
        self.data_dir.join(&self.thumbnails_dir)
    }

    /// Extraction timeout, if enabled.
    pub fn extract_timeout(&self) -> Option<Duration> {
        (self.extract_timeout_ms > 0).then(|| Duration::from_millis(self.extract_timeout_ms))
    }
}
