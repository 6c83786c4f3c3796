use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use facekit_embedding::{Embedding, IdentityKey, MatchError, Matcher, Tolerance};
use facekit_encstore::{EncodingStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::FaceIdError;
use crate::extractor::{Detection, FaceExtractor, FaceRect};
use crate::thumbnail::{CropThumbnails, NoThumbnails, ThumbnailSink};

/// Produces identity keys for new registrations.
pub type KeySource = Arc<dyn Fn() -> IdentityKey + Send + Sync>;

/// Result of a 1:N recognition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// True if an enrolled face was within tolerance.
    pub matched: bool,

    /// The matched identity. `None` when `matched` is false.
    pub identity: Option<IdentityKey>,

    /// Distance to the matched identity. `None` when `matched` is false.
    pub distance: Option<f32>,
}

impl Recognition {
    fn no_match() -> Self {
        Self {
            matched: false,
            identity: None,
            distance: None,
        }
    }
}

/// Register, recognize and verify faces against an [`EncodingStore`].
///
/// Feature extraction runs on blocking threads and never holds the store
/// lock, so a slow or timed-out extraction cannot stall other requests.
/// Safe for concurrent use; share it behind an `Arc`.
pub struct FaceService {
    store: Arc<EncodingStore>,
    extractor: Arc<dyn FaceExtractor>,
    matcher: Matcher,
    thumbnails: Arc<dyn ThumbnailSink>,
    extract_timeout: Option<Duration>,
    key_source: KeySource,
}

impl FaceService {
    /// Creates a service over an open store.
    ///
    /// Fails if the extractor's embedding dimension differs from the store's.
    pub fn new(
        store: Arc<EncodingStore>,
        extractor: Arc<dyn FaceExtractor>,
        matcher: Matcher,
    ) -> Result<Self, FaceIdError> {
        if extractor.dimension() != store.dimension() {
            return Err(MatchError::DimensionMismatch {
                expected: store.dimension(),
                got: extractor.dimension(),
            }
            .into());
        }
        Ok(Self {
            store,
            extractor,
            matcher,
            thumbnails: Arc::new(NoThumbnails),
            extract_timeout: None,
            key_source: Arc::new(IdentityKey::generate),
        })
    }

    /// Opens the store and thumbnail directory described by `cfg`.
    pub fn open(cfg: &Config, extractor: Arc<dyn FaceExtractor>) -> Result<Self, FaceIdError> {
        let store = EncodingStore::open(cfg.snapshot_path(), cfg.dimension)?;
        let matcher = Matcher::new(Tolerance::new(cfg.tolerance)?);
        let mut svc = Self::new(Arc::new(store), extractor, matcher)?
            .with_extract_timeout(cfg.extract_timeout());

        if cfg.thumbnails {
            let sink = CropThumbnails::new(cfg.thumbnails_path(), cfg.thumbnail_padding)
                .map_err(|e| FaceIdError::Config(e.to_string()))?;
            svc = svc.with_thumbnails(Arc::new(sink));
        }

        info!(
            "faceid: opened {} ({} enrolled, tolerance {})",
            cfg.snapshot_path().display(),
            svc.store.len(),
            cfg.tolerance
        );
        Ok(svc)
    }

    pub fn with_thumbnails(mut self, sink: Arc<dyn ThumbnailSink>) -> Self {
        self.thumbnails = sink;
        self
    }

    /// Bounds how long a single extraction may take. `None` waits forever.
    pub fn with_extract_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_key_source(mut self, source: KeySource) -> Self {
        self.key_source = source;
        self
    }

    pub fn store(&self) -> &Arc<EncodingStore> {
        &self.store
    }

    pub fn matcher(&self) -> Matcher {
        self.matcher
    }

    /// Enrolls the single face in `image` under a fresh identity key.
    ///
    /// The key is returned only after the snapshot on disk contains it. A
    /// cropped thumbnail is saved afterwards on a best-effort basis.
    pub async fn register(&self, image: impl Into<Arc<[u8]>>) -> Result<IdentityKey, FaceIdError> {
        let image = image.into();
        let Detection { embedding, face } = self.extract(Arc::clone(&image)).await?;

        let store = Arc::clone(&self.store);
        let key_source = Arc::clone(&self.key_source);
        let key =
            blocking(move || insert_with_retry(&store, key_source.as_ref(), embedding)).await??;
        info!("faceid: registered new face {}", key);

        self.save_thumbnail(key, image, face).await;
        Ok(key)
    }

    /// Finds the enrolled identity closest to the face in `image` (1:N).
    ///
    /// An empty store is not an error; it yields no match.
    pub async fn recognize(&self, image: impl Into<Arc<[u8]>>) -> Result<Recognition, FaceIdError> {
        let Detection { embedding, .. } = self.extract(image.into()).await?;

        let store = Arc::clone(&self.store);
        let matcher = self.matcher;
        let found = blocking(move || {
            store.view(|enrolled| matcher.find_best_match(&embedding, enrolled))
        })
        .await?
        .inspect_err(|e| error!("faceid: recognize: {}", e))?;

        match found {
            Some(m) => {
                info!("faceid: match {} at distance {}", m.key, m.distance);
                Ok(Recognition {
                    matched: true,
                    identity: Some(m.key),
                    distance: Some(m.distance),
                })
            }
            None => {
                debug!("faceid: no match within tolerance {}", matcher.tolerance().value());
                Ok(Recognition::no_match())
            }
        }
    }

    /// Checks whether the face in `image` belongs to `key` (1:1).
    ///
    /// An unknown `key` yields `false`, not an error.
    pub async fn verify(
        &self,
        image: impl Into<Arc<[u8]>>,
        key: IdentityKey,
    ) -> Result<bool, FaceIdError> {
        let Detection { embedding, .. } = self.extract(image.into()).await?;

        let store = Arc::clone(&self.store);
        let matcher = self.matcher;
        let result = blocking(move || {
            store.view(|enrolled| matcher.verify_identity(&embedding, enrolled, &key))
        })
        .await?;

        match result {
            Ok(verified) => {
                debug!("faceid: verify {}: {}", key, verified);
                Ok(verified)
            }
            Err(MatchError::UnknownIdentity(k)) => {
                warn!("faceid: verification attempted for unknown identity {}", k);
                Ok(false)
            }
            Err(e) => {
                error!("faceid: verify {}: {}", key, e);
                Err(e.into())
            }
        }
    }

    /// Ends the service's lifecycle, closing the store if this was its last
    /// owner.
    pub fn close(self) {
        match Arc::try_unwrap(self.store) {
            Ok(store) => store.close(),
            Err(_) => debug!("faceid: store still shared, leaving it open"),
        }
    }

    async fn extract(&self, image: Arc<[u8]>) -> Result<Detection, FaceIdError> {
        let extractor = Arc::clone(&self.extractor);
        let task = tokio::task::spawn_blocking(move || extractor.extract(&image));

        // Dropping the JoinHandle on timeout detaches the blocking call; it
        // holds no lock and its result is discarded.
        let joined = match self.extract_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| FaceIdError::ExtractionTimeout(limit))?,
            None => task.await,
        };
        let detection = joined.map_err(|e| FaceIdError::Task(e.to_string()))??;

        if let Err(e) = detection.embedding.ensure_dimension(self.store.dimension()) {
            error!("faceid: extractor returned a bad embedding: {}", e);
            return Err(e.into());
        }
        Ok(detection)
    }

    async fn save_thumbnail(&self, key: IdentityKey, image: Arc<[u8]>, face: FaceRect) {
        let sink = Arc::clone(&self.thumbnails);
        match blocking(move || sink.save(&key, &image, &face)).await {
            Ok(Ok(())) => debug!("faceid: saved thumbnail for {}", key),
            Ok(Err(e)) => warn!("faceid: failed to save thumbnail for {}: {}", key, e),
            Err(e) => warn!("faceid: thumbnail task for {}: {}", key, e),
        }
    }
}

impl fmt::Debug for FaceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceService")
            .field("store", &self.store)
            .field("matcher", &self.matcher)
            .field("extract_timeout", &self.extract_timeout)
            .finish_non_exhaustive()
    }
}

/// Inserts under a fresh key, retrying once if the key is already taken.
fn insert_with_retry(
    store: &EncodingStore,
    next_key: &(dyn Fn() -> IdentityKey + Send + Sync),
    embedding: Embedding,
) -> Result<IdentityKey, FaceIdError> {
    let key = next_key();
    match store.insert(key, embedding.clone()) {
        Ok(()) => return Ok(key),
        Err(StoreError::DuplicateKey(dup)) => {
            error!("faceid: generated key {} already enrolled, retrying", dup);
        }
        Err(e) => return Err(e.into()),
    }

    let key = next_key();
    store
        .insert(key, embedding)
        .inspect_err(|e| error!("faceid: insert retry for {} failed: {}", key, e))?;
    Ok(key)
}

async fn blocking<T, F>(f: F) -> Result<T, FaceIdError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FaceIdError::Task(e.to_string()))
}
