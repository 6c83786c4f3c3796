use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use facekit_embedding::{Embedding, IdentityKey, Mapping};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::snapshot::{self, MAX_DIMENSION};

/// Identity key to embedding mapping, persisted as a single snapshot file.
///
/// Thread-safe: share it behind an `Arc`. The lock is task-fair, so a waiting
/// insert keeps new readers from starting until it has committed.
pub struct EncodingStore {
    path: PathBuf,
    dimension: usize,
    records: RwLock<Mapping>,
}

impl EncodingStore {
    /// Opens the store backed by the snapshot at `path`.
    ///
    /// Creates the parent directory and an empty snapshot on first use.
    /// Leftover temporary files from an interrupted write are removed. Fails
    /// if the directory is not writable, if the snapshot cannot be parsed,
    /// or if it holds embeddings of a different `dimension`.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(StoreError::InvalidDimension(dimension));
        }
        let path = path.as_ref().to_path_buf();
        let dir = snapshot::parent_dir(&path);

        fs::create_dir_all(dir).map_err(|e| StoreError::NotWritable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        snapshot::check_writable(&path)?;

        let stale = snapshot::remove_stale_temps(&path)?;
        if stale > 0 {
            warn!(
                "encstore: removed {} stale temporary snapshot(s) in {}",
                stale,
                dir.display()
            );
        }

        let records = match snapshot::load(&path)? {
            Some(snap) => {
                if snap.dimension != dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: dimension,
                        got: snap.dimension,
                    });
                }
                info!(
                    "encstore: loaded {} records from {}",
                    snap.records.len(),
                    path.display()
                );
                snap.records
            }
            None => {
                snapshot::write_atomic(&path, dimension, &Mapping::new())?;
                info!("encstore: created empty snapshot {}", path.display());
                Mapping::new()
            }
        };

        Ok(Self {
            path,
            dimension,
            records: RwLock::new(records),
        })
    }

    /// Re-reads the snapshot from disk without touching the in-memory state.
    pub fn load(&self) -> Result<Mapping, StoreError> {
        match snapshot::load(&self.path)? {
            Some(snap) if snap.dimension != self.dimension => Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: snap.dimension,
            }),
            Some(snap) => Ok(snap.records),
            None => Ok(Mapping::new()),
        }
    }

    /// Returns a copy of the current mapping.
    pub fn read_all(&self) -> Mapping {
        self.records.read().clone()
    }

    /// Runs `f` against the current mapping while holding the read lock.
    ///
    /// Inserts wait until `f` returns, so keep it short and never block on
    /// other work inside it.
    pub fn view<R>(&self, f: impl FnOnce(&Mapping) -> R) -> R {
        f(&self.records.read())
    }

    /// Adds a new record and persists the full mapping before returning.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if `key` is already present.
    /// If persisting fails the record is not added.
    pub fn insert(&self, key: IdentityKey, embedding: Embedding) -> Result<(), StoreError> {
        if embedding.dimension() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: embedding.dimension(),
            });
        }

        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key));
        }

        records.insert(key, embedding);
        if let Err(e) = snapshot::write_atomic(&self.path, self.dimension, &records) {
            records.remove(&key);
            return Err(e);
        }
        debug!("encstore: inserted {} ({} total)", key, records.len());
        Ok(())
    }

    pub fn get(&self, key: &IdentityKey) -> Option<Embedding> {
        self.records.read().get(key).cloned()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.records.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ends the store's lifecycle. Every insert is already durable, so
    /// there is nothing left to flush.
    pub fn close(self) {
        info!(
            "encstore: closed {} ({} records)",
            self.path.display(),
            self.records.read().len()
        );
    }
}

impl fmt::Debug for EncodingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingStore")
            .field("path", &self.path)
            .field("dimension", &self.dimension)
            .field("len", &self.len())
            .finish()
    }
}
