//! Durable custody of enrolled face embeddings.
//!
//! [`EncodingStore`] maps [`IdentityKey`](facekit_embedding::IdentityKey) to
//! [`Embedding`](facekit_embedding::Embedding) and keeps an on-disk snapshot
//! of the whole mapping in sync with memory.
//!
//! # Durability
//!
//! Every insert rewrites the complete snapshot into a temporary file in the
//! same directory, fsyncs it, and renames it over the live snapshot. Readers
//! of the file see either the old or the new mapping, never a mix. A failed
//! write leaves both memory and disk unchanged.
//!
//! # Concurrency
//!
//! A single reader/writer lock guards the mapping. Lookups and match scans
//! share the read lock; inserts take the write lock for the whole
//! mutate-and-persist step, so inserts are serialized.
//!
//! ```no_run
//! use facekit_embedding::{Embedding, IdentityKey};
//! use facekit_encstore::EncodingStore;
//!
//! let store = EncodingStore::open("data/encodings.bin", 128)?;
//! let key = IdentityKey::generate();
//! store.insert(key, Embedding::with_dimension(vec![0.0; 128], 128)?)?;
//! assert!(store.get(&key).is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
pub mod snapshot;
mod store;

pub use error::StoreError;
pub use snapshot::Snapshot;
pub use store::EncodingStore;
