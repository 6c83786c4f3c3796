//! On-disk snapshot of the complete encoding mapping.
//!
//! Binary format, all integers little-endian:
//!
//! ```text
//! [4B magic "FENC"] [4B version=1]
//! [4B dim] [4B count]
//! For each record, in key order:
//!   [16B identity key]
//!   [dim x 4B float32 embedding]
//! ```
//!
//! A file with trailing bytes, a short read, duplicate keys or non-finite
//! values is rejected as a whole.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use facekit_embedding::{Embedding, IdentityKey, Mapping};
use tracing::debug;

use crate::error::StoreError;

const SNAPSHOT_MAGIC: [u8; 4] = *b"FENC";
const SNAPSHOT_VERSION: u32 = 1;

/// Largest embedding dimension accepted from a snapshot header.
pub const MAX_DIMENSION: usize = 1 << 16;

const TEMP_SUFFIX: &str = ".tmp";

/// A decoded snapshot: the embedding dimension and every record.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub dimension: usize,
    pub records: Mapping,
}

/// Serializes `records` to `w`. Every record must have `dim` components.
pub fn encode(dim: usize, records: &Mapping, w: &mut dyn Write) -> Result<(), StoreError> {
    if dim == 0 || dim > MAX_DIMENSION {
        return Err(StoreError::InvalidDimension(dim));
    }
    let count = u32::try_from(records.len())
        .map_err(|_| StoreError::InvalidFormat(format!("too many records: {}", records.len())))?;

    w.write_all(&SNAPSHOT_MAGIC)?;
    w.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
    w.write_all(&(dim as u32).to_le_bytes())?;
    w.write_all(&count.to_le_bytes())?;

    for (key, emb) in records {
        if emb.dimension() != dim {
            return Err(StoreError::DimensionMismatch {
                expected: dim,
                got: emb.dimension(),
            });
        }
        w.write_all(key.as_bytes())?;
        for v in emb.as_slice() {
            w.write_all(&v.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Deserializes a snapshot from `r`, consuming it to the end.
pub fn decode(r: &mut dyn Read) -> Result<Snapshot, StoreError> {
    let mut buf4 = [0u8; 4];

    read_exact(r, &mut buf4, "magic")?;
    if buf4 != SNAPSHOT_MAGIC {
        return Err(StoreError::InvalidFormat(format!("invalid magic {buf4:?}")));
    }

    let version = read_u32(r, "version")?;
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "unsupported version {version} (want {SNAPSHOT_VERSION})"
        )));
    }

    let dim = read_u32(r, "dimension")? as usize;
    if dim == 0 || dim > MAX_DIMENSION {
        return Err(StoreError::InvalidFormat(format!("invalid dimension {dim}")));
    }
    let count = read_u32(r, "count")?;

    let mut records = Mapping::new();
    let mut key_buf = [0u8; 16];
    let mut vec_buf = vec![0u8; dim * 4];
    for i in 0..count {
        read_exact(r, &mut key_buf, "record key")?;
        read_exact(r, &mut vec_buf, "record embedding")?;

        let key = IdentityKey::from_bytes(key_buf);
        let values: Vec<f32> = vec_buf
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let emb = Embedding::new(values)
            .map_err(|e| StoreError::InvalidFormat(format!("record {i} ({key}): {e}")))?;
        if records.insert(key, emb).is_some() {
            return Err(StoreError::InvalidFormat(format!("duplicate key {key}")));
        }
    }

    let mut extra = [0u8; 1];
    if r.read(&mut extra)? != 0 {
        return Err(StoreError::InvalidFormat(format!(
            "trailing data after {count} records"
        )));
    }

    Ok(Snapshot {
        dimension: dim,
        records,
    })
}

/// Reads the snapshot at `path`. Returns `Ok(None)` if the file does not
/// exist. A file that exists but fails to decode is [`StoreError::Corrupt`].
pub fn load(path: &Path) -> Result<Option<Snapshot>, StoreError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    decode(&mut data.as_slice())
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: match e {
                StoreError::InvalidFormat(reason) => reason,
                other => other.to_string(),
            },
        })
}

/// Atomically replaces the snapshot at `path` with `records`.
///
/// The data is written to a temporary file next to `path`, synced, and
/// renamed into place. The temporary file is removed on every error path.
pub fn write_atomic(path: &Path, dim: usize, records: &Mapping) -> Result<(), StoreError> {
    let dir = parent_dir(path);
    let mut tmp = tempfile::Builder::new()
        .prefix(&temp_prefix(path))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;

    {
        let mut bw = BufWriter::new(tmp.as_file_mut());
        encode(dim, records, &mut bw)?;
        bw.flush()?;
    }
    tmp.as_file().sync_all()?;

    // On failure the PersistError owns the temp file and deletes it on drop.
    tmp.persist(path).map_err(|e| StoreError::Io(e.error.to_string()))?;
    sync_dir(dir);

    debug!(
        "encstore: wrote snapshot {} ({} records)",
        path.display(),
        records.len()
    );
    Ok(())
}

/// Checks that a file can be created next to the snapshot at `path`.
///
/// The check file uses the same naming as [`write_atomic`]'s temporaries, so
/// [`remove_stale_temps`] also sweeps one left behind by a crash.
pub fn check_writable(path: &Path) -> Result<(), StoreError> {
    let dir = parent_dir(path);
    tempfile::Builder::new()
        .prefix(&temp_prefix(path))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map(drop)
        .map_err(|e| StoreError::NotWritable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Removes temporary files left behind by an interrupted [`write_atomic`]
/// for the snapshot at `path`. Returns how many were removed.
pub fn remove_stale_temps(path: &Path) -> Result<usize, StoreError> {
    let dir = parent_dir(path);
    let prefix = temp_prefix(path);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(&prefix)
            && name.ends_with(TEMP_SUFFIX)
            && entry.file_type()?.is_file()
        {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Directory holding the snapshot. A bare file name resolves to `.`.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn temp_prefix(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".into());
    format!(".{name}.")
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!("encstore: fsync {} failed: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn read_exact(r: &mut dyn Read, buf: &mut [u8], what: &str) -> Result<(), StoreError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => StoreError::InvalidFormat(format!("truncated {what}")),
        _ => e.into(),
    })
}

fn read_u32(r: &mut dyn Read, what: &str) -> Result<u32, StoreError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}
