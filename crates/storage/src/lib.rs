//! Snapshot persistence for needle indexes.
//!
//! An [`IndexStore`] holds one serialized index under a fixed name. [`save`]
//! writes an index's buffer to it; [`load_or_init`] restores an HNSW index
//! from it or, when nothing has been stored yet, initializes a fresh one.

pub mod error;

pub use error::{StoreError, StoreResult};

use needle_core::{MetricSpace, Persist};
use needle_hnsw::{HierarchicalNsw, HnswConfig};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name used by [`FileStore`].
pub const INDEX_FILE_NAME: &str = "needle-index.bin";

/// A byte sink and source for a single index snapshot.
pub trait IndexStore {
    /// Replace the stored snapshot with `bytes`.
    fn write(&self, bytes: &[u8]) -> StoreResult<()>;

    /// The stored snapshot, or `None` if nothing was written yet.
    fn read(&self) -> StoreResult<Option<Vec<u8>>>;
}

/// Snapshot kept in [`INDEX_FILE_NAME`] inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store under `dir`, which must exist.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(INDEX_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexStore for FileStore {
    fn write(&self, bytes: &[u8]) -> StoreResult<()> {
        // Write to temporary file first
        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        // Atomic rename
        fs::rename(&tmp_path, &self.path)?;

        info!(path = %self.path.display(), bytes = bytes.len(), "wrote index snapshot");
        Ok(())
    }

    fn read(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        *self.bytes.lock() = None;
    }
}

impl IndexStore for MemoryStore {
    fn write(&self, bytes: &[u8]) -> StoreResult<()> {
        *self.bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }

    fn read(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.bytes.lock().clone())
    }
}

/// Serialize `index` into `store`.
pub fn save<I, S>(store: &S, index: &I) -> StoreResult<()>
where
    I: Persist + ?Sized,
    S: IndexStore + ?Sized,
{
    let bytes = index.write_index_to_buffer()?;
    store.write(&bytes)
}

/// Restore `index` from `store`. Returns `false`, leaving `index` untouched,
/// when the store is empty.
pub fn load_into<I, S>(store: &S, index: &mut I) -> StoreResult<bool>
where
    I: Persist + ?Sized,
    S: IndexStore + ?Sized,
{
    match store.read()? {
        Some(bytes) => {
            index.read_index_from_buffer(&bytes)?;
            debug!(bytes = bytes.len(), "loaded index snapshot");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Load the HNSW index stored in `store`, or initialize an empty one with
/// `max_elements` slots and `config` if the store holds nothing.
///
/// A snapshot that exists but cannot be decoded is an error, not a reason to
/// start over.
pub fn load_or_init<S>(
    store: &S,
    space: MetricSpace,
    max_elements: usize,
    config: HnswConfig,
) -> StoreResult<HierarchicalNsw>
where
    S: IndexStore + ?Sized,
{
    let mut index = HierarchicalNsw::with_space(space);
    if !load_into(store, &mut index)? {
        warn!(max_elements, "no stored index found, initializing a new one");
        index.init_with_config(max_elements, config)?;
    }
    Ok(index)
}
