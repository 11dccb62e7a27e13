//! # Lattice KV
//!
//! Ordered key-value backend trait and implementations for LatticeDB.
//!
//! This crate defines the minimal substrate the engine is layered on: point
//! get/put/delete, an atomic multi-key batch, and bounded range cursors over
//! bytewise-ordered keys. Two backends are provided:
//!
//! - [`MemoryBackend`] - ephemeral `BTreeMap` store for tests and caches
//! - [`FileBackend`] - persistent snapshot file with an exclusive lock
//!
//! Backends are selected by URL through [`open`]:
//!
//! ```
//! use lattice_kv::{open, Config};
//!
//! let backend = open("mem:", &Config::default()).unwrap();
//! backend.put(b"k", b"v").unwrap();
//! assert_eq!(backend.get(b"k").unwrap(), Some(b"v".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{BatchOp, KvBackend, KvCursor};
pub use error::{KvError, KvResult};
pub use file::{FileBackend, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use memory::MemoryBackend;

use std::path::Path;

/// Configuration for opening a backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Create the backing file if it does not exist. Default: true.
    pub create_if_missing: bool,
    /// Fsync the snapshot on every committed batch. Default: false.
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: false,
        }
    }
}

impl Config {
    /// Sets whether a missing backing file is created on open.
    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets whether every commit fsyncs the snapshot file.
    #[must_use]
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

/// Opens a backend selected by URL.
///
/// Recognized forms:
/// - `mem:` - an ephemeral [`MemoryBackend`]
/// - `kv:<path>` - a [`FileBackend`] at `<path>`
/// - `<path>` - shorthand for `kv:<path>`
///
/// # Errors
///
/// Returns an error if the URL is empty or the backend fails to open.
pub fn open(url: &str, config: &Config) -> KvResult<Box<dyn KvBackend>> {
    if url == "mem:" {
        return Ok(Box::new(MemoryBackend::new()));
    }
    let path = url.strip_prefix("kv:").unwrap_or(url);
    if path.is_empty() || path.contains(':') {
        return Err(KvError::invalid_url(url));
    }
    Ok(Box::new(FileBackend::open(Path::new(path), config)?))
}
