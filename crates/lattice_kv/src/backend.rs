//! Ordered key-value backend trait definition.

use crate::error::KvResult;

/// One operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store `value` under `key`, replacing any existing entry.
    Put {
        /// The key to write.
        key: Vec<u8>,
        /// The value to store.
        value: Vec<u8>,
    },
    /// Remove the entry under `key`, if present.
    Del {
        /// The key to remove.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Creates a put operation.
    #[must_use]
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self::Put { key, value }
    }

    /// Creates a delete operation.
    #[must_use]
    pub fn del(key: Vec<u8>) -> Self {
        Self::Del { key }
    }
}

/// A cursor over a bounded key range.
///
/// Cursors are detached from the backend's locks: stepping a cursor never
/// holds a lock across calls, so the owner may interleave point reads and
/// batches with cursor steps. A batch committed mid-scan is visible to the
/// remaining steps; the engine relies only on the ordering guarantee, not on
/// snapshot isolation.
pub trait KvCursor: Send {
    /// Advances the cursor and returns the next entry, or `None` when the
    /// range is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying backend fails.
    fn next(&mut self) -> KvResult<Option<(Vec<u8>, Vec<u8>)>>;
}

/// A minimal ordered key-value store.
///
/// Backends are **opaque ordered byte maps**. They provide point reads and
/// writes, an atomic multi-key batch, and bounded range scans in bytewise
/// key order. All key-space interpretation (collections, indexes, sentinels)
/// belongs to the layers above - backends never parse keys.
///
/// # Invariants
///
/// - `batch` is all-or-nothing: either every operation is applied or none is
/// - `scan` yields entries in strict bytewise key order (reverse order when
///   `reverse` is set), within `lower <= key < upper`
/// - Backends must be `Send + Sync` so one store instance can be shared
///   across threads
///
/// # Implementors
///
/// - [`crate::MemoryBackend`] - ephemeral, for tests and caches
/// - [`crate::FileBackend`] - persistent snapshot file
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; an absent key is `Ok(None)`.
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()>;

    /// Removes the entry under `key`. Removing an absent key is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn del(&self, key: &[u8]) -> KvResult<()>;

    /// Applies all operations atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; on error no operation is
    /// applied.
    fn batch(&self, ops: Vec<BatchOp>) -> KvResult<()>;

    /// Opens a cursor over `lower <= key < upper`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn scan(&self, lower: &[u8], upper: &[u8], reverse: bool) -> KvResult<Box<dyn KvCursor>>;

    /// Flushes and closes the backend. Further calls fail with
    /// [`crate::KvError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&self) -> KvResult<()>;
}
