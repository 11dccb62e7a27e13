//! In-memory ordered backend.

use crate::backend::{BatchOp, KvBackend, KvCursor};
use crate::error::{KvError, KvResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory ordered key-value backend.
///
/// All data lives in a `BTreeMap` behind a read-write lock. Suitable for:
/// - Unit and integration tests
/// - Ephemeral stores that don't need persistence
///
/// Batches are applied under a single write lock, which gives them their
/// all-or-nothing visibility.
///
/// # Example
///
/// ```rust
/// use lattice_kv::{KvBackend, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// backend.put(b"k", b"v").unwrap();
/// assert_eq!(backend.get(b"k").unwrap(), Some(b"v".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Arc<State>,
}

#[derive(Debug, Default)]
struct State {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl State {
    fn check_open(&self) -> KvResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(KvError::Closed)
        } else {
            Ok(())
        }
    }
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.map.read().len()
    }

    /// Returns true if the backend holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.state.map.write().clear();
    }

    /// Runs `f` against the entry map under the read lock. Used by the file
    /// backend to snapshot a consistent state.
    pub(crate) fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<Vec<u8>, Vec<u8>>) -> R) -> R {
        f(&self.state.map.read())
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.state.check_open()?;
        Ok(self.state.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.state.check_open()?;
        self.state.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &[u8]) -> KvResult<()> {
        self.state.check_open()?;
        self.state.map.write().remove(key);
        Ok(())
    }

    fn batch(&self, ops: Vec<BatchOp>) -> KvResult<()> {
        self.state.check_open()?;
        let mut map = self.state.map.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Del { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan(&self, lower: &[u8], upper: &[u8], reverse: bool) -> KvResult<Box<dyn KvCursor>> {
        self.state.check_open()?;
        Ok(Box::new(MemoryCursor {
            state: Arc::clone(&self.state),
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            reverse,
            last: None,
            done: false,
        }))
    }

    fn close(&self) -> KvResult<()> {
        self.state.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Cursor over a bounded range of a [`MemoryBackend`].
///
/// The cursor remembers the last yielded key and re-enters the map on every
/// step, so no lock is held between steps.
struct MemoryCursor {
    state: Arc<State>,
    lower: Vec<u8>,
    upper: Vec<u8>,
    reverse: bool,
    last: Option<Vec<u8>>,
    done: bool,
}

impl KvCursor for MemoryCursor {
    fn next(&mut self) -> KvResult<Option<(Vec<u8>, Vec<u8>)>> {
        // Inverted bounds (possible with contradictory range predicates
        // upstream) denote an empty range, not a panic.
        if self.done || self.lower >= self.upper {
            self.done = true;
            return Ok(None);
        }
        self.state.check_open()?;

        let map = self.state.map.read();
        let entry = if self.reverse {
            let ub = match &self.last {
                Some(last) => Bound::Excluded(last.as_slice()),
                None => Bound::Excluded(self.upper.as_slice()),
            };
            map.range::<[u8], _>((Bound::Included(self.lower.as_slice()), ub))
                .next_back()
        } else {
            let lb = match &self.last {
                Some(last) => Bound::Excluded(last.as_slice()),
                None => Bound::Included(self.lower.as_slice()),
            };
            map.range::<[u8], _>((lb, Bound::Excluded(self.upper.as_slice())))
                .next()
        };

        match entry {
            Some((key, value)) => {
                let pair = (key.clone(), value.clone());
                self.last = Some(pair.0.clone());
                Ok(Some(pair))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}
