//! Advisory per-record lock table.
//!
//! Locks are in-process only: a table is owned by one store instance and
//! never persisted, so two instances (or processes) do not coordinate
//! through it. A lease is keyed by `(collection, primary-key fragment)`,
//! holds the owning token, and stays eligible for takeover once it is older
//! than the table's TTL. Acquisition over a set of records is
//! all-or-nothing per call.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug)]
struct Lease {
    token: String,
    acquired: Instant,
}

/// In-process advisory lock table.
#[derive(Debug)]
pub(crate) struct LockTable {
    leases: Mutex<HashMap<(String, Vec<u8>), Lease>>,
    ttl: Duration,
}

impl LockTable {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Acquires a lease on every key for `token`, or acquires nothing.
    ///
    /// A lease is acquirable when it is free, already held by `token`, or
    /// expired. Both the conflict check and the grant happen under one
    /// table guard, so a failed call leaves the table exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns `LockConflict` if any key is held by a live foreign lease.
    pub(crate) fn acquire_all(
        &self,
        collection: &str,
        keys: &[Vec<u8>],
        token: &str,
    ) -> StoreResult<()> {
        let mut leases = self.leases.lock();

        for key in keys {
            if let Some(lease) = leases.get(&(collection.to_string(), key.clone())) {
                if lease.token != token && lease.acquired.elapsed() < self.ttl {
                    return Err(StoreError::lock_conflict(collection));
                }
            }
        }

        let now = Instant::now();
        for key in keys {
            let entry = (collection.to_string(), key.clone());
            if let Some(previous) = leases.get(&entry) {
                if previous.token != token {
                    warn!(
                        collection,
                        previous = %previous.token,
                        token,
                        "taking over expired advisory lock"
                    );
                }
            }
            leases.insert(
                entry,
                Lease {
                    token: token.to_string(),
                    acquired: now,
                },
            );
        }
        Ok(())
    }

    /// Releases the leases on `keys` held by `token`. Leases held by other
    /// tokens are left untouched, so a release can never steal.
    pub(crate) fn release_all(&self, collection: &str, keys: &[Vec<u8>], token: &str) {
        let mut leases = self.leases.lock();
        for key in keys {
            let entry = (collection.to_string(), key.clone());
            if leases.get(&entry).is_some_and(|l| l.token == token) {
                leases.remove(&entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    fn keys(names: &[&str]) -> Vec<Vec<u8>> {
        names.iter().map(|n| n.as_bytes().to_vec()).collect()
    }

    #[test]
    fn acquire_and_reacquire_same_token() {
        let table = LockTable::new(TTL);
        table.acquire_all("users", &keys(&["u1", "u2"]), "t1").unwrap();
        table.acquire_all("users", &keys(&["u1"]), "t1").unwrap();
    }

    #[test]
    fn foreign_token_conflicts() {
        let table = LockTable::new(TTL);
        table.acquire_all("users", &keys(&["u1"]), "t1").unwrap();
        let result = table.acquire_all("users", &keys(&["u1", "u2"]), "t2");
        assert!(matches!(result, Err(StoreError::LockConflict { .. })));

        // The failed call must not have granted the non-conflicting key.
        table.acquire_all("users", &keys(&["u2"]), "t3").unwrap();
    }

    #[test]
    fn release_frees_for_other_tokens() {
        let table = LockTable::new(TTL);
        table.acquire_all("users", &keys(&["u1"]), "t1").unwrap();
        table.release_all("users", &keys(&["u1"]), "t1");
        table.acquire_all("users", &keys(&["u1"]), "t2").unwrap();
    }

    #[test]
    fn release_requires_token_match() {
        let table = LockTable::new(TTL);
        table.acquire_all("users", &keys(&["u1"]), "t1").unwrap();
        table.release_all("users", &keys(&["u1"]), "t2");
        let result = table.acquire_all("users", &keys(&["u1"]), "t2");
        assert!(matches!(result, Err(StoreError::LockConflict { .. })));
    }

    #[test]
    fn expired_lease_is_taken_over() {
        let table = LockTable::new(Duration::from_millis(0));
        table.acquire_all("users", &keys(&["u1"]), "t1").unwrap();
        table.acquire_all("users", &keys(&["u1"]), "t2").unwrap();
    }

    #[test]
    fn collections_do_not_collide() {
        let table = LockTable::new(TTL);
        table.acquire_all("users", &keys(&["x"]), "t1").unwrap();
        table.acquire_all("orders", &keys(&["x"]), "t2").unwrap();
    }
}
