//! Store facade: lifecycle and the four CRUD operations.

use crate::entries::{self, AssembledRecord};
use crate::error::{StoreError, StoreResult};
use crate::exec;
use crate::keyspace;
use crate::lock::LockTable;
use crate::query::Query;
use crate::schema::{self, Catalog, Collection, SchemaDocument};
use crate::Record;
use lattice_codec::{fragment, storage, Value};
use lattice_kv::{BatchOp, KvBackend};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

/// Advisory lock leases become eligible for takeover after this long.
pub const LOCK_TTL: Duration = Duration::from_secs(30);

/// Sort order for search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Attribute to order by.
    pub attribute: String,
    /// Descending instead of ascending.
    pub descending: bool,
}

/// Keyset pagination request.
///
/// The cursor is the opaque raw key boundary returned by a previous
/// paginated call; resuming from it yields the next page with no overlap
/// and no gap. One caveat: de-duplication state does not survive across
/// calls, so a `$any` scan can return a record again on a later page when
/// it matches more than one of the given values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seek {
    /// Start a paginated scan from the beginning.
    First,
    /// Resume after the given cursor.
    After(Vec<u8>),
}

/// Options accepted by [`Store::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict returned attributes to this set (the primary attribute is
    /// always included).
    pub fields: Option<Vec<String>>,
    /// Requested result order; honored only when it matches the natural
    /// order of the chosen index, otherwise results come in scan order.
    pub order_by: Option<OrderBy>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of matching records to skip first.
    pub offset: usize,
    /// Acquire an advisory lock on every matched record with this token;
    /// all-or-nothing per call.
    pub lock: Option<String>,
    /// Release matched records' advisory locks held by this token.
    pub unlock: Option<String>,
    /// Request keyset pagination.
    pub seek: Option<Seek>,
}

impl SearchOptions {
    /// Default options: no projection, no pagination, no locking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts returned attributes.
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Orders results by an attribute.
    #[must_use]
    pub fn order_by(mut self, attribute: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            attribute: attribute.into(),
            descending,
        });
        self
    }

    /// Caps the number of returned records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching records.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Acquires advisory locks on the matched set.
    #[must_use]
    pub fn lock(mut self, token: impl Into<String>) -> Self {
        self.lock = Some(token.into());
        self
    }

    /// Releases advisory locks on the matched set.
    #[must_use]
    pub fn unlock(mut self, token: impl Into<String>) -> Self {
        self.unlock = Some(token.into());
        self
    }

    /// Requests a pagination cursor, optionally resuming from a previous
    /// one.
    #[must_use]
    pub fn seek(mut self, seek: Seek) -> Self {
        self.seek = Some(seek);
        self
    }
}

/// Result of a [`Store::search`].
#[derive(Debug)]
pub struct SearchOutcome {
    /// Matched records, in scan order.
    pub records: Vec<Record>,
    /// Pagination cursor; present only when requested, `None` once the
    /// scan is exhausted.
    pub seek: Option<Vec<u8>>,
}

/// Per-record outcome of a multi-record mutation.
///
/// `update` and `delete` commit one atomic batch per matched record; a
/// failure partway through leaves earlier records mutated. The outcome
/// list surfaces exactly which records succeeded.
#[derive(Debug)]
pub struct MutationOutcome {
    /// Primary-key value of the affected record.
    pub primary: Value,
    /// Whether this record's batch committed.
    pub result: StoreResult<()>,
}

impl MutationOutcome {
    /// True if this record's batch committed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A schema-driven document store over an ordered key-value backend.
///
/// The store owns its backend exclusively between [`Store::open`] and
/// [`Store::close`]. All operations are synchronous; a record becomes
/// visible (or invisible) atomically, since its full entry set commits as
/// one batch.
///
/// # Example
///
/// ```rust
/// use lattice_core::{Query, SchemaDocument, SearchOptions, Store, Value};
///
/// let schema = SchemaDocument::new(1)
///     .collection("users", [("*id", "str"), ("+email", "str"), ("age", "int")]);
/// let store = Store::open("mem:", Some(schema)).unwrap();
///
/// let mut alice = lattice_core::Record::new();
/// alice.insert("id".into(), Value::Str("u1".into()));
/// alice.insert("email".into(), Value::Str("a@x.com".into()));
/// alice.insert("age".into(), Value::Int(30));
/// store.insert("users", alice).unwrap();
///
/// let query = Query::all().with("id", lattice_core::Operator::Eq, "u1").unwrap();
/// let found = store.search("users", &query, &SearchOptions::new()).unwrap();
/// assert_eq!(found.records.len(), 1);
/// ```
pub struct Store {
    backend: Box<dyn KvBackend>,
    catalog: Catalog,
    locks: LockTable,
    /// Serializes uniqueness-sensitive check-then-write sequences, so two
    /// concurrent inserts (or updates) cannot both pass a uniqueness
    /// pre-check and both commit.
    write_gate: Mutex<()>,
}

impl Store {
    /// Opens a store over the backend selected by `url` (`mem:`,
    /// `kv:<path>`, or a bare path).
    ///
    /// On a fresh backend a schema must be supplied; it is persisted under
    /// the reserved config key together with every collection's region
    /// anchors, in one batch. On an existing backend the stored schema is
    /// loaded; a supplied schema whose version differs fails with
    /// `IncompatibleSchema`.
    ///
    /// # Errors
    ///
    /// Returns `Schema`, `IncompatibleSchema`, or a backend error.
    pub fn open(url: &str, schema: Option<SchemaDocument>) -> StoreResult<Self> {
        Self::open_with_config(url, schema, lattice_kv::Config::default())
    }

    /// Opens a store with explicit backend configuration.
    ///
    /// # Errors
    ///
    /// See [`Store::open`].
    pub fn open_with_config(
        url: &str,
        schema: Option<SchemaDocument>,
        config: lattice_kv::Config,
    ) -> StoreResult<Self> {
        let backend = lattice_kv::open(url, &config)?;

        let catalog = match backend.get(&keyspace::config_key())? {
            None => {
                let document = schema.ok_or_else(|| {
                    StoreError::schema("fresh backend requires a schema document")
                })?;
                let catalog = schema::normalize(&document)?;
                let mut ops = vec![BatchOp::put(keyspace::config_key(), document.encode()?)];
                ops.extend(keyspace::seed_anchor_batch(&catalog));
                backend.batch(ops)?;
                debug!(
                    version = document.version,
                    collections = catalog.collections.len(),
                    "schema created"
                );
                catalog
            }
            Some(bytes) => {
                let stored = SchemaDocument::decode(&bytes)?;
                if let Some(supplied) = schema {
                    if supplied.version != stored.version {
                        return Err(StoreError::IncompatibleSchema {
                            stored: stored.version,
                            supplied: supplied.version,
                        });
                    }
                }
                schema::normalize(&stored)?
            }
        };

        debug!(url, version = catalog.version, "store opened");
        Ok(Self {
            backend,
            catalog,
            locks: LockTable::new(LOCK_TTL),
            write_gate: Mutex::new(()),
        })
    }

    /// The normalized schema this store was opened with.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Inserts one record.
    ///
    /// The record's full entry set (anchor, fields, sentinel, index
    /// pointers) commits as one atomic batch, so a concurrent scan sees
    /// either the whole record or nothing.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on a schema mismatch or missing primary value,
    /// `DuplicateKey` if the primary or any unique-attribute value is
    /// taken.
    pub fn insert(&self, collection: &str, record: Record) -> StoreResult<()> {
        let col = self.catalog.collection(collection)?;
        schema::validate_record(col, &record)?;

        let _write = self.write_gate.lock();
        let pk = entries::primary_fragment(col, &record)?;
        if self
            .backend
            .get(&keyspace::record_key(&col.name, &pk))?
            .is_some()
        {
            return Err(StoreError::duplicate_key(&col.name, &col.primary));
        }
        for attribute in &col.unique {
            if let Some(value) = record.get(attribute) {
                let entry =
                    keyspace::unique_entry(&col.name, attribute, &fragment::to_fragment(value)?);
                if self.backend.get(&entry)?.is_some() {
                    return Err(StoreError::duplicate_key(&col.name, attribute));
                }
            }
        }

        self.backend.batch(entries::record_batch(col, &record)?)?;
        debug!(collection, "record inserted");
        Ok(())
    }

    /// Searches a collection.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on a malformed query, `LockConflict` if a
    /// requested lock cannot be acquired on the full matched set, or a
    /// backend error.
    pub fn search(
        &self,
        collection: &str,
        query: &Query,
        opts: &SearchOptions,
    ) -> StoreResult<SearchOutcome> {
        let col = self.catalog.collection(collection)?;
        let outcome = exec::execute(self.backend.as_ref(), col, query, opts)?;

        if opts.lock.is_some() || opts.unlock.is_some() {
            let pks: Vec<Vec<u8>> = outcome.matches.iter().map(|m| m.pk.clone()).collect();
            if let Some(token) = &opts.lock {
                self.locks.acquire_all(&col.name, &pks, token)?;
            }
            if let Some(token) = &opts.unlock {
                self.locks.release_all(&col.name, &pks, token);
            }
        }

        let records = outcome
            .matches
            .into_iter()
            .map(|m| project(col, m.record, opts.fields.as_deref()))
            .collect();
        Ok(SearchOutcome {
            records,
            seek: outcome.seek,
        })
    }

    /// Updates every record matching `query` with the attribute values in
    /// `patch`, one atomic batch per matched record.
    ///
    /// Updating an empty match set is a no-op, not an error. There is no
    /// cross-record atomicity: the returned outcomes surface which records
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the patch touches the primary attribute or
    /// mismatches the schema. Per-record failures (including per-record
    /// `DuplicateKey` on a unique attribute) are reported in the outcome
    /// list, not as a call-level error.
    pub fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: &Record,
    ) -> StoreResult<Vec<MutationOutcome>> {
        let col = self.catalog.collection(collection)?;
        validate_patch(col, patch)?;

        let matches =
            exec::execute(self.backend.as_ref(), col, query, &SearchOptions::default())?.matches;

        let _write = self.write_gate.lock();
        let mut outcomes = Vec::with_capacity(matches.len());
        for assembled in &matches {
            let primary = primary_value(col, assembled)?;
            let result = self.update_one(col, assembled, patch);
            outcomes.push(MutationOutcome { primary, result });
        }
        debug!(
            collection,
            matched = outcomes.len(),
            committed = outcomes.iter().filter(|o| o.is_ok()).count(),
            "update"
        );
        Ok(outcomes)
    }

    /// Applies a patch to one stored record: overwrite changed fields,
    /// re-point changed unique entries (with an occupancy check), and
    /// whole-value replace changed containment entries.
    fn update_one(
        &self,
        col: &Collection,
        assembled: &AssembledRecord,
        patch: &Record,
    ) -> StoreResult<()> {
        let pk = &assembled.pk;
        let old = &assembled.record;
        let pointer = storage::to_storage(&primary_value(col, assembled)?)?;

        let mut ops = Vec::new();
        for (attribute, new_value) in patch {
            let old_value = old.get(attribute);
            if old_value == Some(new_value) {
                continue;
            }
            ops.push(BatchOp::put(
                keyspace::record_field_key(&col.name, pk, attribute),
                storage::to_storage(new_value)?,
            ));

            if col.is_unique(attribute) {
                let entry = keyspace::unique_entry(
                    &col.name,
                    attribute,
                    &fragment::to_fragment(new_value)?,
                );
                if let Some(existing) = self.backend.get(&entry)? {
                    let holder = storage::from_storage(&existing)?;
                    if fragment::to_fragment(&holder)? != *pk {
                        return Err(StoreError::duplicate_key(&col.name, attribute));
                    }
                }
                if let Some(old_value) = old_value {
                    ops.push(BatchOp::del(keyspace::unique_entry(
                        &col.name,
                        attribute,
                        &fragment::to_fragment(old_value)?,
                    )));
                }
                ops.push(BatchOp::put(entry, pointer.clone()));
            }

            if col.is_indexed(attribute) {
                if let Some(old_value) = old_value {
                    for element in entries::index_elements(old_value) {
                        ops.push(BatchOp::del(keyspace::index_entry(
                            &col.name,
                            attribute,
                            &fragment::to_fragment(element)?,
                            pk,
                        )));
                    }
                }
                for element in entries::index_elements(new_value) {
                    ops.push(BatchOp::put(
                        keyspace::index_entry(
                            &col.name,
                            attribute,
                            &fragment::to_fragment(element)?,
                            pk,
                        ),
                        pointer.clone(),
                    ));
                }
            }
        }

        if ops.is_empty() {
            return Ok(());
        }
        self.backend.batch(ops)?;
        Ok(())
    }

    /// Deletes every record matching `query`, one atomic batch per record.
    ///
    /// Deleting an empty match set is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Call-level errors are limited to an unknown collection or a
    /// malformed query; per-record failures are reported in the outcome
    /// list.
    pub fn delete(&self, collection: &str, query: &Query) -> StoreResult<Vec<MutationOutcome>> {
        let col = self.catalog.collection(collection)?;
        let matches =
            exec::execute(self.backend.as_ref(), col, query, &SearchOptions::default())?.matches;

        let _write = self.write_gate.lock();
        let mut outcomes = Vec::with_capacity(matches.len());
        for assembled in &matches {
            let primary = primary_value(col, assembled)?;
            let result = entries::record_removal(col, &assembled.record)
                .and_then(|ops| Ok(self.backend.batch(ops)?));
            outcomes.push(MutationOutcome { primary, result });
        }
        debug!(
            collection,
            matched = outcomes.len(),
            committed = outcomes.iter().filter(|o| o.is_ok()).count(),
            "delete"
        );
        Ok(outcomes)
    }

    /// Flushes and closes the backend, consuming the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(self) -> StoreResult<()> {
        self.backend.close()?;
        debug!("store closed");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("collections", &self.catalog.collections.len())
            .field("version", &self.catalog.version)
            .finish_non_exhaustive()
    }
}

fn primary_value(col: &Collection, assembled: &AssembledRecord) -> StoreResult<Value> {
    assembled
        .record
        .get(&col.primary)
        .cloned()
        .ok_or_else(|| StoreError::validation("assembled record is missing its primary value"))
}

fn validate_patch(col: &Collection, patch: &Record) -> StoreResult<()> {
    if patch.contains_key(&col.primary) {
        return Err(StoreError::validation(format!(
            "{}: primary attribute {:?} is immutable",
            col.name, col.primary
        )));
    }
    for (attribute, value) in patch {
        let ty = col.attribute_type(attribute).ok_or_else(|| {
            StoreError::validation(format!("{}: unknown attribute {attribute:?}", col.name))
        })?;
        if !value.matches(ty) {
            return Err(StoreError::validation(format!(
                "{}.{attribute}: expected {ty}, got {}",
                col.name,
                value.kind()
            )));
        }
    }
    Ok(())
}

fn project(col: &Collection, record: Record, fields: Option<&[String]>) -> Record {
    match fields {
        None => record,
        Some(fields) => record
            .into_iter()
            .filter(|(name, _)| name == &col.primary || fields.iter().any(|f| f == name))
            .collect(),
    }
}
