//! # Lattice Core
//!
//! A schema-driven document store layered over a minimal ordered key-value
//! substrate.
//!
//! This crate provides:
//! - Typed collections with one primary key, unique secondary indexes, and
//!   non-unique (containment) indexes
//! - A small predicate query language with an index-selecting planner
//! - Keyset pagination, advisory per-record locking, and index-consistent
//!   insert/update/delete
//!
//! The store consumes any [`lattice_kv::KvBackend`]; all key-space layout,
//! index maintenance, and query planning live here.
//!
//! ## Concurrency model
//!
//! One store instance owns its backend exclusively between `open` and
//! `close`. Uniqueness-sensitive writes are serialized through an internal
//! write gate, so the uniqueness pre-check and the batch commit form one
//! critical section per store instance. Multi-record `update`/`delete` are
//! a sequence of independent atomic batches: partial completion is
//! expected and surfaced through per-record outcomes. The advisory lock
//! table is process-local and never coordinates across store instances.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entries;
mod error;
mod exec;
mod keyspace;
mod lock;
mod plan;
mod query;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use query::{Operator, Query};
pub use schema::{Catalog, Collection, SchemaDocument};
pub use store::{
    MutationOutcome, OrderBy, SearchOptions, SearchOutcome, Seek, Store, LOCK_TTL,
};

// The value model is part of the public surface.
pub use lattice_codec::{AttributeType, ElementType, Value};

/// A record: attribute name to typed value.
///
/// A record always includes its collection's primary attribute; optional
/// attributes are simply absent, never stored as nulls.
pub type Record = std::collections::BTreeMap<String, Value>;
