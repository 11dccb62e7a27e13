//! # Lattice Testkit
//!
//! Test utilities for LatticeDB.
//!
//! This crate provides:
//! - Test fixtures: temp stores with automatic cleanup, canned schemas,
//!   and JSON-literal record construction
//! - Property-based generators for schema-conformant values and records
//!
//! ## Usage
//!
//! ```rust
//! use lattice_testkit::prelude::*;
//! use serde_json::json;
//!
//! let store = TestStore::memory(users_schema());
//! store
//!     .insert("users", record_from_json(json!({"id": "u1", "age": 30})))
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::{record_from_json, users_schema, TestStore};
    pub use crate::generators::{record_strategy, value_strategy};
}
