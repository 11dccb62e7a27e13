//! Error types for the store engine.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The schema document is malformed: missing version, empty collections,
    /// or a bad primary key declaration.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// The supplied schema version does not match the stored one.
    #[error("incompatible schema: stored version {stored}, supplied version {supplied}")]
    IncompatibleSchema {
        /// Version persisted in the backend.
        stored: u32,
        /// Version supplied by the caller.
        supplied: u32,
    },

    /// The named collection is not declared in the schema.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Name of the collection.
        name: String,
    },

    /// A record or query does not conform to the schema or the operator
    /// grammar.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A primary key or unique-attribute value is already taken.
    #[error("duplicate key: {collection}.{attribute} already holds this value")]
    DuplicateKey {
        /// Collection of the collision.
        collection: String,
        /// Attribute of the collision.
        attribute: String,
    },

    /// A requested advisory lock is held by another token.
    #[error("lock conflict on {collection}: record is held by another token")]
    LockConflict {
        /// Collection of the contended record.
        collection: String,
    },

    /// Backend failure, with the adapter error preserved as the cause.
    #[error("backend error: {0}")]
    Backend(#[from] lattice_kv::KvError),

    /// Codec failure while encoding or decoding keys or payloads.
    #[error("codec error: {0}")]
    Codec(#[from] lattice_codec::CodecError),
}

impl StoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unknown-collection error.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Creates a duplicate-key error.
    pub fn duplicate_key(collection: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a lock-conflict error.
    pub fn lock_conflict(collection: impl Into<String>) -> Self {
        Self::LockConflict {
            collection: collection.into(),
        }
    }
}
