//! Error types for storage backends.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors that can occur in a storage backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend URL is not recognized.
    #[error("unrecognized backend url: {url}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },

    /// Another process holds the exclusive lock on the backend file.
    #[error("backend locked: another process has exclusive access to {path}")]
    Locked {
        /// Path of the locked backend.
        path: String,
    },

    /// The snapshot file is corrupted or has an unsupported format.
    #[error("corrupt backend file: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// The backend has been closed.
    #[error("backend is closed")]
    Closed,
}

impl KvError {
    /// Creates an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a corrupt-file error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}
