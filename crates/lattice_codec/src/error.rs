//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding values and keys.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload encoding failed.
    #[error("encode failed: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// Payload decoding failed or the payload is not a supported value.
    #[error("decode failed: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// A key fragment is malformed for the expected attribute type.
    #[error("invalid key fragment: {message}")]
    InvalidFragment {
        /// Description of the failure.
        message: String,
    },

    /// A key segment contains an incomplete or unknown escape sequence.
    #[error("invalid key segment: {message}")]
    InvalidSegment {
        /// Description of the failure.
        message: String,
    },

    /// The value kind cannot be used in the requested encoding.
    #[error("unsupported value kind {kind} for {context}")]
    Unsupported {
        /// Kind of the offending value.
        kind: &'static str,
        /// What was being encoded.
        context: &'static str,
    },
}

impl CodecError {
    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an invalid-fragment error.
    pub fn invalid_fragment(message: impl Into<String>) -> Self {
        Self::InvalidFragment {
            message: message.into(),
        }
    }

    /// Creates an invalid-segment error.
    pub fn invalid_segment(message: impl Into<String>) -> Self {
        Self::InvalidSegment {
            message: message.into(),
        }
    }
}
