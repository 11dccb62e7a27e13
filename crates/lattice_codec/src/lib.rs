//! # Lattice Codec
//!
//! Value model, payload codec and key encoding for LatticeDB.
//!
//! This crate provides:
//! - The [`Value`] / [`AttributeType`] tagged unions the engine is built on
//! - Payload encoding between values and CBOR storage bytes
//! - Key-fragment encoding between values and key-safe escaped fragments,
//!   with order-preserving layouts for integers and floats
//! - The hierarchical key builder (separator, escaping, region sentinels)
//!
//! ## Usage
//!
//! ```
//! use lattice_codec::{fragment, storage, AttributeType, Value};
//!
//! let value = Value::Int(42);
//! let bytes = storage::to_storage(&value).unwrap();
//! assert_eq!(storage::from_storage(&bytes).unwrap(), value);
//!
//! let frag = fragment::to_fragment(&value).unwrap();
//! assert_eq!(fragment::from_fragment(AttributeType::Int, &frag).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod fragment;
pub mod key;
pub mod storage;
mod value;

pub use error::{CodecError, CodecResult};
pub use value::{AttributeType, ElementType, Value};
