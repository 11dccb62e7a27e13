//! Payload codec: value <-> storage bytes.
//!
//! Stored payloads are CBOR. `Dict` keys iterate in `BTreeMap` order, so
//! identical values always produce identical bytes.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// Encodes a value to its storage byte representation.
///
/// # Errors
///
/// Returns an error if CBOR serialization fails.
pub fn to_storage(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&to_cbor(value), &mut buf)
        .map_err(|e| CodecError::encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value from its storage byte representation.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR or decode to a CBOR
/// shape outside the supported value model (nulls, tags, non-string map
/// keys, out-of-range integers).
pub fn from_storage(bytes: &[u8]) -> CodecResult<Value> {
    let raw: ciborium::value::Value =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decode(e.to_string()))?;
    from_cbor(raw)
}

fn to_cbor(value: &Value) -> ciborium::value::Value {
    use ciborium::value::Value as Cbor;
    match value {
        Value::Str(s) => Cbor::Text(s.clone()),
        Value::Int(n) => Cbor::Integer((*n).into()),
        Value::Float(x) => Cbor::Float(*x),
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Dict(map) => Cbor::Map(
            map.iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor(v)))
                .collect(),
        ),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
    }
}

fn from_cbor(raw: ciborium::value::Value) -> CodecResult<Value> {
    use ciborium::value::Value as Cbor;
    match raw {
        Cbor::Text(s) => Ok(Value::Str(s)),
        Cbor::Integer(n) => {
            let wide = i128::from(n);
            let narrow = i64::try_from(wide)
                .map_err(|_| CodecError::decode(format!("integer {wide} out of i64 range")))?;
            Ok(Value::Int(narrow))
        }
        Cbor::Float(x) => Ok(Value::Float(x)),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Map(pairs) => {
            let mut map = BTreeMap::new();
            for (key, val) in pairs {
                let Cbor::Text(key) = key else {
                    return Err(CodecError::decode("map key is not a text string"));
                };
                map.insert(key, from_cbor(val)?);
            }
            Ok(Value::Dict(map))
        }
        Cbor::Array(items) => Ok(Value::Array(
            items.into_iter().map(from_cbor).collect::<CodecResult<_>>()?,
        )),
        other => Err(CodecError::decode(format!(
            "unsupported CBOR shape: {other:?}"
        ))),
    }
}
