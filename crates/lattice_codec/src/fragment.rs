//! Key-fragment codec: value <-> key-safe escaped fragment.
//!
//! Fragments are spliced into keys as segments, so bytewise key order is
//! query order. String fragments are escaped UTF-8. Integer and float
//! fragments use a fixed-width, sign-aware binary layout emitted as hex, so
//! that lexicographic fragment order equals numeric order (naive decimal
//! formatting would sort `"10"` before `"9"`).

use crate::error::{CodecError, CodecResult};
use crate::key;
use crate::storage;
use crate::value::{AttributeType, Value};

const SIGN: u64 = 1 << 63;

/// Encodes a value as a key-safe fragment.
///
/// # Errors
///
/// Returns an error for array values; arrays are indexed per element, never
/// as a whole.
pub fn to_fragment(value: &Value) -> CodecResult<Vec<u8>> {
    match value {
        Value::Str(s) => Ok(key::escape_segment(s.as_bytes())),
        Value::Int(n) => Ok(hex16(int_bits(*n))),
        Value::Float(x) => Ok(hex16(float_bits(*x))),
        Value::Bool(b) => Ok(vec![if *b { b'1' } else { b'0' }]),
        Value::Dict(_) => Ok(key::escape_segment(&storage::to_storage(value)?)),
        Value::Array(_) => Err(CodecError::Unsupported {
            kind: "array",
            context: "key fragment",
        }),
    }
}

/// Decodes a fragment back into a value of the given attribute type.
///
/// Array types decode as their element type, since index entries hold one
/// fragment per element.
///
/// # Errors
///
/// Returns an error if the fragment is malformed for the type.
pub fn from_fragment(ty: AttributeType, fragment: &[u8]) -> CodecResult<Value> {
    match ty.scalar() {
        AttributeType::Str => {
            let raw = key::unescape_segment(fragment)?;
            String::from_utf8(raw)
                .map(Value::Str)
                .map_err(|_| CodecError::invalid_fragment("string fragment is not UTF-8"))
        }
        AttributeType::Int => Ok(Value::Int((unhex16(fragment)? ^ SIGN) as i64)),
        AttributeType::Float => {
            let bits = unhex16(fragment)?;
            let raw = if bits & SIGN != 0 { bits ^ SIGN } else { !bits };
            Ok(Value::Float(f64::from_bits(raw)))
        }
        AttributeType::Bool => match fragment {
            b"0" => Ok(Value::Bool(false)),
            b"1" => Ok(Value::Bool(true)),
            _ => Err(CodecError::invalid_fragment("bool fragment is not 0 or 1")),
        },
        AttributeType::Dict => {
            let raw = key::unescape_segment(fragment)?;
            storage::from_storage(&raw)
        }
        AttributeType::Array(_) => unreachable!("scalar() never returns an array type"),
    }
}

/// Offset-binary transform: flips the sign bit so negative integers sort
/// below positive ones in unsigned byte order.
#[allow(clippy::cast_sign_loss)]
const fn int_bits(n: i64) -> u64 {
    (n as u64) ^ SIGN
}

/// IEEE-754 total-order transform: non-negative floats get the sign bit
/// set, negative floats are bitwise inverted.
fn float_bits(x: f64) -> u64 {
    let bits = x.to_bits();
    if bits & SIGN == 0 {
        bits | SIGN
    } else {
        !bits
    }
}

fn hex16(bits: u64) -> Vec<u8> {
    format!("{bits:016x}").into_bytes()
}

fn unhex16(fragment: &[u8]) -> CodecResult<u64> {
    if fragment.len() != 16 {
        return Err(CodecError::invalid_fragment(format!(
            "numeric fragment has length {}, expected 16",
            fragment.len()
        )));
    }
    let text = std::str::from_utf8(fragment)
        .map_err(|_| CodecError::invalid_fragment("numeric fragment is not ASCII hex"))?;
    u64::from_str_radix(text, 16)
        .map_err(|_| CodecError::invalid_fragment("numeric fragment is not ASCII hex"))
}
