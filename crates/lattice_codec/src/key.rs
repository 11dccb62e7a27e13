//! Hierarchical key builder.
//!
//! Keys are sequences of escaped segments joined by a reserved separator
//! byte and anchored at the root, so the whole key space forms one ordered
//! tree. The escape scheme is order-preserving: escaping never changes the
//! relative order of two segments.
//!
//! A region (a record's attribute list, an index's entry range, a whole
//! collection) is bounded by a terminal [`REGION_END`] segment. Escaped
//! content is valid UTF-8 and encoded fragments are ASCII, so every content
//! byte is below `0xFF` and the sentinel sorts after every real child key.

use crate::error::{CodecError, CodecResult};

/// Separator byte between key segments.
pub const SEPARATOR: u8 = 0x00;

/// Escape byte inside key segments.
pub const ESCAPE: u8 = 0x01;

/// Terminal segment marking the exclusive end of a region.
pub const REGION_END: &[u8] = &[0xFF];

/// Escapes a raw segment so it contains neither the separator nor a bare
/// escape byte: `0x00` becomes `0x01 0x02`, `0x01` becomes `0x01 0x03`.
#[must_use]
pub fn escape_segment(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw {
        match byte {
            SEPARATOR => out.extend_from_slice(&[ESCAPE, 0x02]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, 0x03]),
            other => out.push(other),
        }
    }
    out
}

/// Reverses [`escape_segment`].
///
/// # Errors
///
/// Returns an error on a trailing or unknown escape sequence, or on a bare
/// separator byte inside the segment.
pub fn unescape_segment(segment: &[u8]) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(segment.len());
    let mut iter = segment.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            ESCAPE => match iter.next() {
                Some(0x02) => out.push(SEPARATOR),
                Some(0x03) => out.push(ESCAPE),
                Some(other) => {
                    return Err(CodecError::invalid_segment(format!(
                        "unknown escape sequence 0x01 0x{other:02x}"
                    )))
                }
                None => return Err(CodecError::invalid_segment("trailing escape byte")),
            },
            SEPARATOR => {
                return Err(CodecError::invalid_segment(
                    "unescaped separator inside segment",
                ))
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Joins pre-escaped segments into a key anchored at the root.
#[must_use]
pub fn compose(segments: &[&[u8]]) -> Vec<u8> {
    let total: usize = segments.iter().map(|s| s.len() + 1).sum();
    let mut key = Vec::with_capacity(total);
    for segment in segments {
        key.push(SEPARATOR);
        key.extend_from_slice(segment);
    }
    key
}

/// Appends one pre-escaped segment to an existing key.
#[must_use]
pub fn child(key: &[u8], segment: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + segment.len() + 1);
    out.extend_from_slice(key);
    out.push(SEPARATOR);
    out.extend_from_slice(segment);
    out
}

/// The exclusive upper bound of the region rooted at `key`: its
/// [`REGION_END`] child.
#[must_use]
pub fn region_end(key: &[u8]) -> Vec<u8> {
    child(key, REGION_END)
}

/// The smallest key strictly greater than `key`.
///
/// Used for keyset pagination: resuming a scan at the successor of the last
/// consumed key yields no overlap and no gap.
#[must_use]
pub fn successor(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(SEPARATOR);
    out
}

/// Splits a key into its still-escaped segments.
///
/// # Errors
///
/// Returns an error if the key is empty or not anchored at the root.
pub fn split(key: &[u8]) -> CodecResult<Vec<&[u8]>> {
    match key.first() {
        Some(&SEPARATOR) => Ok(key[1..].split(|&b| b == SEPARATOR).collect()),
        Some(_) => Err(CodecError::invalid_segment("key is not anchored at root")),
        None => Err(CodecError::invalid_segment("empty key")),
    }
}

/// Returns true if `segment` is the [`REGION_END`] sentinel.
#[must_use]
pub fn is_region_end(segment: &[u8]) -> bool {
    segment == REGION_END
}
