//! Key-space layout.
//!
//! The whole store lives in one ordered byte-key tree:
//!
//! ```text
//! /c                          schema document
//! /r/<coll>                   collection begin anchor
//! /r/<coll>/<pk>              record anchor (value: encoded primary value)
//! /r/<coll>/<pk>/<attr>       record field
//! /r/<coll>/<pk>/0xFF         record end sentinel
//! /r/<coll>/0xFF              collection end anchor
//! /u/<coll>/<attr>            unique index begin anchor
//! /u/<coll>/<attr>/<val>      unique entry (value: encoded primary value)
//! /u/<coll>/<attr>/0xFF       unique index end anchor
//! /i/<coll>/<attr>            containment index begin anchor
//! /i/<coll>/<attr>/<val>/<pk> containment entry (value: encoded primary value)
//! /i/<coll>/<attr>/0xFF       containment index end anchor
//! ```
//!
//! `<pk>` and `<val>` are key fragments, `<coll>` and `<attr>` escaped
//! names. Scans over a region are bounded by its begin/end anchors, so a
//! forward iterator never spills into a neighboring attribute or collection.

use crate::schema::Catalog;
use lattice_codec::key;
use lattice_kv::BatchOp;

const TAG_CONFIG: &[u8] = b"c";
const TAG_RECORD: &[u8] = b"r";
const TAG_UNIQUE: &[u8] = b"u";
const TAG_INDEX: &[u8] = b"i";

/// The reserved key holding the schema document.
#[must_use]
pub(crate) fn config_key() -> Vec<u8> {
    key::compose(&[TAG_CONFIG])
}

/// Begin anchor of a collection's record region.
#[must_use]
pub(crate) fn collection_key(collection: &str) -> Vec<u8> {
    key::compose(&[TAG_RECORD, &key::escape_segment(collection.as_bytes())])
}

/// End anchor of a collection's record region.
#[must_use]
pub(crate) fn collection_end(collection: &str) -> Vec<u8> {
    key::region_end(&collection_key(collection))
}

/// Record anchor for a primary-key fragment.
#[must_use]
pub(crate) fn record_key(collection: &str, pk: &[u8]) -> Vec<u8> {
    key::child(&collection_key(collection), pk)
}

/// Field entry under a record's region.
#[must_use]
pub(crate) fn record_field_key(collection: &str, pk: &[u8], attribute: &str) -> Vec<u8> {
    key::child(
        &record_key(collection, pk),
        &key::escape_segment(attribute.as_bytes()),
    )
}

/// End sentinel of a record's region.
#[must_use]
pub(crate) fn record_end_key(collection: &str, pk: &[u8]) -> Vec<u8> {
    key::region_end(&record_key(collection, pk))
}

/// Exclusive upper bound covering a record's whole region including the end
/// sentinel.
#[must_use]
pub(crate) fn record_region_upper(collection: &str, pk: &[u8]) -> Vec<u8> {
    key::successor(&record_end_key(collection, pk))
}

/// Begin anchor of a unique index.
#[must_use]
pub(crate) fn unique_root(collection: &str, attribute: &str) -> Vec<u8> {
    key::compose(&[
        TAG_UNIQUE,
        &key::escape_segment(collection.as_bytes()),
        &key::escape_segment(attribute.as_bytes()),
    ])
}

/// Unique index entry for a value fragment.
#[must_use]
pub(crate) fn unique_entry(collection: &str, attribute: &str, value: &[u8]) -> Vec<u8> {
    key::child(&unique_root(collection, attribute), value)
}

/// End anchor of a unique index.
#[must_use]
pub(crate) fn unique_end(collection: &str, attribute: &str) -> Vec<u8> {
    key::region_end(&unique_root(collection, attribute))
}

/// Begin anchor of a containment index.
#[must_use]
pub(crate) fn index_root(collection: &str, attribute: &str) -> Vec<u8> {
    key::compose(&[
        TAG_INDEX,
        &key::escape_segment(collection.as_bytes()),
        &key::escape_segment(attribute.as_bytes()),
    ])
}

/// Prefix key shared by every containment entry for one value fragment.
#[must_use]
pub(crate) fn index_value_key(collection: &str, attribute: &str, value: &[u8]) -> Vec<u8> {
    key::child(&index_root(collection, attribute), value)
}

/// Containment index entry for a `(value fragment, primary fragment)` pair.
#[must_use]
pub(crate) fn index_entry(
    collection: &str,
    attribute: &str,
    value: &[u8],
    pk: &[u8],
) -> Vec<u8> {
    key::child(&index_value_key(collection, attribute, value), pk)
}

/// End anchor of a containment index.
#[must_use]
pub(crate) fn index_end(collection: &str, attribute: &str) -> Vec<u8> {
    key::region_end(&index_root(collection, attribute))
}

/// The anchor entries seeded for every collection when the schema is first
/// written: collection begin/end plus begin/end for each secondary index
/// region, all in one batch together with the schema document.
#[must_use]
pub(crate) fn seed_anchor_batch(catalog: &Catalog) -> Vec<BatchOp> {
    let mut ops = Vec::new();
    for collection in catalog.collections.values() {
        ops.push(BatchOp::put(collection_key(&collection.name), Vec::new()));
        ops.push(BatchOp::put(collection_end(&collection.name), Vec::new()));
        for attribute in &collection.unique {
            ops.push(BatchOp::put(
                unique_root(&collection.name, attribute),
                Vec::new(),
            ));
            ops.push(BatchOp::put(
                unique_end(&collection.name, attribute),
                Vec::new(),
            ));
        }
        for attribute in &collection.indexed {
            ops.push(BatchOp::put(
                index_root(&collection.name, attribute),
                Vec::new(),
            ));
            ops.push(BatchOp::put(
                index_end(&collection.name, attribute),
                Vec::new(),
            ));
        }
    }
    ops
}

/// Splits a key from a collection's record region into its meaningful
/// parts.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RecordRegionKey {
    /// The collection begin anchor.
    CollectionBegin,
    /// The collection end anchor.
    CollectionEnd,
    /// A record anchor; carries the primary-key fragment.
    Anchor(Vec<u8>),
    /// A field entry; carries the primary-key fragment and attribute name.
    Field(Vec<u8>, String),
    /// A record end sentinel; carries the primary-key fragment.
    RecordEnd(Vec<u8>),
}

/// Classifies a raw key inside `/r/<coll>/...`.
///
/// Returns `None` for keys that do not belong to a record region.
pub(crate) fn parse_record_region_key(raw: &[u8]) -> Option<RecordRegionKey> {
    let segments = key::split(raw).ok()?;
    if segments.first().copied() != Some(TAG_RECORD) {
        return None;
    }
    match segments.len() {
        2 => Some(RecordRegionKey::CollectionBegin),
        3 => {
            if key::is_region_end(segments[2]) {
                Some(RecordRegionKey::CollectionEnd)
            } else {
                Some(RecordRegionKey::Anchor(segments[2].to_vec()))
            }
        }
        4 => {
            let pk = segments[2].to_vec();
            if key::is_region_end(segments[3]) {
                Some(RecordRegionKey::RecordEnd(pk))
            } else {
                let attr = key::unescape_segment(segments[3]).ok()?;
                Some(RecordRegionKey::Field(pk, String::from_utf8(attr).ok()?))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{normalize, SchemaDocument};
    use proptest::prelude::*;

    #[test]
    fn record_region_key_order() {
        let begin = collection_key("users");
        let anchor = record_key("users", b"u1");
        let field = record_field_key("users", b"u1", "age");
        let end = record_end_key("users", b"u1");
        let next_anchor = record_key("users", b"u2");
        let coll_end = collection_end("users");

        assert!(begin < anchor);
        assert!(anchor < field);
        assert!(field < end);
        assert!(end < next_anchor);
        assert!(next_anchor < coll_end);
    }

    #[test]
    fn prefix_primary_keys_stay_disjoint() {
        // "u1" is a byte prefix of "u10"; regions must still not interleave.
        let end_u1 = record_region_upper("users", b"u1");
        let anchor_u10 = record_key("users", b"u10");
        assert!(record_end_key("users", b"u1") < anchor_u10);
        assert!(end_u1 < anchor_u10);
    }

    #[test]
    fn parse_record_region_keys() {
        assert_eq!(
            parse_record_region_key(&collection_key("users")),
            Some(RecordRegionKey::CollectionBegin)
        );
        assert_eq!(
            parse_record_region_key(&collection_end("users")),
            Some(RecordRegionKey::CollectionEnd)
        );
        assert_eq!(
            parse_record_region_key(&record_key("users", b"u1")),
            Some(RecordRegionKey::Anchor(b"u1".to_vec()))
        );
        assert_eq!(
            parse_record_region_key(&record_field_key("users", b"u1", "age")),
            Some(RecordRegionKey::Field(b"u1".to_vec(), "age".to_string()))
        );
        assert_eq!(
            parse_record_region_key(&record_end_key("users", b"u1")),
            Some(RecordRegionKey::RecordEnd(b"u1".to_vec()))
        );
        assert_eq!(parse_record_region_key(&unique_root("users", "email")), None);
    }

    #[test]
    fn index_regions_are_disjoint_per_attribute() {
        let email_end = unique_end("users", "email");
        let name_root = unique_root("users", "name");
        assert!(email_end < name_root);
    }

    #[test]
    fn seed_batch_covers_all_regions() {
        let doc = SchemaDocument::new(1).collection(
            "users",
            [("*id", "str"), ("+email", "str"), ("~tags", "str[]")],
        );
        let catalog = normalize(&doc).unwrap();
        let ops = seed_anchor_batch(&catalog);
        // begin/end for the collection, the unique index, and the
        // containment index.
        assert_eq!(ops.len(), 6);
    }

    proptest! {
        #[test]
        fn field_keys_parse_back(
            coll in "[a-z][a-z0-9_]{0,12}",
            attr in "[a-z][a-z0-9_]{0,12}",
            pk in prop::collection::vec(any::<u8>(), 0..16),
        ) {
            let frag = lattice_codec::key::escape_segment(&pk);
            let raw = record_field_key(&coll, &frag, &attr);
            let parsed = parse_record_region_key(&raw);
            prop_assert_eq!(parsed, Some(RecordRegionKey::Field(frag, attr)));
        }
    }
}
