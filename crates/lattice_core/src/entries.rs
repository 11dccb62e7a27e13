//! Index materializer: record <-> key-value entry set.
//!
//! A live record is the union of its primary anchor, one entry per
//! non-primary attribute, its end sentinel, and one pointer per declared
//! secondary index value (one per element for array attributes). The whole
//! set is written and removed as a single atomic batch, so a scan either
//! sees a complete record or none of it.

use crate::error::{StoreError, StoreResult};
use crate::keyspace::{self, RecordRegionKey};
use crate::schema::Collection;
use crate::Record;
use lattice_codec::{fragment, storage, CodecError, Value};
use lattice_kv::{BatchOp, KvBackend, KvCursor};

/// Encodes the primary-key fragment of a record.
///
/// # Errors
///
/// Returns `Validation` if the record has no primary value.
pub(crate) fn primary_fragment(collection: &Collection, record: &Record) -> StoreResult<Vec<u8>> {
    let primary = record.get(&collection.primary).ok_or_else(|| {
        StoreError::validation(format!(
            "{}: record is missing primary attribute {:?}",
            collection.name, collection.primary
        ))
    })?;
    Ok(fragment::to_fragment(primary)?)
}

/// Expands a record into the ordered batch of `put` operations that make it
/// visible: anchor, fields, end sentinel, then every secondary pointer.
pub(crate) fn record_batch(
    collection: &Collection,
    record: &Record,
) -> StoreResult<Vec<BatchOp>> {
    let primary = record.get(&collection.primary).ok_or_else(|| {
        StoreError::validation(format!(
            "{}: record is missing primary attribute {:?}",
            collection.name, collection.primary
        ))
    })?;
    let pk = fragment::to_fragment(primary)?;
    let pointer = storage::to_storage(primary)?;

    let mut ops = Vec::with_capacity(record.len() + 2);
    ops.push(BatchOp::put(
        keyspace::record_key(&collection.name, &pk),
        pointer.clone(),
    ));
    for (attribute, value) in record {
        if attribute == &collection.primary {
            continue;
        }
        ops.push(BatchOp::put(
            keyspace::record_field_key(&collection.name, &pk, attribute),
            storage::to_storage(value)?,
        ));
    }
    ops.push(BatchOp::put(
        keyspace::record_end_key(&collection.name, &pk),
        Vec::new(),
    ));

    for attribute in &collection.unique {
        if let Some(value) = record.get(attribute) {
            ops.push(BatchOp::put(
                keyspace::unique_entry(&collection.name, attribute, &fragment::to_fragment(value)?),
                pointer.clone(),
            ));
        }
    }
    for attribute in &collection.indexed {
        if let Some(value) = record.get(attribute) {
            for element in index_elements(value) {
                ops.push(BatchOp::put(
                    keyspace::index_entry(
                        &collection.name,
                        attribute,
                        &fragment::to_fragment(element)?,
                        &pk,
                    ),
                    pointer.clone(),
                ));
            }
        }
    }

    Ok(ops)
}

/// The inverse of [`record_batch`]: the delete operations removing every
/// entry of a stored record.
pub(crate) fn record_removal(
    collection: &Collection,
    record: &Record,
) -> StoreResult<Vec<BatchOp>> {
    let ops = record_batch(collection, record)?
        .into_iter()
        .map(|op| match op {
            BatchOp::Put { key, .. } | BatchOp::Del { key } => BatchOp::del(key),
        })
        .collect();
    Ok(ops)
}

/// The index entries contributed by one stored attribute value: each element
/// for arrays, the value itself for scalars.
pub(crate) fn index_elements(value: &Value) -> impl Iterator<Item = &Value> {
    match value {
        Value::Array(items) => items.iter(),
        other => std::slice::from_ref(other).iter(),
    }
}

/// A record reassembled from a primary-region scan.
#[derive(Debug)]
pub(crate) struct AssembledRecord {
    /// Primary-key fragment, as it appears in keys.
    pub pk: Vec<u8>,
    /// The reassembled record, primary attribute included.
    pub record: Record,
    /// Raw key of the last entry consumed for this record; its successor is
    /// the seek cursor.
    pub last_key: Vec<u8>,
}

/// Reassembles records from forward scans over a collection's record
/// region.
pub(crate) struct RecordAssembler<'c> {
    collection: &'c Collection,
}

impl<'c> RecordAssembler<'c> {
    pub(crate) fn new(collection: &'c Collection) -> Self {
        Self { collection }
    }

    /// Consumes entries until one full record (anchor through end sentinel)
    /// has been read. Anchor keys of the surrounding collection region are
    /// skipped; cursor exhaustion mid-record yields the fields read so far,
    /// since the scan bound may exclude the sentinel.
    pub(crate) fn next_record(
        &self,
        cursor: &mut dyn KvCursor,
    ) -> StoreResult<Option<AssembledRecord>> {
        let mut current: Option<AssembledRecord> = None;

        while let Some((raw_key, raw_value)) = cursor.next()? {
            match keyspace::parse_record_region_key(&raw_key) {
                Some(RecordRegionKey::CollectionBegin) => {}
                Some(RecordRegionKey::CollectionEnd) => break,
                Some(RecordRegionKey::Anchor(pk)) => {
                    if current.is_some() {
                        return Err(CodecError::decode(
                            "record region is missing its end sentinel",
                        )
                        .into());
                    }
                    let primary = storage::from_storage(&raw_value)?;
                    let mut record = Record::new();
                    record.insert(self.collection.primary.clone(), primary);
                    current = Some(AssembledRecord {
                        pk,
                        record,
                        last_key: raw_key,
                    });
                }
                Some(RecordRegionKey::Field(_, attribute)) => {
                    // A field without a preceding anchor means the scan
                    // resumed mid-record; those entries belong to a record
                    // already consumed by the previous page.
                    if let Some(assembled) = current.as_mut() {
                        assembled
                            .record
                            .insert(attribute, storage::from_storage(&raw_value)?);
                        assembled.last_key = raw_key;
                    }
                }
                Some(RecordRegionKey::RecordEnd(_)) => {
                    if let Some(mut assembled) = current.take() {
                        assembled.last_key = raw_key;
                        return Ok(Some(assembled));
                    }
                }
                None => {}
            }
        }

        Ok(current)
    }
}

impl RecordAssembler<'_> {
    /// The reverse-scan counterpart of [`RecordAssembler::next_record`]: a
    /// record's entries arrive end sentinel first and anchor last, so the
    /// anchor terminates assembly. `last_key` ends up as the anchor key, the
    /// lowest key consumed, which is exactly the reverse-pagination
    /// boundary.
    pub(crate) fn next_record_reverse(
        &self,
        cursor: &mut dyn KvCursor,
    ) -> StoreResult<Option<AssembledRecord>> {
        let mut current: Option<AssembledRecord> = None;

        while let Some((raw_key, raw_value)) = cursor.next()? {
            match keyspace::parse_record_region_key(&raw_key) {
                Some(RecordRegionKey::CollectionEnd) => {}
                Some(RecordRegionKey::CollectionBegin) => break,
                Some(RecordRegionKey::RecordEnd(pk)) => {
                    if current.is_some() {
                        return Err(CodecError::decode(
                            "record region is missing its anchor",
                        )
                        .into());
                    }
                    current = Some(AssembledRecord {
                        pk,
                        record: Record::new(),
                        last_key: raw_key,
                    });
                }
                Some(RecordRegionKey::Field(_, attribute)) => {
                    if let Some(assembled) = current.as_mut() {
                        assembled
                            .record
                            .insert(attribute, storage::from_storage(&raw_value)?);
                        assembled.last_key = raw_key;
                    }
                }
                Some(RecordRegionKey::Anchor(_)) => {
                    if let Some(mut assembled) = current.take() {
                        assembled
                            .record
                            .insert(self.collection.primary.clone(), storage::from_storage(&raw_value)?);
                        assembled.last_key = raw_key;
                        return Ok(Some(assembled));
                    }
                    // An anchor without its sentinel below the upper bound
                    // belongs to a record the previous page already
                    // consumed.
                }
                None => {}
            }
        }

        // A record cut off before its anchor has no primary value; it lies
        // outside the bounded range.
        Ok(None)
    }
}

/// Reads one record by primary-key fragment, walking its region.
pub(crate) fn fetch_record(
    backend: &dyn KvBackend,
    collection: &Collection,
    pk: &[u8],
) -> StoreResult<Option<AssembledRecord>> {
    let lower = keyspace::record_key(&collection.name, pk);
    let upper = keyspace::record_region_upper(&collection.name, pk);
    let mut cursor = backend.scan(&lower, &upper, false)?;
    RecordAssembler::new(collection).next_record(cursor.as_mut())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{normalize, SchemaDocument};
    use lattice_kv::MemoryBackend;

    fn users() -> Collection {
        let doc = SchemaDocument::new(1).collection(
            "users",
            [
                ("*id", "str"),
                ("+email", "str"),
                ("age", "int"),
                ("~tags", "str[]"),
            ],
        );
        normalize(&doc).unwrap().collection("users").unwrap().clone()
    }

    fn alice() -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::Str("u1".into()));
        record.insert("email".to_string(), Value::Str("a@x.com".into()));
        record.insert("age".to_string(), Value::Int(30));
        record.insert("tags".to_string(), Value::from(vec!["x", "y"]));
        record
    }

    #[test]
    fn batch_covers_full_entry_set() {
        let collection = users();
        let ops = record_batch(&collection, &alice()).unwrap();
        // anchor + 3 non-primary fields + sentinel + 1 unique pointer
        // + 2 containment pointers.
        assert_eq!(ops.len(), 8);
        assert!(ops
            .iter()
            .all(|op| matches!(op, BatchOp::Put { .. })));
    }

    #[test]
    fn removal_mirrors_batch() {
        let collection = users();
        let puts = record_batch(&collection, &alice()).unwrap();
        let dels = record_removal(&collection, &alice()).unwrap();
        assert_eq!(puts.len(), dels.len());
        assert!(dels.iter().all(|op| matches!(op, BatchOp::Del { .. })));
    }

    #[test]
    fn absent_optional_attributes_produce_no_entries() {
        let collection = users();
        let mut record = Record::new();
        record.insert("id".to_string(), Value::Str("u2".into()));
        let ops = record_batch(&collection, &record).unwrap();
        // anchor + sentinel only.
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn scalar_indexed_attribute_gets_one_pointer() {
        let doc = SchemaDocument::new(1)
            .collection("events", [("*id", "str"), ("~kind", "str")]);
        let collection = normalize(&doc)
            .unwrap()
            .collection("events")
            .unwrap()
            .clone();

        let mut record = Record::new();
        record.insert("id".to_string(), Value::Str("e1".into()));
        record.insert("kind".to_string(), Value::Str("click".into()));
        let ops = record_batch(&collection, &record).unwrap();
        // anchor + field + sentinel + one pointer.
        assert_eq!(ops.len(), 4);
    }

    #[test]
    fn roundtrip_through_backend() {
        let collection = users();
        let record = alice();
        let backend = MemoryBackend::new();
        backend
            .batch(record_batch(&collection, &record).unwrap())
            .unwrap();

        let pk = primary_fragment(&collection, &record).unwrap();
        let assembled = fetch_record(&backend, &collection, &pk)
            .unwrap()
            .expect("record present");
        assert_eq!(assembled.record, record);
        assert_eq!(assembled.pk, pk);
    }

    #[test]
    fn fetch_missing_record_is_none() {
        let collection = users();
        let backend = MemoryBackend::new();
        assert!(fetch_record(&backend, &collection, b"nope")
            .unwrap()
            .is_none());
    }

    #[test]
    fn assembler_streams_consecutive_records() {
        let collection = users();
        let backend = MemoryBackend::new();

        for id in ["u1", "u2", "u3"] {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::Str(id.into()));
            record.insert("age".to_string(), Value::Int(30));
            backend
                .batch(record_batch(&collection, &record).unwrap())
                .unwrap();
        }

        let lower = lattice_codec::key::successor(&keyspace::collection_key("users"));
        let upper = keyspace::collection_end("users");
        let mut cursor = backend.scan(&lower, &upper, false).unwrap();
        let assembler = RecordAssembler::new(&collection);

        let mut ids = Vec::new();
        while let Some(assembled) = assembler.next_record(cursor.as_mut()).unwrap() {
            ids.push(assembled.record["id"].clone());
        }
        assert_eq!(
            ids,
            vec![
                Value::Str("u1".into()),
                Value::Str("u2".into()),
                Value::Str("u3".into())
            ]
        );
    }
}
