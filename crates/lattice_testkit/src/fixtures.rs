//! Test fixtures and store helpers.

use lattice_core::{Record, SchemaDocument, Store, Value};
use std::collections::BTreeMap;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// Kept alive so the backing file outlives the store.
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory test store with the given schema.
    pub fn memory(schema: SchemaDocument) -> Self {
        Self {
            store: Store::open("mem:", Some(schema)).expect("failed to open in-memory store"),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed test store with the given schema.
    pub fn file(schema: SchemaDocument) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let url = format!("kv:{}", temp_dir.path().join("test.lkv").display());
        Self {
            store: Store::open(&url, Some(schema)).expect("failed to open file store"),
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

/// The `users{*id:str, +email:str, age:int, ~tags:str[]}` schema most
/// examples and tests are written against.
#[must_use]
pub fn users_schema() -> SchemaDocument {
    SchemaDocument::new(1).collection(
        "users",
        [
            ("*id", "str"),
            ("+email", "str"),
            ("age", "int"),
            ("~tags", "str[]"),
        ],
    )
}

/// Builds a record from a JSON literal, mapping JSON shapes onto the value
/// model (numbers become `Int` when integral, `Float` otherwise).
///
/// # Panics
///
/// Panics on JSON that is not an object or contains a null.
#[must_use]
pub fn record_from_json(json: serde_json::Value) -> Record {
    let serde_json::Value::Object(map) = json else {
        panic!("record JSON must be an object");
    };
    map.into_iter()
        .map(|(name, value)| (name, value_from_json(value)))
        .collect()
}

fn value_from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .expect("unrepresentable number"),
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(map) => Value::Dict(
            map.into_iter()
                .map(|(k, v)| (k, value_from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        serde_json::Value::Null => panic!("records never store nulls"),
    }
}
