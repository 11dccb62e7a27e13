//! Schema document, normalization, and persistence.
//!
//! A raw schema declares each collection as a map of attribute specs to type
//! strings. The attribute name may carry a sigil: `*name` declares the
//! primary key, `+name` a unique secondary index, `~name` a non-unique
//! (containment) index. `users{*id:str, +email:str, age:int}` is spelled:
//!
//! ```text
//! { "*id": "str", "+email": "str", "age": "int" }
//! ```
//!
//! The document is versioned and persisted once under the reserved config
//! key; reopening with an explicitly different version fails.

use crate::error::{StoreError, StoreResult};
use lattice_codec::{storage, AttributeType, Value};
use std::collections::BTreeMap;

/// A raw, versioned schema document as supplied by the caller and persisted
/// in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    /// Schema version; compared on reopen.
    pub version: u32,
    /// Collection name to raw attribute map (sigiled name to type string).
    pub collections: BTreeMap<String, BTreeMap<String, String>>,
}

impl SchemaDocument {
    /// Creates an empty document with the given version.
    #[must_use]
    pub fn new(version: u32) -> Self {
        Self {
            version,
            collections: BTreeMap::new(),
        }
    }

    /// Adds a collection from `(attribute spec, type string)` pairs.
    #[must_use]
    pub fn collection<const N: usize>(mut self, name: &str, attrs: [(&str, &str); N]) -> Self {
        let map = attrs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.collections.insert(name.to_string(), map);
        self
    }

    /// Encodes the document to its storage representation.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let collections = self
            .collections
            .iter()
            .map(|(name, attrs)| {
                let attrs = attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                    .collect();
                (name.clone(), Value::Dict(attrs))
            })
            .collect();

        let mut doc = BTreeMap::new();
        doc.insert("version".to_string(), Value::Int(i64::from(self.version)));
        doc.insert("collections".to_string(), Value::Dict(collections));
        Ok(storage::to_storage(&Value::Dict(doc))?)
    }

    /// Decodes a document from its storage representation.
    ///
    /// # Errors
    ///
    /// Returns `Schema` if the stored bytes do not have the expected shape.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let value = storage::from_storage(bytes)?;
        let doc = value
            .as_dict()
            .ok_or_else(|| StoreError::schema("stored schema is not a map"))?;

        let version = doc
            .get("version")
            .and_then(Value::as_int)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| StoreError::schema("stored schema has no valid version"))?;

        let raw_collections = doc
            .get("collections")
            .and_then(Value::as_dict)
            .ok_or_else(|| StoreError::schema("stored schema has no collections map"))?;

        let mut collections = BTreeMap::new();
        for (name, attrs) in raw_collections {
            let attrs = attrs
                .as_dict()
                .ok_or_else(|| StoreError::schema(format!("collection {name} is not a map")))?;
            let mut spec = BTreeMap::new();
            for (attr, ty) in attrs {
                let ty = ty.as_str().ok_or_else(|| {
                    StoreError::schema(format!("attribute {name}.{attr} type is not a string"))
                })?;
                spec.insert(attr.clone(), ty.to_string());
            }
            collections.insert(name.clone(), spec);
        }

        Ok(Self {
            version,
            collections,
        })
    }
}

/// A normalized collection: primary key, typed attributes, and the secondary
/// index sets.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Collection name.
    pub name: String,
    /// Name of the primary attribute.
    pub primary: String,
    /// Attribute name to declared type, sigils stripped.
    pub attributes: BTreeMap<String, AttributeType>,
    /// Unique secondary attributes.
    pub unique: Vec<String>,
    /// Non-unique (containment) secondary attributes.
    pub indexed: Vec<String>,
}

impl Collection {
    /// Declared type of an attribute.
    #[must_use]
    pub fn attribute_type(&self, attribute: &str) -> Option<AttributeType> {
        self.attributes.get(attribute).copied()
    }

    /// True if the attribute carries a unique secondary index.
    #[must_use]
    pub fn is_unique(&self, attribute: &str) -> bool {
        self.unique.iter().any(|a| a == attribute)
    }

    /// True if the attribute carries a non-unique secondary index.
    #[must_use]
    pub fn is_indexed(&self, attribute: &str) -> bool {
        self.indexed.iter().any(|a| a == attribute)
    }
}

/// The normalized schema for a whole store.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Schema version the catalog was normalized from.
    pub version: u32,
    /// Normalized collections by name.
    pub collections: BTreeMap<String, Collection>,
}

impl Catalog {
    /// Looks up a collection.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCollection` if the name is not declared.
    pub fn collection(&self, name: &str) -> StoreResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::unknown_collection(name))
    }
}

/// Normalizes a raw schema document into a [`Catalog`].
///
/// # Errors
///
/// Returns `Schema` if a collection declares zero or more than one primary
/// attribute, an unparseable type, an array-typed primary or unique
/// attribute, or an empty name.
pub fn normalize(document: &SchemaDocument) -> StoreResult<Catalog> {
    if document.collections.is_empty() {
        return Err(StoreError::schema("schema declares no collections"));
    }

    let mut collections = BTreeMap::new();
    for (name, raw) in &document.collections {
        if name.is_empty() {
            return Err(StoreError::schema("collection name is empty"));
        }
        collections.insert(name.clone(), normalize_collection(name, raw)?);
    }

    Ok(Catalog {
        version: document.version,
        collections,
    })
}

fn normalize_collection(
    name: &str,
    raw: &BTreeMap<String, String>,
) -> StoreResult<Collection> {
    let mut primary = None;
    let mut attributes = BTreeMap::new();
    let mut unique = Vec::new();
    let mut indexed = Vec::new();

    for (spec, type_string) in raw {
        let (sigil, attr) = match spec.chars().next() {
            Some(c @ ('*' | '+' | '~')) => (Some(c), &spec[c.len_utf8()..]),
            Some(_) => (None, spec.as_str()),
            None => return Err(StoreError::schema(format!("{name}: empty attribute name"))),
        };
        if attr.is_empty() {
            return Err(StoreError::schema(format!(
                "{name}: attribute spec {spec:?} has no name"
            )));
        }

        let ty = AttributeType::parse(type_string).ok_or_else(|| {
            StoreError::schema(format!("{name}.{attr}: unknown type {type_string:?}"))
        })?;

        if attributes.insert(attr.to_string(), ty).is_some() {
            return Err(StoreError::schema(format!(
                "{name}.{attr}: attribute declared twice"
            )));
        }

        match sigil {
            Some('*') => {
                if ty.is_array() {
                    return Err(StoreError::schema(format!(
                        "{name}.{attr}: primary key cannot be array-typed"
                    )));
                }
                if primary.replace(attr.to_string()).is_some() {
                    return Err(StoreError::schema(format!(
                        "{name}: more than one primary attribute declared"
                    )));
                }
            }
            Some('+') => {
                if ty.is_array() {
                    return Err(StoreError::schema(format!(
                        "{name}.{attr}: unique index cannot be array-typed"
                    )));
                }
                unique.push(attr.to_string());
            }
            Some('~') => indexed.push(attr.to_string()),
            _ => {}
        }
    }

    let primary = primary.ok_or_else(|| {
        StoreError::schema(format!("{name}: no primary attribute declared"))
    })?;

    Ok(Collection {
        name: name.to_string(),
        primary,
        attributes,
        unique,
        indexed,
    })
}

/// Validates a record against a collection's declared attributes.
///
/// Every present attribute must be declared with a matching type; the
/// primary attribute must be present.
///
/// # Errors
///
/// Returns `Validation` on an unknown attribute, a type mismatch, or a
/// missing primary value.
pub fn validate_record(
    collection: &Collection,
    record: &BTreeMap<String, Value>,
) -> StoreResult<()> {
    if !record.contains_key(&collection.primary) {
        return Err(StoreError::validation(format!(
            "{}: record is missing primary attribute {:?}",
            collection.name, collection.primary
        )));
    }

    for (attr, value) in record {
        let ty = collection.attribute_type(attr).ok_or_else(|| {
            StoreError::validation(format!(
                "{}: unknown attribute {attr:?}",
                collection.name
            ))
        })?;
        if !value.matches(ty) {
            return Err(StoreError::validation(format!(
                "{}.{attr}: expected {ty}, got {}",
                collection.name,
                value.kind()
            )));
        }
    }

    Ok(())
}
