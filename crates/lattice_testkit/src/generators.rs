//! Property-based test generators using proptest.
//!
//! Strategies for random schema-conformant values and records.

use lattice_core::{AttributeType, Collection, ElementType, Record, Value};
use proptest::prelude::*;

/// Strategy for valid collection and attribute names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("invalid regex")
}

/// Strategy for scalar values of one element type.
pub fn element_strategy(element: ElementType) -> BoxedStrategy<Value> {
    match element {
        ElementType::Str => "[a-zA-Z0-9 /_-]{0,24}".prop_map(Value::Str).boxed(),
        ElementType::Int => any::<i64>().prop_map(Value::Int).boxed(),
        ElementType::Float => prop::num::f64::NORMAL.prop_map(Value::Float).boxed(),
        ElementType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ElementType::Dict => prop::collection::btree_map(
            name_strategy(),
            any::<i64>().prop_map(Value::Int),
            0..4,
        )
        .prop_map(Value::Dict)
        .boxed(),
    }
}

/// Strategy for values conforming to one attribute type.
pub fn value_strategy(ty: AttributeType) -> BoxedStrategy<Value> {
    match ty {
        AttributeType::Str => element_strategy(ElementType::Str),
        AttributeType::Int => element_strategy(ElementType::Int),
        AttributeType::Float => element_strategy(ElementType::Float),
        AttributeType::Bool => element_strategy(ElementType::Bool),
        AttributeType::Dict => element_strategy(ElementType::Dict),
        AttributeType::Array(element) => {
            prop::collection::vec(element_strategy(element), 0..6)
                .prop_map(Value::Array)
                .boxed()
        }
    }
}

/// Strategy for records conforming to a collection: the primary attribute
/// is always present, other attributes appear with probability 1/2.
pub fn record_strategy(collection: &Collection) -> BoxedStrategy<Record> {
    let primary = collection.primary.clone();
    let attrs: Vec<(String, AttributeType)> = collection
        .attributes
        .iter()
        .map(|(name, ty)| (name.clone(), *ty))
        .collect();

    attrs.into_iter().fold(
        Just(Record::new()).boxed(),
        move |acc, (name, ty)| {
            let required = name == primary;
            (acc, value_strategy(ty), any::<bool>())
                .prop_map(move |(mut record, value, present)| {
                    if required || present {
                        record.insert(name.clone(), value);
                    }
                    record
                })
                .boxed()
        },
    )
}
