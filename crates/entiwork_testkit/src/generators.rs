//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random references, property values
//! and entity records.

use entiwork_codec::{EntityRecord, Value};
use entiwork_core::EntityReference;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating entity references.
pub fn reference_strategy() -> impl Strategy<Value = EntityReference> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,23}")
        .expect("Invalid regex")
        .prop_map(EntityReference::new)
}

/// Strategy for generating state names (properties and associations).
pub fn state_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        ".{0,32}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// Strategy for generating values nested up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(state_name_strategy(), inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating property maps.
pub fn property_map_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(state_name_strategy(), value_strategy(), 0..8)
}

/// Strategy for generating complete entity records.
pub fn entity_record_strategy() -> impl Strategy<Value = EntityRecord> {
    (
        reference_strategy(),
        prop::string::string_regex("[A-Z][a-zA-Z]{0,11}").expect("Invalid regex"),
        any::<u64>(),
        property_map_strategy(),
        prop::collection::btree_map(state_name_strategy(), reference_strategy(), 0..3),
        prop::collection::btree_map(
            state_name_strategy(),
            prop::collection::vec(reference_strategy(), 0..4),
            0..3,
        ),
    )
        .prop_map(|(identity, entity_type, last_modified, properties, one, many)| {
            let mut record = EntityRecord::new(identity.into_string(), entity_type)
                .with_last_modified(last_modified);
            record.properties = properties;
            record.associations = one
                .into_iter()
                .map(|(name, target)| (name, target.into_string()))
                .collect();
            record.many_associations = many
                .into_iter()
                .map(|(name, targets)| {
                    (name, targets.into_iter().map(EntityReference::into_string).collect())
                })
                .collect();
            record
        })
}
