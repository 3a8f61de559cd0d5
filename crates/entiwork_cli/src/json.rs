//! Conversion of decoded records into plain JSON.

use entiwork_codec::{EntityRecord, Value};
use serde_json::{json, Map, Value as Json};

/// Converts a property value into its natural JSON shape.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

/// Converts a whole record, adding the store version.
pub fn record_to_json(record: &EntityRecord, version: u64) -> Json {
    let properties: Map<String, Json> = record
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    let named: Map<String, Json> = record
        .named_associations
        .iter()
        .map(|(name, entries)| {
            // Pairs rather than an object: entry order is significant.
            let pairs = entries
                .iter()
                .map(|(key, target)| json!([key, target]))
                .collect();
            (name.clone(), Json::Array(pairs))
        })
        .collect();

    json!({
        "identity": record.identity,
        "type": record.entity_type,
        "version": version,
        "last_modified": record.last_modified,
        "properties": properties,
        "associations": record.associations,
        "many_associations": record.many_associations,
        "named_associations": named,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_values_become_plain_json() {
        let value = Value::map([
            ("name", Value::from("foo")),
            ("tags", Value::Array(vec![Value::from(1i64), Value::Null])),
        ]);
        assert_eq!(
            value_to_json(&value),
            json!({"name": "foo", "tags": [1, null]})
        );
    }

    #[test]
    fn record_json_keeps_named_association_order() {
        let mut record = EntityRecord::new("a", "Person").with_property("name", "foo");
        record
            .associations
            .insert("employer".to_string(), "acme".to_string());
        record.named_associations.insert(
            "contacts".to_string(),
            vec![
                ("work".to_string(), "c".to_string()),
                ("home".to_string(), "b".to_string()),
            ],
        );

        let out = record_to_json(&record, 3);
        assert_eq!(out["version"], json!(3));
        assert_eq!(out["properties"]["name"], json!("foo"));
        assert_eq!(out["associations"]["employer"], json!("acme"));
        assert_eq!(
            out["named_associations"]["contacts"],
            json!([["work", "c"], ["home", "b"]])
        );
    }
}
