//! Persisted form of an entity's state.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format version byte written in front of every encoded record.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// The storable form of one entity.
///
/// Every map is a `BTreeMap`, so a record always serializes its state names
/// in sorted order and equal records produce equal bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity identity.
    pub identity: String,
    /// Name of the entity type.
    pub entity_type: String,
    /// Last modification time in milliseconds since the Unix epoch.
    pub last_modified: u64,
    /// Property values by name.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Single associations by name.
    #[serde(default)]
    pub associations: BTreeMap<String, String>,
    /// Ordered many-associations by name.
    #[serde(default)]
    pub many_associations: BTreeMap<String, Vec<String>>,
    /// Named associations by name, as ordered `(name, identity)` pairs.
    #[serde(default)]
    pub named_associations: BTreeMap<String, Vec<(String, String)>>,
}

impl EntityRecord {
    /// Creates an empty record for the given identity and type.
    pub fn new(identity: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    /// Sets a property, builder style.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Sets the last-modified time, builder style.
    #[must_use]
    pub fn with_last_modified(mut self, millis: u64) -> Self {
        self.last_modified = millis;
        self
    }

    /// Encodes this record. See [`encode_record`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        encode_record(self)
    }

    /// Decodes a record. See [`decode_record`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid record.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        decode_record(bytes)
    }
}

/// Encodes a record as `[RECORD_FORMAT_VERSION] ++ CBOR(record)`.
///
/// # Errors
///
/// Returns `EncodingFailed` if the CBOR serializer reports an error.
pub fn encode_record(record: &EntityRecord) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.push(RECORD_FORMAT_VERSION);
    ciborium::into_writer(record, &mut out)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Decodes bytes produced by [`encode_record`].
///
/// # Errors
///
/// - `UnexpectedEof` if `bytes` is empty
/// - `UnsupportedFormat` if the version byte is not [`RECORD_FORMAT_VERSION`]
/// - `DecodingFailed` if the CBOR body is malformed or has trailing bytes
pub fn decode_record(bytes: &[u8]) -> CodecResult<EntityRecord> {
    let (&version, mut body) = bytes.split_first().ok_or(CodecError::UnexpectedEof)?;
    if version != RECORD_FORMAT_VERSION {
        return Err(CodecError::UnsupportedFormat {
            found: version,
            expected: RECORD_FORMAT_VERSION,
        });
    }
    if body.is_empty() {
        return Err(CodecError::UnexpectedEof);
    }

    let record: EntityRecord = ciborium::from_reader(&mut body)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;

    if !body.is_empty() {
        return Err(CodecError::decoding_failed(format!(
            "{} trailing bytes after record",
            body.len()
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> EntityRecord {
        let mut record = EntityRecord::new("person-1", "Person")
            .with_property("name", "foo")
            .with_property("age", 42i64)
            .with_last_modified(1_700_000_000_000);
        record
            .associations
            .insert("employer".into(), "company-1".into());
        record.many_associations.insert(
            "friends".into(),
            vec!["person-2".into(), "person-3".into()],
        );
        record.named_associations.insert(
            "contacts".into(),
            vec![("home".into(), "address-1".into())],
        );
        record
    }

    #[test]
    fn encode_decode_record() {
        let record = sample();
        let bytes = encode_record(&record).unwrap();
        assert_eq!(bytes[0], RECORD_FORMAT_VERSION);
        assert_eq!(decode_record(&bytes).unwrap(), record);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = sample().encode().unwrap();
        let b = sample().encode().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_is_eof() {
        assert_eq!(decode_record(&[]), Err(CodecError::UnexpectedEof));
        assert_eq!(
            decode_record(&[RECORD_FORMAT_VERSION]),
            Err(CodecError::UnexpectedEof)
        );
    }

    #[test]
    fn unknown_format_rejected() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = 9;
        assert_eq!(
            decode_record(&bytes),
            Err(CodecError::UnsupportedFormat {
                found: 9,
                expected: RECORD_FORMAT_VERSION
            })
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample().encode().unwrap();
        bytes.push(0x00);
        assert!(matches!(
            decode_record(&bytes),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn truncated_body_rejected() {
        let bytes = sample().encode().unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            decode_record(truncated),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-z]{0,8}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_properties_survive_encoding(
            props in prop::collection::btree_map("[a-z]{1,6}", arb_value(), 0..6),
            last_modified in any::<u64>(),
        ) {
            let mut record = EntityRecord::new("id", "T").with_last_modified(last_modified);
            record.properties = props;
            let decoded = decode_record(&encode_record(&record).unwrap()).unwrap();
            prop_assert_eq!(decoded, record);
        }

        #[test]
        fn decoding_garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_record(&bytes);
        }
    }
}
