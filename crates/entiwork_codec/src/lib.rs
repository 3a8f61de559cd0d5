//! # EntiWork Codec
//!
//! Property values and the persisted form of entity state.
//!
//! The unit-of-work layer treats property values as opaque payloads. This
//! crate defines that payload ([`Value`]) and the record a backend stores
//! for each entity ([`EntityRecord`]).
//!
//! ## Record format
//!
//! An encoded record is one format-version byte followed by the CBOR
//! serialization of the record. All maps are sorted by key, and floats are
//! not representable, so equal records always encode to equal bytes.
//!
//! ## Usage
//!
//! ```
//! use entiwork_codec::{decode_record, encode_record, EntityRecord};
//!
//! let record = EntityRecord::new("person-1", "Person").with_property("name", "foo");
//! let bytes = encode_record(&record).unwrap();
//! assert_eq!(decode_record(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;
mod value;

pub use error::{CodecError, CodecResult};
pub use record::{decode_record, encode_record, EntityRecord, RECORD_FORMAT_VERSION};
pub use value::Value;
