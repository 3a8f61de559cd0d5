//! Show command implementation.

use crate::json::record_to_json;
use entiwork_codec::decode_record;
use entiwork_storage::{EntityStore, FileEntityStore};
use std::path::Path;

/// Runs the show command.
pub fn run(path: &Path, identity: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let json = show(&store, identity)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Loads and decodes one entity.
pub fn show(
    store: &FileEntityStore,
    identity: &str,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let stored = store
        .load(identity)?
        .ok_or_else(|| format!("No entity with identity {:?}", identity))?;
    let record = decode_record(&stored.payload)?;
    tracing::debug!(identity, version = %stored.version, "decoded record");
    Ok(record_to_json(&record, stored.version.as_u64()))
}
