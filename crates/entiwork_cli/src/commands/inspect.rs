//! Inspect command implementation.

use entiwork_codec::decode_record;
use entiwork_storage::{EntityStore, FileEntityStore};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of stored entities.
    pub entity_count: usize,
    /// Loads served while inspecting.
    pub loads: u64,
    /// Per-entity summaries, ordered by identity.
    pub entities: Vec<EntitySummary>,
}

/// Summary of one stored entity.
#[derive(Debug, Serialize)]
pub struct EntitySummary {
    /// Entity identity.
    pub identity: String,
    /// Durable version.
    pub version: u64,
    /// Entity type, if the payload decodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Payload size in bytes.
    pub payload_size: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let result = inspect(&store)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects a summary of every stored entity.
pub fn inspect(store: &FileEntityStore) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut entities = Vec::new();
    for identity in store.identities()? {
        let Some(stored) = store.load(&identity)? else {
            continue;
        };
        let entity_type = decode_record(&stored.payload)
            .ok()
            .map(|record| record.entity_type);
        entities.push(EntitySummary {
            identity,
            version: stored.version.as_u64(),
            entity_type,
            payload_size: stored.payload.len(),
        });
    }

    Ok(InspectResult {
        path: store.path().display().to_string(),
        entity_count: entities.len(),
        loads: store.stats().loads(),
        entities,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("EntiWork Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!("Entities: {}", result.entity_count);

    if !result.entities.is_empty() {
        println!();
        for entity in &result.entities {
            println!(
                "  {} {} [{}] {} bytes",
                entity.identity,
                format_version(entity.version),
                entity.entity_type.as_deref().unwrap_or("undecodable"),
                entity.payload_size
            );
        }
    }
}

fn format_version(version: u64) -> String {
    format!("v{}", version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entiwork_codec::EntityRecord;
    use entiwork_storage::{Change, ChangeBatch};
    use tempfile::tempdir;

    #[test]
    fn summarizes_every_entity() {
        let dir = tempdir().unwrap();
        let store = FileEntityStore::open(dir.path()).unwrap();
        let record = EntityRecord::new("a", "Person").encode().unwrap();
        store
            .apply_batch(
                &ChangeBatch::new("seed", "cli-test")
                    .with(Change::create("a", record))
                    .with(Change::create("b", vec![0xff])),
            )
            .unwrap();

        let result = inspect(&store).unwrap();
        assert_eq!(result.entity_count, 2);
        assert_eq!(result.entities[0].identity, "a");
        assert_eq!(result.entities[0].entity_type.as_deref(), Some("Person"));
        assert_eq!(result.entities[1].entity_type, None);
    }
}
