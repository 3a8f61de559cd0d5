//! Verify command implementation.

use entiwork_codec::decode_record;
use entiwork_storage::{EntityStore, FileEntityStore};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of records that decoded cleanly.
    pub valid_records: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying entity store at {:?}", path);
    println!();

    // Opening already rejects an unreadable snapshot file.
    let store = super::open_existing(path)?;
    let result = verify(&store)?;

    println!(
        "  records checked: {}, valid: {}, invalid: {}",
        result.records_checked,
        result.valid_records,
        result.errors.len()
    );
    for error in &result.errors {
        println!("    ERROR: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Decodes every stored record and checks it names its own identity.
pub fn verify(store: &FileEntityStore) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    for identity in store.identities()? {
        let Some(stored) = store.load(&identity)? else {
            continue;
        };
        result.records_checked += 1;

        match decode_record(&stored.payload) {
            Ok(record) if record.identity == identity => result.valid_records += 1,
            Ok(record) => result.errors.push(format!(
                "{}: record names identity {:?}",
                identity, record.identity
            )),
            Err(e) => result.errors.push(format!("{}: {}", identity, e)),
        }
    }

    Ok(result)
}
