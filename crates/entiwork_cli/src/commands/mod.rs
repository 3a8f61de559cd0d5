//! CLI command implementations.

pub mod inspect;
pub mod show;
pub mod verify;

use entiwork_storage::FileEntityStore;
use std::path::Path;

/// Opens an existing store directory.
///
/// `FileEntityStore::open` creates missing directories, which is never
/// what a read-only tool wants.
fn open_existing(path: &Path) -> Result<FileEntityStore, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No entity store found at {:?}", path).into());
    }
    Ok(FileEntityStore::open(path)?)
}
