//! File-backed entity store for persistent storage.
//!
//! The store owns a directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK               # Advisory lock for single-process access
//! └─ entities.cbor      # Snapshot of every record and the version counter
//! ```
//!
//! Every applied batch rewrites the snapshot with the write-then-rename
//! pattern, so a crash leaves either the old or the new snapshot on disk.

use crate::backend::EntityStore;
use crate::batch::{BatchOutcome, ChangeBatch};
use crate::error::{StorageError, StorageResult};
use crate::snapshot::Snapshot;
use crate::stats::StoreStats;
use crate::version::StoredState;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_FILE: &str = "entities.cbor";
const SNAPSHOT_TEMP: &str = "entities.cbor.tmp";

/// Snapshot format written by this build.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    snapshot: Snapshot,
}

/// A file-backed entity store.
///
/// All records are held in memory and the full snapshot is rewritten on
/// every batch. This favours simplicity over write throughput.
///
/// # Durability
///
/// `apply_batch` returns only after the new snapshot has been fsynced and
/// renamed into place. If persisting fails, the in-memory view is left
/// unchanged and the batch is reported as failed.
///
/// # Thread Safety
///
/// The store holds an exclusive lock on its directory, and internal locking
/// serializes writers within the process.
///
/// # Example
///
/// ```no_run
/// use entiwork_storage::{EntityStore, FileEntityStore};
/// use std::path::Path;
///
/// let store = FileEntityStore::open(Path::new("entities")).unwrap();
/// println!("{} entities", store.identities().unwrap().len());
/// ```
#[derive(Debug)]
pub struct FileEntityStore {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
    stats: StoreStats,
    _lock_file: File,
}

impl FileEntityStore {
    /// Opens or creates a store in the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    /// - The snapshot is unreadable or has an unknown format (returns `Corrupted`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StorageError::corrupted(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let snapshot = Self::read_snapshot(&path.join(SNAPSHOT_FILE))?;
        debug!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            "opened file entity store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            snapshot: RwLock::new(snapshot),
            stats: StoreStats::new(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the operation counters.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Returns the number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.read().entities.len()
    }

    /// Returns true if the store holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_snapshot(path: &Path) -> StorageResult<Snapshot> {
        if !path.exists() {
            return Ok(Snapshot::default());
        }
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Snapshot::default());
        }

        let decoded: SnapshotFile = ciborium::from_reader(BufReader::new(file))
            .map_err(|e| StorageError::corrupted(format!("unreadable snapshot: {e}")))?;
        if decoded.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported snapshot format {} (expected {SNAPSHOT_FORMAT_VERSION})",
                decoded.format_version
            )));
        }
        Ok(decoded.snapshot)
    }

    /// Writes `snapshot` to a temp file, syncs it, and renames it over the
    /// live snapshot.
    fn persist(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let temp_path = self.path.join(SNAPSHOT_TEMP);
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);

        let on_disk = SnapshotFile {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        ciborium::into_writer(&on_disk, &mut writer)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(SNAPSHOT_FILE))?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals directory metadata
        Ok(())
    }
}

impl EntityStore for FileEntityStore {
    fn load(&self, identity: &str) -> StorageResult<Option<StoredState>> {
        self.stats.record_load();
        Ok(self.snapshot.read().entities.get(identity).cloned())
    }

    fn apply_batch(&self, batch: &ChangeBatch) -> StorageResult<BatchOutcome> {
        let mut current = self.snapshot.write();

        let mut next = current.clone();
        let outcome = match next.apply(batch) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.record_rejected();
                warn!(usecase = %batch.usecase, unit_of_work = %batch.unit_of_work, error = %e, "rejected batch");
                return Err(e);
            }
        };

        self.persist(&next)?;
        *current = next;
        self.stats.record_applied();
        debug!(
            usecase = %batch.usecase,
            unit_of_work = %batch.unit_of_work,
            changes = batch.len(),
            "persisted batch"
        );
        Ok(outcome)
    }

    fn check_versions(&self, batch: &ChangeBatch) -> StorageResult<()> {
        self.snapshot.read().check(batch)
    }

    fn contains(&self, identity: &str) -> StorageResult<bool> {
        Ok(self.snapshot.read().entities.contains_key(identity))
    }

    fn identities(&self) -> StorageResult<Vec<String>> {
        Ok(self.snapshot.read().entities.keys().cloned().collect())
    }
}
