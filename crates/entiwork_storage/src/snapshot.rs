//! The versioned map both reference stores keep in memory.

use crate::batch::{BatchOutcome, ChangeBatch};
use crate::error::StorageResult;
use crate::version::{StoredState, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identities, their states, and the next version to hand out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub(crate) entities: BTreeMap<String, StoredState>,
    pub(crate) next_version: Version,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_version: Version::INITIAL,
        }
    }
}

impl Snapshot {
    pub(crate) fn version_of(&self, identity: &str) -> Option<Version> {
        self.entities.get(identity).map(|s| s.version)
    }

    pub(crate) fn check(&self, batch: &ChangeBatch) -> StorageResult<()> {
        batch.verify_with(|identity| Ok(self.version_of(identity)))
    }

    /// Validates `batch` and, only if every change matches, writes it.
    pub(crate) fn apply(&mut self, batch: &ChangeBatch) -> StorageResult<BatchOutcome> {
        self.check(batch)?;

        let mut outcome = BatchOutcome::default();
        for change in &batch.changes {
            match &change.payload {
                Some(payload) => {
                    let version = self.next_version;
                    self.next_version = version.next();
                    self.entities.insert(
                        change.identity.clone(),
                        StoredState::new(version, payload.clone()),
                    );
                    outcome.versions.push((change.identity.clone(), version));
                }
                None => {
                    self.entities.remove(&change.identity);
                }
            }
        }
        Ok(outcome)
    }
}
