//! Local JSON side-table for the `snapshot_id ↔ commit_oid` mapping,
//! mirroring what's recorded in `refs/fst/map/*` for fast lookup without
//! walking refs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GitInterchangeError, Result};

/// Bidirectional `snapshot_id ↔ commit_oid` mapping, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingTable {
    snapshot_to_commit: BTreeMap<String, String>,
    #[serde(default)]
    commit_to_snapshot: BTreeMap<String, String>,
}

impl MappingTable {
    /// An empty mapping.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the side-table from `path`, or an empty one if it does not
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).map_err(|e| {
                GitInterchangeError::MappingInconsistent {
                    message: format!("{}: {e}", path.display()),
                }
            })?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(GitInterchangeError::Io(e)),
        }
    }

    /// Persist the side-table to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| {
            GitInterchangeError::MappingInconsistent {
                message: e.to_string(),
            }
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Record a mapping between `snapshot_id` and `commit_oid`.
    pub fn insert(&mut self, snapshot_id: String, commit_oid: String) {
        self.snapshot_to_commit
            .insert(snapshot_id.clone(), commit_oid.clone());
        self.commit_to_snapshot.insert(commit_oid, snapshot_id);
    }

    /// Look up the commit exported for `snapshot_id`, if any.
    #[must_use]
    pub fn commit_for_snapshot(&self, snapshot_id: &str) -> Option<&str> {
        self.snapshot_to_commit.get(snapshot_id).map(String::as_str)
    }

    /// Look up the snapshot imported from `commit_oid`, if any.
    #[must_use]
    pub fn snapshot_for_commit(&self, commit_oid: &str) -> Option<&str> {
        self.commit_to_snapshot.get(commit_oid).map(String::as_str)
    }
}
