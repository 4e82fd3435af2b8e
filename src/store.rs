//! Store: content-addressed persistence of blobs, manifests, and
//! snapshot metadata; workspace registry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashio::{hash_bytes, write_atomic};
use crate::manifest::Manifest;

const MIN_PREFIX_LEN: usize = 4;

/// Snapshot metadata persisted at `snapshots/<id>.meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// `snap-<hex>`, derived deterministically from the fields below.
    pub id: String,
    /// Owning workspace's opaque ID.
    pub workspace_id: String,
    /// Owning workspace's human name at the time of creation.
    pub workspace_name: String,
    /// Hash of the associated manifest.
    pub manifest_hash: String,
    /// Parent snapshot IDs, normalized (deduplicated, sorted).
    pub parent_snapshot_ids: Vec<String>,
    /// Author's display name.
    pub author_name: String,
    /// Author's email.
    pub author_email: String,
    /// Commit message. The only field editable in place.
    pub message: String,
    /// Optional agent identifier that authored this snapshot.
    #[serde(default)]
    pub agent: String,
    /// RFC3339 UTC timestamp.
    pub created_at: String,
    /// Cached file count from the manifest, for quick display.
    pub files: u64,
    /// Cached total size from the manifest, for quick display.
    pub size: u64,
}

/// A registered workspace entry, persisted in `registry.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    /// Opaque workspace ID.
    pub workspace_id: String,
    /// Human-readable name, unique within a project.
    pub name: String,
    /// Absolute path to the workspace directory.
    pub path: PathBuf,
    /// Fork point.
    pub base_snapshot_id: String,
    /// Current tip.
    pub current_snapshot_id: String,
    /// RFC3339 UTC creation timestamp.
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Registry {
    workspaces: BTreeMap<String, WorkspaceInfo>,
}

/// Content-addressed storage namespace rooted at `<project_root>/.fst/`.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open a store rooted at `<project_root>/.fst`. Does not create any
    /// directories; callers create them on first write.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into().join(".fst"),
        }
    }

    fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.blobs_dir().join(hash)
    }

    fn manifest_path(&self, hash: &str) -> PathBuf {
        self.manifests_dir().join(format!("{hash}.json"))
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{id}.meta.json"))
    }

    // --- Blobs -------------------------------------------------------

    /// Idempotently persist `bytes` under its SHA-256 hash. No-op if the
    /// blob already exists.
    #[tracing::instrument(skip(self, bytes), fields(hash, size = bytes.len()))]
    pub fn put_blob(&self, hash: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.blob_path(hash), bytes, true)
    }

    /// True if a blob with `hash` is present.
    #[must_use]
    pub fn has_blob(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    /// Read a blob's bytes.
    pub fn get_blob(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("blob {hash}"))
            } else {
                Error::io(path, "read", e)
            }
        })
    }

    // --- Manifests -----------------------------------------------------

    /// Canonical-serialize `manifest`, write it under its own hash, and
    /// return that hash.
    pub fn put_manifest(&self, manifest: &Manifest) -> Result<String> {
        let bytes = manifest.to_canonical_bytes();
        let hash = hash_bytes(&bytes);
        write_atomic(&self.manifest_path(&hash), &bytes, true)?;
        Ok(hash)
    }

    /// Load a manifest by hash, verifying the on-disk bytes still hash to
    /// the requested key.
    pub fn get_manifest(&self, hash: &str) -> Result<Manifest> {
        let path = self.manifest_path(hash);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("manifest {hash}"))
            } else {
                Error::io(path.clone(), "read", e)
            }
        })?;
        if hash_bytes(&bytes) != hash {
            return Err(Error::corrupt(
                "manifest",
                path,
                "on-disk content does not hash to the requested key".to_string(),
            ));
        }
        Manifest::from_json(&bytes)
    }

    // --- Snapshots -----------------------------------------------------

    /// Persist snapshot metadata. Rejects with [`Error::Conflict`] if `id`
    /// already exists with different bytes; identical bytes are a no-op.
    #[tracing::instrument(skip(self, meta), fields(id = %meta.id))]
    pub fn put_snapshot(&self, meta: &SnapshotMeta) -> Result<()> {
        let path = self.snapshot_path(&meta.id);
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| Error::corrupt("snapshot metadata", &path, e.to_string()))?;
        if let Ok(existing) = fs::read(&path) {
            if existing == bytes {
                return Ok(());
            }
            let existing_meta: SnapshotMeta = serde_json::from_slice(&existing)
                .map_err(|e| Error::corrupt("snapshot metadata", &path, e.to_string()))?;
            if existing_meta != *meta {
                tracing::warn!(id = %meta.id, "snapshot already exists with different content");
                return Err(Error::conflict(format!(
                    "snapshot {} already exists with different content",
                    meta.id
                )));
            }
            return Ok(());
        }
        write_atomic(&path, &bytes, false)
    }

    /// Load snapshot metadata by full ID.
    pub fn get_snapshot(&self, id: &str) -> Result<SnapshotMeta> {
        let path = self.snapshot_path(id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("snapshot {id}"))
            } else {
                Error::io(path.clone(), "read", e)
            }
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt("snapshot metadata", path, e.to_string()))
    }

    /// Delete snapshot metadata unconditionally (used by GC).
    pub fn delete_snapshot(&self, id: &str) -> Result<()> {
        let path = self.snapshot_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, "remove_file", e)),
        }
    }

    /// Delete a manifest unconditionally (used by GC).
    pub fn delete_manifest(&self, hash: &str) -> Result<()> {
        let path = self.manifest_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, "remove_file", e)),
        }
    }

    /// Delete a blob unconditionally (used by GC).
    pub fn delete_blob(&self, hash: &str) -> Result<()> {
        let path = self.blob_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, "remove_file", e)),
        }
    }

    /// List every snapshot ID currently on disk, by reading `snapshots/`.
    pub fn list_snapshot_ids(&self) -> Result<Vec<String>> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| Error::io(&dir, "read_dir", e))? {
            let entry = entry.map_err(|e| Error::io(&dir, "read_dir entry", e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".meta.json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// List every manifest hash currently on disk.
    pub fn list_manifest_hashes(&self) -> Result<Vec<String>> {
        let dir = self.manifests_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| Error::io(&dir, "read_dir", e))? {
            let entry = entry.map_err(|e| Error::io(&dir, "read_dir entry", e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(hash) = name.strip_suffix(".json") {
                hashes.push(hash.to_string());
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// List every blob hash currently on disk.
    pub fn list_blob_hashes(&self) -> Result<Vec<String>> {
        let dir = self.blobs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| Error::io(&dir, "read_dir", e))? {
            let entry = entry.map_err(|e| Error::io(&dir, "read_dir entry", e))?;
            hashes.push(entry.file_name().to_string_lossy().into_owned());
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Resolve a (possibly abbreviated, minimum 4 chars) snapshot ID prefix
    /// to a full ID.
    pub fn resolve_snapshot_prefix(&self, prefix: &str) -> Result<String> {
        if prefix.len() < MIN_PREFIX_LEN {
            return Err(Error::conflict(format!(
                "snapshot prefix must be at least {MIN_PREFIX_LEN} characters: {prefix:?}"
            )));
        }
        let ids = self.list_snapshot_ids()?;
        let matches: Vec<String> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();
        match matches.len() {
            0 => Err(Error::not_found(format!("snapshot prefix {prefix:?}"))),
            1 => Ok(matches.into_iter().next().unwrap()),
            _ => Err(Error::Ambiguous {
                prefix: prefix.to_string(),
                matches: matches.into_iter().take(8).collect(),
            }),
        }
    }

    // --- Workspace registry ---------------------------------------------

    fn load_registry(&self) -> Result<Registry> {
        let path = self.registry_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::corrupt("registry", path, e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Registry::default()),
            Err(e) => Err(Error::io(path, "read", e)),
        }
    }

    fn save_registry(&self, registry: &Registry) -> Result<()> {
        let path = self.registry_path();
        let bytes = serde_json::to_vec(registry)
            .map_err(|e| Error::corrupt("registry", &path, e.to_string()))?;
        write_atomic(&path, &bytes, false)
    }

    /// Register or update a workspace entry.
    pub fn register_workspace(&self, info: WorkspaceInfo) -> Result<()> {
        let mut registry = self.load_registry()?;
        registry.workspaces.insert(info.workspace_id.clone(), info);
        self.save_registry(&registry)
    }

    /// Remove a workspace entry (does not touch the workspace directory).
    pub fn unregister_workspace(&self, workspace_id: &str) -> Result<()> {
        let mut registry = self.load_registry()?;
        registry.workspaces.remove(workspace_id);
        self.save_registry(&registry)
    }

    /// Find a workspace by its opaque ID.
    pub fn find_workspace_by_id(&self, workspace_id: &str) -> Result<WorkspaceInfo> {
        let registry = self.load_registry()?;
        registry
            .workspaces
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("workspace {workspace_id}")))
    }

    /// Find a workspace by its human name.
    pub fn find_workspace_by_name(&self, name: &str) -> Result<WorkspaceInfo> {
        let registry = self.load_registry()?;
        registry
            .workspaces
            .values()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("workspace named {name:?}")))
    }

    /// All registered workspaces.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceInfo>> {
        let registry = self.load_registry()?;
        Ok(registry.workspaces.into_values().collect())
    }
}

/// Normalize a list of parent snapshot IDs for the identity formula:
/// deduplicate, drop empty strings, sort.
#[must_use]
pub fn normalize_parent_ids(parents: &[String]) -> Vec<String> {
    let mut parents: Vec<String> = parents
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect();
    parents.sort();
    parents.dedup();
    parents
}
