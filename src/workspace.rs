//! Workspace lifecycle: fork, open, snapshot, restore, drift.
//! Base/current pointer maintenance per workspace `config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dag::{self, SnapshotIdentityInput};
use crate::error::{Error, Result};
use crate::hashio::{self, CloneBackend};
use crate::ignore::IgnoreMatcher;
use crate::manifest::{self, Manifest, ManifestDiff};
use crate::scanner::{self, StatCache};
use crate::store::{SnapshotMeta, Store, WorkspaceInfo};

/// How a workspace talks to the rest of the world. Only `local` is
/// implemented by this crate; `cloud` is a marker the caller's sync layer
/// interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    /// Purely local; no remote synchronization.
    Local,
    /// Backed by a remote project (glue lives outside this crate).
    Cloud,
}

/// Workspace configuration, persisted at `<workspace>/.fst/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Owning project's opaque ID.
    pub project_id: String,
    /// This workspace's opaque ID.
    pub workspace_id: String,
    /// This workspace's human name.
    pub workspace_name: String,
    /// Fork point / drift baseline.
    pub base_snapshot_id: String,
    /// Most recent tip.
    pub current_snapshot_id: String,
    /// Sync mode.
    pub mode: WorkspaceMode,
}

/// Commit author identity supplied by the caller.
#[derive(Debug, Clone)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

/// A workspace directory paired with its control files, rooted at
/// `<project_root>/<workspace_name>/`.
pub struct Workspace {
    root: PathBuf,
    project_root: PathBuf,
}

impl Workspace {
    fn control_dir(&self) -> PathBuf {
        self.root.join(".fst")
    }

    fn config_path(&self) -> PathBuf {
        self.control_dir().join("config.json")
    }

    fn stat_cache_path(&self) -> PathBuf {
        self.control_dir().join("stat_cache.json")
    }

    fn pending_merge_parents_path(&self) -> PathBuf {
        self.control_dir().join("pending_merge_parents.json")
    }

    /// Path to the workspace's working directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open an already-forked workspace by reading its `config.json`.
    pub fn open(root: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Result<Self> {
        let ws = Self {
            root: root.into(),
            project_root: project_root.into(),
        };
        // Validate config is readable up front so later operations can
        // assume it exists.
        ws.load_config()?;
        Ok(ws)
    }

    fn load_config(&self) -> Result<WorkspaceConfig> {
        let path = self.config_path();
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("workspace config at {}", path.display()))
            } else {
                Error::io(path.clone(), "read", e)
            }
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt("workspace config", path, e.to_string()))
    }

    fn save_config(&self, config: &WorkspaceConfig) -> Result<()> {
        let bytes = serde_json::to_vec(config)
            .map_err(|e| Error::corrupt("workspace config", self.config_path(), e.to_string()))?;
        hashio::write_atomic(&self.config_path(), &bytes, false)
    }

    /// Current workspace configuration.
    pub fn config(&self) -> Result<WorkspaceConfig> {
        self.load_config()
    }

    fn store(&self) -> Store {
        Store::new(&self.project_root)
    }

    fn ignore(&self) -> Result<IgnoreMatcher> {
        IgnoreMatcher::load(&self.project_root)
    }

    fn load_stat_cache(&self) -> StatCache {
        StatCache::load(&self.stat_cache_path())
    }

    /// Fork `source` into a brand-new workspace directory `<project>/<name>/`.
    /// Copies all non-ignored files (symlinks re-created by target, modes
    /// preserved) using `backend`, and registers the new workspace in the
    /// project with `base = current = source.current_snapshot_id`.
    pub fn fork(
        project_root: &Path,
        source: &Workspace,
        name: &str,
        backend: CloneBackend,
        created_at: &str,
    ) -> Result<Workspace> {
        let source_config = source.load_config()?;
        let dest_root = project_root.join(name);
        hashio::clone_tree(&source.root, &dest_root, backend)?;

        let workspace_id = derive_workspace_id(&source_config.project_id, name, created_at);
        let new_ws = Workspace {
            root: dest_root.clone(),
            project_root: project_root.to_path_buf(),
        };
        let config = WorkspaceConfig {
            project_id: source_config.project_id.clone(),
            workspace_id: workspace_id.clone(),
            workspace_name: name.to_string(),
            base_snapshot_id: source_config.current_snapshot_id.clone(),
            current_snapshot_id: source_config.current_snapshot_id.clone(),
            mode: WorkspaceMode::Local,
        };
        fs::create_dir_all(new_ws.control_dir())
            .map_err(|e| Error::io(new_ws.control_dir(), "create_dir_all", e))?;
        new_ws.save_config(&config)?;

        let store = new_ws.store();
        store.register_workspace(WorkspaceInfo {
            workspace_id,
            name: name.to_string(),
            path: dest_root,
            base_snapshot_id: config.base_snapshot_id,
            current_snapshot_id: config.current_snapshot_id,
            created_at: created_at.to_string(),
        })?;
        Ok(new_ws)
    }

    /// Scan the working tree, persist blobs + manifest, derive a snapshot
    /// ID, write metadata, update `current_snapshot_id`, refresh the stat
    /// cache, and clear any `pending_merge_parents.json`.
    ///
    /// If the new manifest hash equals the tip's and parents are just
    /// `[current]`, this is a no-op returning the existing ID (an idempotent
    /// snapshot), unless `allow_empty` is set.
    pub fn snapshot(&self, message: &str, author: &Author, created_at: &str, allow_empty: bool) -> Result<String> {
        let config = self.load_config()?;
        let store = self.store();
        let ignore = self.ignore()?;
        let cache = self.load_stat_cache();

        let (manifest, new_cache) = scanner::scan(&self.root, &ignore, &cache)?;
        let manifest_hash = store.put_manifest(&manifest)?;

        let pending_parents = self.read_pending_merge_parents()?;
        let parent_ids: Vec<String> = if let Some(parents) = pending_parents {
            parents
        } else {
            vec![config.current_snapshot_id.clone()]
        };

        if !allow_empty && parent_ids == vec![config.current_snapshot_id.clone()] {
            if let Ok(current_meta) = store.get_snapshot(&config.current_snapshot_id) {
                if current_meta.manifest_hash == manifest_hash {
                    new_cache.save(&self.stat_cache_path())?;
                    return Ok(config.current_snapshot_id);
                }
            }
        }

        let (id, normalized_parents) = dag::derive_snapshot_id(&SnapshotIdentityInput {
            manifest_hash: &manifest_hash,
            parent_ids: &parent_ids,
            author_name: &author.name,
            author_email: &author.email,
            created_at,
        });

        let meta = SnapshotMeta {
            id: id.clone(),
            workspace_id: config.workspace_id.clone(),
            workspace_name: config.workspace_name.clone(),
            manifest_hash,
            parent_snapshot_ids: normalized_parents,
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            message: message.to_string(),
            agent: String::new(),
            created_at: created_at.to_string(),
            files: manifest.file_count() as u64,
            size: manifest.total_size(),
        };
        store.put_snapshot(&meta)?;

        let mut new_config = config;
        new_config.current_snapshot_id = id.clone();
        self.save_config(&new_config)?;
        store.register_workspace(WorkspaceInfo {
            workspace_id: new_config.workspace_id.clone(),
            name: new_config.workspace_name.clone(),
            path: self.root.clone(),
            base_snapshot_id: new_config.base_snapshot_id.clone(),
            current_snapshot_id: id.clone(),
            created_at: created_at.to_string(),
        })?;

        new_cache.save(&self.stat_cache_path())?;
        self.clear_pending_merge_parents()?;

        Ok(id)
    }

    /// Record parents for the next `snapshot` call (used after a merge
    /// commit's conflicts have been resolved in the working tree).
    pub fn set_pending_merge_parents(&self, parents: &[String]) -> Result<()> {
        let bytes = serde_json::to_vec(parents)
            .map_err(|e| Error::corrupt("pending merge parents", self.pending_merge_parents_path(), e.to_string()))?;
        hashio::write_atomic(&self.pending_merge_parents_path(), &bytes, false)
    }

    fn read_pending_merge_parents(&self) -> Result<Option<Vec<String>>> {
        match fs::read(self.pending_merge_parents_path()) {
            Ok(bytes) => {
                let parents: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::corrupt(
                        "pending merge parents",
                        self.pending_merge_parents_path(),
                        e.to_string(),
                    )
                })?;
                Ok(Some(parents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(self.pending_merge_parents_path(), "read", e)),
        }
    }

    fn clear_pending_merge_parents(&self) -> Result<()> {
        match fs::remove_file(self.pending_merge_parents_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(self.pending_merge_parents_path(), "remove_file", e)),
        }
    }

    /// Restore the working tree to `target_id`'s manifest. For each path
    /// differing from the target, writes blob contents (or reports it
    /// missing rather than failing); for paths present in the tree but
    /// absent from the target (scoped to `paths` when given), deletes
    /// them. `dry_run` only reports the actions that would be taken.
    pub fn restore(
        &self,
        target_id: &str,
        paths: Option<&[String]>,
        dry_run: bool,
    ) -> Result<RestoreReport> {
        let store = self.store();
        let target_meta = store.get_snapshot(target_id)?;
        let target_manifest = store.get_manifest(&target_meta.manifest_hash)?;
        let ignore = self.ignore()?;
        let (current_manifest, _) = scanner::scan(&self.root, &ignore, &StatCache::empty())?;

        let mut report = RestoreReport::default();
        for entry in &target_manifest.files {
            let path = entry.path();
            if let Some(scope) = paths {
                if !scope.iter().any(|p| p == path) {
                    continue;
                }
            }
            let needs_write = current_manifest.get(path) != Some(entry);
            if !needs_write {
                continue;
            }
            match entry {
                manifest::Entry::File { hash, mode, .. } => match store.get_blob(hash) {
                    Ok(bytes) => {
                        report.written.push(path.to_string());
                        if !dry_run {
                            let dest = self.root.join(path);
                            hashio::write_atomic(&dest, &bytes, false)?;
                            set_mode(&dest, *mode)?;
                        }
                    }
                    Err(Error::NotFound { .. }) => {
                        report.missing_blobs.push(path.to_string());
                    }
                    Err(e) => return Err(e),
                },
                manifest::Entry::Symlink { target, .. } => {
                    report.written.push(path.to_string());
                    if !dry_run {
                        let dest = self.root.join(path);
                        let _ = fs::remove_file(&dest);
                        create_symlink(Path::new(target), &dest)?;
                    }
                }
            }
        }

        for entry in &current_manifest.files {
            let path = entry.path();
            if target_manifest.get(path).is_some() {
                continue;
            }
            if let Some(scope) = paths {
                if !scope.iter().any(|p| p == path) {
                    continue;
                }
            }
            report.deleted.push(path.to_string());
            if !dry_run {
                let dest = self.root.join(path);
                fs::remove_file(&dest).map_err(|e| Error::io(dest, "remove_file", e))?;
            }
        }

        Ok(report)
    }

    /// `diff(manifest(base), scan(ws.root))`. Never fails for missing
    /// blobs — it only compares manifests.
    pub fn drift(&self) -> Result<ManifestDiff> {
        let config = self.load_config()?;
        let store = self.store();
        let base_meta = store.get_snapshot(&config.base_snapshot_id)?;
        let base_manifest = store.get_manifest(&base_meta.manifest_hash)?;
        let ignore = self.ignore()?;
        let cache = self.load_stat_cache();
        let (current_manifest, _) = scanner::scan(&self.root, &ignore, &cache)?;
        Ok(manifest::diff(&base_manifest, &current_manifest))
    }
}

/// Report produced by [`Workspace::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Paths written (or that would be written, in `dry_run` mode).
    pub written: Vec<String>,
    /// Paths deleted (or that would be deleted).
    pub deleted: Vec<String>,
    /// Paths that should have been written but whose blob was missing.
    pub missing_blobs: Vec<String>,
}

fn derive_workspace_id(project_id: &str, name: &str, created_at: &str) -> String {
    format!(
        "ws-{}",
        crate::hashio::hash_bytes(format!("{project_id}:{name}:{created_at}").as_bytes())
    )
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::io(path, "set_permissions", e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link, "symlink", e))
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, _link: &Path) -> Result<()> {
    Err(Error::conflict("symlinks are only supported on unix".to_string()))
}
