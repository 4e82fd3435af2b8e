//! Project configuration: the parent directory containing `fst.json` and
//! the shared store at `<project>/.fst/`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashio::write_atomic;
use crate::store::Store;

/// Project configuration, persisted at `<project_root>/fst.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Opaque project ID.
    pub project_id: String,
    /// Human-readable project name.
    pub project_name: String,
    /// The workspace designated as "main", if any. A project may have at
    /// most one. Resolvers must treat a dangling value as [`Error::NotFound`]
    /// rather than silently falling back to another workspace (open
    /// question 3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_workspace_id: Option<String>,
    /// RFC3339 UTC creation timestamp.
    pub created_at: String,
}

fn config_path(project_root: &Path) -> PathBuf {
    project_root.join("fst.json")
}

/// Initialize a new project at `project_root`, writing `fst.json` and
/// creating the `.fst/` control directory.
pub fn init(project_root: &Path, project_id: &str, project_name: &str, created_at: &str) -> Result<ProjectConfig> {
    let config = ProjectConfig {
        project_id: project_id.to_string(),
        project_name: project_name.to_string(),
        main_workspace_id: None,
        created_at: created_at.to_string(),
    };
    let dot_fst = project_root.join(".fst");
    fs::create_dir_all(&dot_fst).map_err(|e| Error::io(dot_fst, "create_dir_all", e))?;
    save(project_root, &config)?;
    Ok(config)
}

/// Load a project's `fst.json`.
pub fn load(project_root: &Path) -> Result<ProjectConfig> {
    let path = config_path(project_root);
    let bytes = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(format!("project config at {}", path.display()))
        } else {
            Error::io(path.clone(), "read", e)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| Error::corrupt("project config", path, e.to_string()))
}

/// Persist `config` atomically.
pub fn save(project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let path = config_path(project_root);
    let bytes =
        serde_json::to_vec(config).map_err(|e| Error::corrupt("project config", &path, e.to_string()))?;
    write_atomic(&path, &bytes, false)
}

/// Designate `workspace_id` as the project's main workspace. The workspace
/// must already be registered.
pub fn set_main_workspace(project_root: &Path, workspace_id: &str) -> Result<()> {
    let store = Store::new(project_root);
    store.find_workspace_by_id(workspace_id)?; // fails loudly if unregistered
    let mut config = load(project_root)?;
    config.main_workspace_id = Some(workspace_id.to_string());
    save(project_root, &config)
}

/// Resolve the project's main workspace. Returns [`Error::NotFound`] if
/// `main_workspace_id` is unset or points to a workspace that has since
/// been unregistered — never silently substituting another workspace.
pub fn main_workspace(project_root: &Path) -> Result<crate::store::WorkspaceInfo> {
    let config = load(project_root)?;
    let id = config
        .main_workspace_id
        .ok_or_else(|| Error::not_found("project has no main workspace designated"))?;
    Store::new(project_root).find_workspace_by_id(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = init(dir.path(), "proj-1", "demo", "2024-01-01T00:00:00Z").unwrap();
        assert_eq!(load(dir.path()).unwrap(), config);
    }

    #[test]
    fn dangling_main_workspace_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "proj-1", "demo", "2024-01-01T00:00:00Z").unwrap();
        let mut config = load(dir.path()).unwrap();
        config.main_workspace_id = Some("ws-ghost".to_string());
        save(dir.path(), &config).unwrap();

        let err = main_workspace(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn unset_main_workspace_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "proj-1", "demo", "2024-01-01T00:00:00Z").unwrap();
        let err = main_workspace(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
