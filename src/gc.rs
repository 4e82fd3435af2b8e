//! Garbage collection: reclaim snapshots, manifests, and blobs that are no
//! longer reachable from any workspace's `base`/`current` pointer.

use std::collections::HashSet;

use crate::dag;
use crate::error::Result;
use crate::store::Store;

/// Options for a GC run.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcOptions {
    /// Report counts without deleting anything.
    pub dry_run: bool,
}

/// Outcome of a GC run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Snapshot IDs deleted (or that would be deleted, in `dry_run` mode).
    pub snapshots_removed: Vec<String>,
    /// Manifest hashes deleted.
    pub manifests_removed: Vec<String>,
    /// Blob hashes deleted.
    pub blobs_removed: Vec<String>,
}

/// Compute every workspace's `base_snapshot_id`/`current_snapshot_id` plus
/// the project-level root, if any, as GC roots.
fn collect_roots(store: &Store, project_base: Option<&str>) -> Result<Vec<String>> {
    let mut roots = Vec::new();
    for ws in store.list_workspaces()? {
        if !ws.base_snapshot_id.is_empty() {
            roots.push(ws.base_snapshot_id);
        }
        if !ws.current_snapshot_id.is_empty() {
            roots.push(ws.current_snapshot_id);
        }
    }
    if let Some(base) = project_base {
        if !base.is_empty() {
            roots.push(base.to_string());
        }
    }
    Ok(roots)
}

/// Run garbage collection. Roots are every workspace's `base`/`current`
/// pointer plus the optional project-level `project_base`. Order of
/// deletion matters: snapshots first, then orphan manifests, then orphan
/// blobs, so that nothing deleted is still referenced at each step.
#[tracing::instrument(skip(store), fields(dry_run = opts.dry_run))]
pub fn gc(store: &Store, project_base: Option<&str>, opts: GcOptions) -> Result<GcReport> {
    let roots = collect_roots(store, project_base)?;
    // Roots that no longer resolve to a real snapshot are silently
    // dropped from the reachability walk rather than causing GC to fail;
    // a dangling pointer is a bug the caller should surface elsewhere,
    // not a reason to refuse collection.
    let valid_roots: Vec<String> = roots
        .into_iter()
        .filter(|id| store.get_snapshot(id).is_ok())
        .collect();

    let reachable_snapshots = dag::reachable_from(store, &valid_roots)?;

    let mut reachable_manifests: HashSet<String> = HashSet::new();
    let mut reachable_blobs: HashSet<String> = HashSet::new();
    for id in &reachable_snapshots {
        let meta = store.get_snapshot(id)?;
        reachable_manifests.insert(meta.manifest_hash.clone());
    }
    for hash in &reachable_manifests {
        let manifest = store.get_manifest(hash)?;
        for entry in &manifest.files {
            if let crate::manifest::Entry::File { hash, .. } = entry {
                reachable_blobs.insert(hash.clone());
            }
        }
    }

    let mut report = GcReport::default();

    for id in store.list_snapshot_ids()? {
        if !reachable_snapshots.contains(&id) {
            report.snapshots_removed.push(id.clone());
            if !opts.dry_run {
                store.delete_snapshot(&id)?;
            }
        }
    }

    for hash in store.list_manifest_hashes()? {
        if !reachable_manifests.contains(&hash) {
            report.manifests_removed.push(hash.clone());
            if !opts.dry_run {
                store.delete_manifest(&hash)?;
            }
        }
    }

    for hash in store.list_blob_hashes()? {
        if !reachable_blobs.contains(&hash) {
            report.blobs_removed.push(hash.clone());
            if !opts.dry_run {
                store.delete_blob(&hash)?;
            }
        }
    }

    tracing::debug!(
        snapshots = report.snapshots_removed.len(),
        manifests = report.manifests_removed.len(),
        blobs = report.blobs_removed.len(),
        "gc complete"
    );
    Ok(report)
}
