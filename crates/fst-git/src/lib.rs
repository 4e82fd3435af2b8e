//! Git interchange adapter for the `fst` snapshot engine.
//!
//! Exports snapshots as git commits and imports git commits as snapshots,
//! on top of `gix` (pure-Rust git plumbing — this stack's preferred
//! backend over shelling out to the `git` binary). A persistent
//! `snapshot_id ↔ commit_oid` mapping is kept in two places: a git ref
//! `refs/fst/map/<snapshot_id>` pointing at the commit (so the mapping
//! survives a `git gc` of the interchange repository) and a local JSON
//! side-table for fast lookup without walking refs.

pub mod error;
mod mapping;

use fst::manifest::{Entry, Manifest};
use fst::store::{SnapshotMeta, Store};

pub use error::{GitInterchangeError, Result};
pub use mapping::MappingTable;

const REF_NAMESPACE: &str = "refs/fst/map";

fn map_ref_name(snapshot_id: &str) -> String {
    format!("{REF_NAMESPACE}/{snapshot_id}")
}

/// Export `snapshot_id` to `repo` as a git commit, exporting any
/// not-yet-exported parent snapshots first (depth-first). Returns the
/// commit's OID as lowercase hex. Idempotent: exporting an
/// already-exported snapshot returns the existing mapping without
/// creating a new commit.
#[tracing::instrument(skip(store, repo, mapping))]
pub fn export_snapshot(
    store: &Store,
    repo: &gix::Repository,
    mapping: &mut MappingTable,
    snapshot_id: &str,
) -> Result<String> {
    if let Some(existing) = mapping.commit_for_snapshot(snapshot_id) {
        tracing::debug!(commit_oid = existing, "snapshot already exported");
        return Ok(existing.to_string());
    }

    let meta = store.get_snapshot(snapshot_id)?;
    let manifest = store.get_manifest(&meta.manifest_hash)?;

    let mut parent_oids = Vec::with_capacity(meta.parent_snapshot_ids.len());
    for parent_id in &meta.parent_snapshot_ids {
        let parent_oid = export_snapshot(store, repo, mapping, parent_id)?;
        parent_oids.push(parent_oid);
    }

    let tree_oid = write_tree(repo, store, &manifest)?;
    let commit_oid = write_commit(repo, &tree_oid, &parent_oids, &meta)?;

    mapping.insert(snapshot_id.to_string(), commit_oid.clone());
    update_map_ref(repo, snapshot_id, &commit_oid)?;

    tracing::debug!(commit_oid = %commit_oid, "exported snapshot to commit");
    Ok(commit_oid)
}

/// Import `commit_oid` from `repo` as a new snapshot in `store`, belonging
/// to `workspace_id`/`workspace_name`. Imports any not-yet-imported parent
/// commits first. Regular files and symlinks only; git's executable bit
/// maps to mode `0o755`, non-executable to `0o644`. Idempotent: importing
/// an already-imported commit returns the existing mapping.
#[tracing::instrument(skip(store, repo, mapping))]
pub fn import_commit(
    store: &Store,
    repo: &gix::Repository,
    mapping: &mut MappingTable,
    commit_oid: &str,
    workspace_id: &str,
    workspace_name: &str,
) -> Result<String> {
    if let Some(existing) = mapping.snapshot_for_commit(commit_oid) {
        tracing::debug!(snapshot_id = existing, "commit already imported");
        return Ok(existing.to_string());
    }

    let oid = parse_oid(repo, commit_oid)?;
    let commit = repo.find_commit(oid).map_err(|e| {
        // gix reports a missing object through the same error type as a
        // corrupt one; text-sniff since there is no dedicated variant to
        // match on.
        if e.to_string().to_lowercase().contains("not found") {
            GitInterchangeError::NotFound {
                message: format!("commit {commit_oid} is not present in the git object database"),
            }
        } else {
            object_error(repo, format!("commit {commit_oid}: {e}"))
        }
    })?;
    let decoded = commit
        .decode()
        .map_err(|e| object_error(repo, format!("decode commit {commit_oid}: {e}")))?;

    let mut parent_snapshot_ids = Vec::new();
    for parent_oid in decoded.parents() {
        let parent_hex = parent_oid.to_string();
        let parent_snapshot = import_commit(
            store,
            repo,
            mapping,
            &parent_hex,
            workspace_id,
            workspace_name,
        )?;
        parent_snapshot_ids.push(parent_snapshot);
    }

    let author_sig = decoded.author();
    let author_name = author_sig.name.to_string();
    let author_email = author_sig.email.to_string();
    let created_at = format_git_time(&author_sig)?;
    let message = decoded.message().title.to_string();

    let tree_oid = decoded.tree();
    let tree = repo
        .find_tree(tree_oid)
        .map_err(|e| object_error(repo, format!("tree {tree_oid}: {e}")))?;
    let manifest = read_tree_to_manifest(store, repo, &tree, "")?;
    let manifest_hash = store.put_manifest(&manifest)?;

    let (id, normalized_parents) = fst::dag::derive_snapshot_id(&fst::dag::SnapshotIdentityInput {
        manifest_hash: &manifest_hash,
        parent_ids: &parent_snapshot_ids,
        author_name: &author_name,
        author_email: &author_email,
        created_at: &created_at,
    });

    let meta = SnapshotMeta {
        id: id.clone(),
        workspace_id: workspace_id.to_string(),
        workspace_name: workspace_name.to_string(),
        manifest_hash,
        parent_snapshot_ids: normalized_parents,
        author_name,
        author_email,
        message,
        agent: String::new(),
        created_at,
        files: manifest.file_count() as u64,
        size: manifest.total_size(),
    };
    store.put_snapshot(&meta)?;

    mapping.insert(id.clone(), commit_oid.to_string());
    update_map_ref(repo, &id, commit_oid)?;

    tracing::debug!(snapshot_id = %id, "imported commit as snapshot");
    Ok(id)
}

fn parse_oid(repo: &gix::Repository, hex: &str) -> Result<gix::ObjectId> {
    gix::ObjectId::from_hex(hex.as_bytes())
        .map_err(|e| object_error(repo, format!("invalid object id {hex:?}: {e}")))
}

fn object_error(repo: &gix::Repository, message: String) -> GitInterchangeError {
    GitInterchangeError::ObjectError {
        path: repo.path().to_path_buf(),
        message,
    }
}

fn write_tree(repo: &gix::Repository, store: &Store, manifest: &Manifest) -> Result<gix::ObjectId> {
    // Group entries by their immediate directory so trees nest correctly;
    // the manifest is already sorted, so a single pass with an explicit
    // stack of in-progress directories suffices.
    let mut builder = TreeBuilder::default();
    for entry in &manifest.files {
        match entry {
            Entry::File { path, mode, hash, .. } => {
                let bytes = store.get_blob(hash)?;
                let blob_oid = repo
                    .write_blob(bytes)
                    .map_err(|e| object_error(repo, format!("write blob for {path}: {e}")))?
                    .detach();
                let kind = if mode & 0o111 != 0 {
                    gix::objs::tree::EntryKind::BlobExecutable
                } else {
                    gix::objs::tree::EntryKind::Blob
                };
                builder.insert(path, kind, blob_oid);
            }
            Entry::Symlink { path, target, .. } => {
                let blob_oid = repo
                    .write_blob(target.as_bytes())
                    .map_err(|e| object_error(repo, format!("write symlink blob for {path}: {e}")))?
                    .detach();
                builder.insert(path, gix::objs::tree::EntryKind::Link, blob_oid);
            }
        }
    }
    builder.write(repo)
}

fn write_commit(
    repo: &gix::Repository,
    tree_oid: &gix::ObjectId,
    parents: &[String],
    meta: &SnapshotMeta,
) -> Result<String> {
    let time = parse_rfc3339_to_git_time(&meta.created_at)?;
    let signature = gix::actor::Signature {
        name: meta.author_name.as_str().into(),
        email: meta.author_email.as_str().into(),
        time,
    };
    let parent_oids: Vec<gix::ObjectId> = parents
        .iter()
        .map(|p| parse_oid(repo, p))
        .collect::<Result<_>>()?;

    let commit = gix::objs::Commit {
        message: meta.message.as_str().into(),
        tree: *tree_oid,
        author: signature.clone(),
        committer: signature,
        encoding: None,
        parents: parent_oids.into_iter().collect(),
        extra_headers: Default::default(),
    };
    let id = repo
        .write_object(&commit)
        .map_err(|e| object_error(repo, format!("write commit: {e}")))?;
    Ok(id.detach().to_string())
}

fn update_map_ref(repo: &gix::Repository, snapshot_id: &str, commit_oid: &str) -> Result<()> {
    let oid = parse_oid(repo, commit_oid)?;
    repo.reference(
        map_ref_name(snapshot_id),
        oid,
        gix::refs::transaction::PreviousValue::Any,
        "fst-git: export snapshot",
    )
    .map_err(|e| object_error(repo, format!("update {}: {e}", map_ref_name(snapshot_id))))?;
    Ok(())
}

fn read_tree_to_manifest(
    store: &Store,
    repo: &gix::Repository,
    tree: &gix::Tree<'_>,
    prefix: &str,
) -> Result<Manifest> {
    let mut entries = Vec::new();
    collect_tree_entries(store, repo, tree, prefix, &mut entries)?;
    Manifest::new(entries).map_err(GitInterchangeError::Core)
}

fn collect_tree_entries(
    store: &Store,
    repo: &gix::Repository,
    tree: &gix::Tree<'_>,
    prefix: &str,
    out: &mut Vec<Entry>,
) -> Result<()> {
    for item in tree.iter() {
        let item = item.map_err(|e| object_error(repo, format!("decode tree entry: {e}")))?;
        let name = item.inner.filename.to_string();
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        match item.inner.mode.kind() {
            gix::objs::tree::EntryKind::Tree => {
                let subtree = repo
                    .find_tree(item.inner.oid)
                    .map_err(|e| object_error(repo, format!("tree {}: {e}", item.inner.oid)))?;
                collect_tree_entries(store, repo, &subtree, &path, out)?;
            }
            gix::objs::tree::EntryKind::Blob | gix::objs::tree::EntryKind::BlobExecutable => {
                let mut blob = repo
                    .find_blob(item.inner.oid)
                    .map_err(|e| object_error(repo, format!("blob {}: {e}", item.inner.oid)))?;
                let bytes = blob.take_data();
                let hash = fst::hashio::hash_bytes(&bytes);
                store.put_blob(&hash, &bytes)?;
                let mode = if item.inner.mode.kind() == gix::objs::tree::EntryKind::BlobExecutable {
                    0o755
                } else {
                    0o644
                };
                out.push(Entry::File {
                    path,
                    mode,
                    size: bytes.len() as u64,
                    hash,
                });
            }
            gix::objs::tree::EntryKind::Link => {
                let mut blob = repo
                    .find_blob(item.inner.oid)
                    .map_err(|e| object_error(repo, format!("symlink blob {}: {e}", item.inner.oid)))?;
                let target = String::from_utf8_lossy(blob.take_data().as_slice()).into_owned();
                out.push(Entry::Symlink {
                    path,
                    mode: 0o777,
                    target,
                });
            }
            gix::objs::tree::EntryKind::Commit => {
                return Err(GitInterchangeError::UnsupportedEntry {
                    path,
                    reason: "gitlinks/submodules are not representable as an fst manifest entry"
                        .to_string(),
                });
            }
        }
    }
    Ok(())
}

fn format_git_time(signature: &gix::actor::SignatureRef<'_>) -> Result<String> {
    let seconds = signature.time().seconds;
    let dt = time_from_unix_seconds(seconds);
    Ok(dt)
}

/// Format a Unix timestamp as RFC3339 UTC without pulling in a datetime
/// crate for this single call site — the interchange adapter only needs
/// whole-second precision to match git's own commit timestamp grain.
fn time_from_unix_seconds(seconds: i64) -> String {
    const SECONDS_PER_DAY: i64 = 86_400;
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    let secs_of_day = seconds.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Howard Hinnant's `civil_from_days` algorithm (public domain), converting
/// a day count since the Unix epoch into a proleptic-Gregorian
/// (year, month, day) triple.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

fn parse_rfc3339_to_git_time(rfc3339: &str) -> Result<gix::date::Time> {
    let seconds = unix_seconds_from_rfc3339(rfc3339).ok_or_else(|| {
        GitInterchangeError::MappingInconsistent {
            message: format!("{rfc3339:?} is not a valid RFC3339 UTC timestamp"),
        }
    })?;
    Ok(gix::date::Time::new(seconds, 0))
}

fn unix_seconds_from_rfc3339(s: &str) -> Option<i64> {
    let s = s.strip_suffix('Z')?;
    let (date, time) = s.split_once('T')?;
    let mut date_parts = date.splitn(3, '-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: i64 = date_parts.next()?.parse().ok()?;
    let day: i64 = date_parts.next()?.parse().ok()?;
    let mut time_parts = time.splitn(3, ':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    Some(days * 86_400 + hour * 3600 + minute * 60 + second)
}

fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = if m > 2 { m - 3 } else { m + 9 } as u64;
    let doy = (153 * mp + 2) / 5 + d as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

#[derive(Default)]
struct TreeBuilder {
    root: TreeNode,
}

#[derive(Default)]
struct TreeNode {
    blobs: Vec<(String, gix::objs::tree::EntryKind, gix::ObjectId)>,
    dirs: std::collections::BTreeMap<String, TreeNode>,
}

impl TreeBuilder {
    fn insert(&mut self, path: &str, kind: gix::objs::tree::EntryKind, oid: gix::ObjectId) {
        let mut node = &mut self.root;
        let mut parts = path.split('/').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                node.blobs.push((part.to_string(), kind, oid));
            } else {
                node = node.dirs.entry(part.to_string()).or_default();
            }
        }
    }

    fn write(&self, repo: &gix::Repository) -> Result<gix::ObjectId> {
        write_node(repo, &self.root)
    }
}

fn write_node(repo: &gix::Repository, node: &TreeNode) -> Result<gix::ObjectId> {
    let mut entries = Vec::new();
    for (name, kind, oid) in &node.blobs {
        entries.push(gix::objs::tree::Entry {
            mode: (*kind).into(),
            filename: name.as_str().into(),
            oid: *oid,
        });
    }
    for (name, child) in &node.dirs {
        let child_oid = write_node(repo, child)?;
        entries.push(gix::objs::tree::Entry {
            mode: gix::objs::tree::EntryKind::Tree.into(),
            filename: name.as_str().into(),
            oid: child_oid,
        });
    }
    entries.sort_by(|a, b| a.filename.cmp(&b.filename));
    let tree = gix::objs::Tree { entries };
    let id = repo
        .write_object(&tree)
        .map_err(|e| object_error(repo, format!("write tree: {e}")))?;
    Ok(id.detach())
}
