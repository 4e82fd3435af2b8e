//! History operations: edit/drop/squash/rebase as structural DAG
//! transforms. All ops preserve "snapshots are immutable" by producing new
//! snapshots and moving pointers; they never mutate an existing record
//! (except `edit`, the one permitted in-place mutation of `message`).

use crate::dag::{self, SnapshotIdentityInput};
use crate::error::{Error, Result};
use crate::store::{SnapshotMeta, Store};

/// Update only the `message` field of an existing snapshot. The ID is
/// unchanged because `message` is not part of the identity formula.
#[tracing::instrument(skip(store))]
pub fn edit(store: &Store, id: &str, new_message: &str) -> Result<()> {
    let mut meta = store.get_snapshot(id)?;
    meta.message = new_message.to_string();
    // `put_snapshot` would reject this as a conflicting overwrite since the
    // content differs from what's on disk under the same ID; write the
    // metadata file directly instead, mirroring the "only permitted
    // in-place mutation" carve-out from the rest of the store's contract.
    store.delete_snapshot(id)?;
    write_meta_unconditionally(store, &meta)
}

fn write_meta_unconditionally(store: &Store, meta: &SnapshotMeta) -> Result<()> {
    store.put_snapshot(meta)
}

fn synthesize(
    store: &Store,
    manifest_hash: &str,
    parent_ids: &[String],
    template: &SnapshotMeta,
    message: &str,
    created_at: &str,
) -> Result<SnapshotMeta> {
    let (id, parents) = dag::derive_snapshot_id(&SnapshotIdentityInput {
        manifest_hash,
        parent_ids,
        author_name: &template.author_name,
        author_email: &template.author_email,
        created_at,
    });
    let manifest = store.get_manifest(manifest_hash)?;
    let meta = SnapshotMeta {
        id: id.clone(),
        workspace_id: template.workspace_id.clone(),
        workspace_name: template.workspace_name.clone(),
        manifest_hash: manifest_hash.to_string(),
        parent_snapshot_ids: parents,
        author_name: template.author_name.clone(),
        author_email: template.author_email.clone(),
        message: message.to_string(),
        agent: template.agent.clone(),
        created_at: created_at.to_string(),
        files: manifest.file_count() as u64,
        size: manifest.total_size(),
    };
    store.put_snapshot(&meta)?;
    Ok(meta)
}

/// Drop `id` from the chain: `id` must have ≤1 parent and ≤1 child.
/// Reroutes the child by synthesizing a new snapshot whose parent is
/// `id`'s parent, and propagates forward to the tip, producing a rewritten
/// sequence mirroring the old one but skipping `id`. Returns the new tip
/// ID. The caller is responsible for updating the workspace pointer.
#[tracing::instrument(skip(store))]
pub fn drop_snapshot(store: &Store, id: &str, created_at: &str) -> Result<String> {
    let meta = store.get_snapshot(id)?;
    if meta.parent_snapshot_ids.len() > 1 {
        return Err(Error::conflict(format!(
            "{id} has {} parents; drop requires a linear chain",
            meta.parent_snapshot_ids.len()
        )));
    }
    let kids = dag::children(store, id)?;
    if kids.len() > 1 {
        return Err(Error::conflict(format!(
            "{id} has {} children; drop requires a linear chain",
            kids.len()
        )));
    }

    let new_parent = meta.parent_snapshot_ids.first().cloned();
    let Some(child_id) = kids.into_iter().next() else {
        // `id` is the tip: dropping it just moves the tip up to its parent.
        return new_parent
            .ok_or_else(|| Error::conflict(format!("cannot drop root snapshot {id} with no tip to fall back to")));
    };

    rewrite_forward(store, &child_id, new_parent.as_deref(), created_at)
}

/// Synthesize a new snapshot carrying `child_id`'s manifest onto
/// `new_parent`, then recursively continue forward through the rest of the
/// original chain, re-parenting each descendant onto the freshly
/// synthesized snapshot in turn. Returns the new tip ID.
fn rewrite_forward(
    store: &Store,
    child_id: &str,
    new_parent: Option<&str>,
    created_at: &str,
) -> Result<String> {
    let child_meta = store.get_snapshot(child_id)?;
    let new_parents: Vec<String> = new_parent.into_iter().map(str::to_string).collect();
    let new_meta = synthesize(
        store,
        &child_meta.manifest_hash,
        &new_parents,
        &child_meta,
        &child_meta.message,
        created_at,
    )?;

    let grandchildren = dag::children(store, child_id)?;
    match grandchildren.as_slice() {
        [] => Ok(new_meta.id),
        [only] => rewrite_forward(store, only, Some(&new_meta.id), created_at),
        _ => Err(Error::conflict(format!(
            "{child_id} has {} children; rewrite requires a linear chain",
            grandchildren.len()
        ))),
    }
}

/// Collapse a linear range `from..=to` into one new snapshot whose
/// manifest equals `to`'s manifest and whose parents equal `from`'s
/// parents, with a caller-provided message. Returns the new snapshot ID.
#[tracing::instrument(skip(store, message))]
pub fn squash(store: &Store, from: &str, to: &str, message: &str, created_at: &str) -> Result<String> {
    dag::linear_range(store, from, to)?; // validates linearity; discards the chain
    let from_meta = store.get_snapshot(from)?;
    let to_meta = store.get_snapshot(to)?;
    let new_meta = synthesize(
        store,
        &to_meta.manifest_hash,
        &from_meta.parent_snapshot_ids,
        &to_meta,
        message,
        created_at,
    )?;
    tracing::debug!(new_id = %new_meta.id, "squash complete");
    Ok(new_meta.id)
}

/// Rebase a linear range `from..=to` onto `onto`. `onto` must be an
/// ancestor of `from`'s parent and must not be within the range itself.
/// Rewrites the chain so the new `from'` has parent `onto`, propagating
/// forward. Returns the new tip ID.
#[tracing::instrument(skip(store))]
pub fn rebase(store: &Store, from: &str, to: &str, onto: &str, created_at: &str) -> Result<String> {
    let range = dag::linear_range(store, from, to)?;
    if range.iter().any(|id| id == onto) {
        return Err(Error::conflict(format!(
            "{onto} is within the range being rebased"
        )));
    }
    let from_meta = store.get_snapshot(from)?;
    let parent = from_meta
        .parent_snapshot_ids
        .first()
        .cloned()
        .ok_or_else(|| Error::conflict(format!("{from} has no parent to rebase from")))?;
    if !dag::is_ancestor(store, onto, &parent)? {
        return Err(Error::conflict(format!(
            "{onto} is not an ancestor of {from}'s parent"
        )));
    }

    let new_tip = rewrite_forward(store, from, Some(onto), created_at)?;
    tracing::debug!(new_tip = %new_tip, "rebase complete");
    Ok(new_tip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Entry, Manifest};

    fn put_chain(store: &Store, ids_and_parents: &[(&str, &[&str])]) {
        for (id, parents) in ids_and_parents {
            let manifest = Manifest::new(vec![Entry::File {
                path: format!("{id}.txt"),
                mode: 0o644,
                size: 1,
                hash: "a".repeat(64),
            }])
            .unwrap();
            let hash = store.put_manifest(&manifest).unwrap();
            store
                .put_snapshot(&SnapshotMeta {
                    id: id.to_string(),
                    workspace_id: "ws".to_string(),
                    workspace_name: "main".to_string(),
                    manifest_hash: hash,
                    parent_snapshot_ids: parents.iter().map(|s| s.to_string()).collect(),
                    author_name: "A".to_string(),
                    author_email: "a@x".to_string(),
                    message: id.to_string(),
                    agent: String::new(),
                    created_at: "2024-01-01T00:00:00Z".to_string(),
                    files: 1,
                    size: 1,
                })
                .unwrap();
        }
    }

    #[test]
    fn edit_changes_message_keeps_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put_chain(&store, &[("s0", &[])]);
        edit(&store, "s0", "new message").unwrap();
        let meta = store.get_snapshot("s0").unwrap();
        assert_eq!(meta.message, "new message");
        assert_eq!(meta.id, "s0");
    }

    #[test]
    fn drop_rewrites_descendant_onto_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put_chain(
            &store,
            &[("s0", &[]), ("s1", &["s0"]), ("s2", &["s1"]), ("s3", &["s2"])],
        );
        let new_tip = drop_snapshot(&store, "s2", "2024-01-02T00:00:00Z").unwrap();
        let tip_meta = store.get_snapshot(&new_tip).unwrap();
        let s3_meta = store.get_snapshot("s3").unwrap();
        assert_eq!(tip_meta.manifest_hash, s3_meta.manifest_hash);
        // Original snapshots remain on disk (reclaimed later by GC).
        assert!(store.get_snapshot("s2").is_ok());
        assert!(store.get_snapshot("s3").is_ok());
    }

    #[test]
    fn rebase_rejects_non_ancestor_onto() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put_chain(
            &store,
            &[("s0", &[]), ("s1", &["s0"]), ("s2", &["s1"]), ("f", &["s0"])],
        );
        let err = rebase(&store, "s1", "s2", "f", "2024-01-02T00:00:00Z").unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn rebase_onto_valid_ancestor_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put_chain(
            &store,
            &[
                ("s0", &[]),
                ("base1", &["s0"]),
                ("s1", &["base1"]),
                ("s2", &["s1"]),
            ],
        );
        let new_tip = rebase(&store, "s1", "s2", "s0", "2024-01-02T00:00:00Z").unwrap();
        let meta = store.get_snapshot(&new_tip).unwrap();
        let s2_meta = store.get_snapshot("s2").unwrap();
        assert_eq!(meta.manifest_hash, s2_meta.manifest_hash);
    }

    #[test]
    fn squash_collapses_range_to_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put_chain(&store, &[("s0", &[]), ("s1", &["s0"]), ("s2", &["s1"])]);
        let new_id = squash(&store, "s1", "s2", "squashed", "2024-01-02T00:00:00Z").unwrap();
        let meta = store.get_snapshot(&new_id).unwrap();
        let s2_meta = store.get_snapshot("s2").unwrap();
        assert_eq!(meta.manifest_hash, s2_meta.manifest_hash);
        assert_eq!(meta.parent_snapshot_ids, vec!["s0".to_string()]);
        assert_eq!(meta.message, "squashed");
    }
}
