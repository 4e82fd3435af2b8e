//! Snapshot DAG: identity derivation, parent linkage, ancestor/LCA
//! queries, reachability, linear-range resolution.

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::hashio::hash_bytes;
use crate::store::{normalize_parent_ids, Store};

/// Inputs to the snapshot identity formula.
#[derive(Debug, Clone)]
pub struct SnapshotIdentityInput<'a> {
    /// Hash of the snapshot's manifest.
    pub manifest_hash: &'a str,
    /// Raw (not yet normalized) parent snapshot IDs.
    pub parent_ids: &'a [String],
    /// Author display name.
    pub author_name: &'a str,
    /// Author email.
    pub author_email: &'a str,
    /// RFC3339 UTC creation timestamp, supplied by the caller (never
    /// wall-clock read internally).
    pub created_at: &'a str,
}

/// Derive the deterministic snapshot ID: `snap-<hex>` where `<hex>` is the
/// SHA-256 of `manifest_hash || sorted_parent_ids || author_name ||
/// author_email || created_at`. Parent IDs are normalized (deduplicated,
/// empty removed, sorted) before hashing so identity is independent of
/// parent order.
#[must_use]
pub fn derive_snapshot_id(input: &SnapshotIdentityInput<'_>) -> (String, Vec<String>) {
    let parents = normalize_parent_ids(input.parent_ids);
    let mut buf = String::new();
    buf.push_str(input.manifest_hash);
    for p in &parents {
        buf.push_str(p);
    }
    buf.push_str(input.author_name);
    buf.push_str(input.author_email);
    buf.push_str(input.created_at);
    let id = format!("snap-{}", hash_bytes(buf.as_bytes()));
    (id, parents)
}

/// Parent IDs of `id`.
pub fn parents(store: &Store, id: &str) -> Result<Vec<String>> {
    Ok(store.get_snapshot(id)?.parent_snapshot_ids)
}

/// Children of `id`, found by scanning all snapshot metadata. No reverse
/// index is persisted; callers that need this repeatedly should cache it.
pub fn children(store: &Store, id: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for candidate_id in store.list_snapshot_ids()? {
        let meta = store.get_snapshot(&candidate_id)?;
        if meta.parent_snapshot_ids.iter().any(|p| p == id) {
            out.push(candidate_id);
        }
    }
    out.sort();
    Ok(out)
}

/// Lazy BFS over `parents`, collecting every ancestor of `id` (exclusive).
/// Terminates because the DAG is acyclic and finite.
pub fn ancestors(store: &Store, id: &str) -> Result<HashSet<String>> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<String> = parents(store, id)?.into_iter().collect();
    while let Some(next) = queue.pop_front() {
        if seen.insert(next.clone()) {
            queue.extend(parents(store, &next)?);
        }
    }
    Ok(seen)
}

/// True if `a` is an ancestor of `b`, or `a == b`.
pub fn is_ancestor(store: &Store, a: &str, b: &str) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    Ok(ancestors(store, b)?.contains(a))
}

/// Least common ancestor of `a` and `b` via the standard two-color walk:
/// paint `a`'s ancestors (inclusive), then walk upward from `b` (inclusive)
/// until a painted node is found. Returns `None` if the two snapshots
/// share no common ancestor.
pub fn lca(store: &Store, a: &str, b: &str) -> Result<Option<String>> {
    let mut red: HashSet<String> = ancestors(store, a)?;
    red.insert(a.to_string());

    if red.contains(b) {
        return Ok(Some(b.to_string()));
    }

    let mut seen = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([b.to_string()]);
    while let Some(next) = queue.pop_front() {
        if !seen.insert(next.clone()) {
            continue;
        }
        if red.contains(&next) {
            return Ok(Some(next));
        }
        queue.extend(parents(store, &next)?);
    }
    Ok(None)
}

/// BFS over parent pointers from every snapshot in `roots`, returning the
/// full reachable set (inclusive of the roots themselves). Used by GC.
pub fn reachable_from(store: &Store, roots: &[String]) -> Result<HashSet<String>> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<String> = roots.iter().cloned().collect();
    while let Some(next) = queue.pop_front() {
        if seen.insert(next.clone()) {
            queue.extend(parents(store, &next)?);
        }
    }
    Ok(seen)
}

/// Verify that `from..=to` is a linear range: a sequence of snapshots
/// where each has exactly one parent in the chain and exactly one child in
/// the chain, `to` being the most recent. Returns the chain from `from` to
/// `to` inclusive (ascending, oldest first).
///
/// Used by `squash`/`rebase`, which are restricted to linear ranges within
/// a single workspace's current chain.
pub fn linear_range(store: &Store, from: &str, to: &str) -> Result<Vec<String>> {
    let mut chain = vec![to.to_string()];
    let mut cursor = to.to_string();
    loop {
        if cursor == from {
            chain.reverse();
            return Ok(chain);
        }
        let meta = store.get_snapshot(&cursor)?;
        if meta.parent_snapshot_ids.len() != 1 {
            return Err(Error::conflict(format!(
                "{cursor} does not have exactly one parent; range is not linear"
            )));
        }
        let parent = meta.parent_snapshot_ids[0].clone();
        let kids = children(store, &parent)?;
        if kids.len() != 1 {
            return Err(Error::conflict(format!(
                "{parent} has {} children; range is not linear",
                kids.len()
            )));
        }
        chain.push(parent.clone());
        cursor = parent;
        if chain.len() > 1_000_000 {
            return Err(Error::conflict(format!(
                "{from} is not an ancestor of {to} within a bounded linear walk"
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SnapshotMeta;

    fn put(store: &Store, id: &str, parents: &[&str]) {
        store
            .put_snapshot(&SnapshotMeta {
                id: id.to_string(),
                workspace_id: "ws".to_string(),
                workspace_name: "main".to_string(),
                manifest_hash: "a".repeat(64),
                parent_snapshot_ids: parents.iter().map(|s| s.to_string()).collect(),
                author_name: "A".to_string(),
                author_email: "a@x".to_string(),
                message: String::new(),
                agent: String::new(),
                created_at: "2024-01-01T00:00:00Z".to_string(),
                files: 0,
                size: 0,
            })
            .unwrap();
    }

    #[test]
    fn identity_is_independent_of_parent_order() {
        let input_a = SnapshotIdentityInput {
            manifest_hash: &"a".repeat(64),
            parent_ids: &["snap-b".to_string(), "snap-a".to_string()],
            author_name: "A",
            author_email: "a@x",
            created_at: "2024-01-01T00:00:00Z",
        };
        let input_b = SnapshotIdentityInput {
            manifest_hash: &"a".repeat(64),
            parent_ids: &["snap-a".to_string(), "snap-b".to_string()],
            author_name: "A",
            author_email: "a@x",
            created_at: "2024-01-01T00:00:00Z",
        };
        assert_eq!(derive_snapshot_id(&input_a).0, derive_snapshot_id(&input_b).0);
    }

    #[test]
    fn ancestors_and_is_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put(&store, "s0", &[]);
        put(&store, "s1", &["s0"]);
        put(&store, "s2", &["s1"]);

        assert_eq!(
            ancestors(&store, "s2").unwrap(),
            HashSet::from(["s0".to_string(), "s1".to_string()])
        );
        assert!(is_ancestor(&store, "s0", "s2").unwrap());
        assert!(!is_ancestor(&store, "s2", "s0").unwrap());
        assert!(is_ancestor(&store, "s2", "s2").unwrap());
    }

    #[test]
    fn lca_finds_branch_point() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put(&store, "s0", &[]);
        put(&store, "s1", &["s0"]);
        put(&store, "s2", &["s1"]);
        put(&store, "f", &["s0"]);

        assert_eq!(lca(&store, "s2", "f").unwrap(), Some("s0".to_string()));
    }

    #[test]
    fn lca_none_when_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put(&store, "a", &[]);
        put(&store, "b", &[]);
        assert_eq!(lca(&store, "a", "b").unwrap(), None);
    }

    #[test]
    fn linear_range_rejects_merge_commit_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put(&store, "s0", &[]);
        put(&store, "s1", &["s0"]);
        put(&store, "other", &["s0"]);
        put(&store, "m", &["s1", "other"]);

        let err = linear_range(&store, "s0", "m").unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn linear_range_returns_ascending_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put(&store, "s0", &[]);
        put(&store, "s1", &["s0"]);
        put(&store, "s2", &["s1"]);
        put(&store, "s3", &["s2"]);

        let chain = linear_range(&store, "s1", "s3").unwrap();
        assert_eq!(chain, vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]);
    }

    #[test]
    fn reachable_from_covers_multiple_roots() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        put(&store, "s0", &[]);
        put(&store, "s1", &["s0"]);
        put(&store, "f", &["s0"]);

        let reachable = reachable_from(&store, &["s1".to_string(), "f".to_string()]).unwrap();
        assert_eq!(
            reachable,
            HashSet::from(["s0".to_string(), "s1".to_string(), "f".to_string()])
        );
    }
}
