//! Three-way merge: per-path action computation over manifests, plus
//! conflict resolution policies.

use crate::manifest::{Entry, Manifest};

/// The classification assigned to one path by [`plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Take theirs (includes the add-from-theirs and fast-forward cases).
    Apply,
    /// Keep ours; no action needed.
    InSync,
    /// Both sides changed the path incompatibly; caller must resolve.
    Conflict,
    /// Not a real change (e.g. absent on theirs without being a deletion).
    Skip,
}

/// One path's merge classification, carrying enough context for callers
/// to act and for conflict resolution to run.
#[derive(Debug, Clone)]
pub struct PathPlan {
    /// The path being classified.
    pub path: String,
    /// What to do about it.
    pub action: Action,
    /// The base manifest's entry, if any.
    pub base: Option<Entry>,
    /// Our manifest's entry, if any.
    pub ours: Option<Entry>,
    /// Their manifest's entry, if any.
    pub theirs: Option<Entry>,
}

/// The full per-path classification of a three-way merge.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// One entry per path in `base ∪ ours ∪ theirs`.
    pub paths: Vec<PathPlan>,
}

impl MergePlan {
    /// Paths classified as `Conflict`.
    #[must_use]
    pub fn conflicts(&self) -> Vec<&PathPlan> {
        self.paths
            .iter()
            .filter(|p| p.action == Action::Conflict)
            .collect()
    }

    /// True if no path needs manual resolution.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts().is_empty()
    }
}

fn content_key(entry: &Entry) -> &str {
    match entry {
        Entry::File { hash, .. } => hash,
        Entry::Symlink { target, .. } => target,
    }
}

fn same_content(a: &Entry, b: &Entry) -> bool {
    match (a, b) {
        (Entry::File { hash: ha, mode: ma, .. }, Entry::File { hash: hb, mode: mb, .. }) => {
            ha == hb && ma == mb
        }
        (Entry::Symlink { target: ta, .. }, Entry::Symlink { target: tb, .. }) => ta == tb,
        _ => false,
    }
}

/// Classify every path across `base`, `ours`, and `theirs` into one of the
/// eight presence/change combinations. Every path appears in exactly one
/// bucket of the resulting plan.
#[tracing::instrument(skip(base, ours, theirs))]
#[must_use]
pub fn plan(base: &Manifest, ours: &Manifest, theirs: &Manifest) -> MergePlan {
    let mut all_paths: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    all_paths.extend(base.files.iter().map(Entry::path));
    all_paths.extend(ours.files.iter().map(Entry::path));
    all_paths.extend(theirs.files.iter().map(Entry::path));

    let mut result = MergePlan::default();
    for path in all_paths {
        let b = base.get(path).cloned();
        let o = ours.get(path).cloned();
        let t = theirs.get(path).cloned();
        let action = classify(b.as_ref(), o.as_ref(), t.as_ref());
        result.paths.push(PathPlan {
            path: path.to_string(),
            action,
            base: b,
            ours: o,
            theirs: t,
        });
    }
    tracing::debug!(
        paths = result.paths.len(),
        conflicts = result.conflicts().len(),
        "merge plan computed"
    );
    result
}

fn classify(base: Option<&Entry>, ours: Option<&Entry>, theirs: Option<&Entry>) -> Action {
    match (base, ours, theirs) {
        // Case 1: absent / absent / present -> apply (add theirs).
        (None, None, Some(_)) => Action::Apply,

        // Case 3: present / present / absent -> they deleted, keep ours.
        (Some(_), Some(_), None) => Action::InSync,

        // Case 2: present / absent / present -> we deleted it, they still
        // have it. Unconditional conflict: a deletion never gets a free
        // pass just because the other side's content still matches base.
        (Some(_), None, Some(_)) => Action::Conflict,

        // Absent on theirs and not a deletion from base (base absent, ours
        // present, theirs absent): nothing for this merge to do.
        (None, Some(_), None) => Action::Skip,

        // Both sides absent: nothing ever existed here.
        (None, None, None) => Action::Skip,

        // Base absent on both sides is covered above; base present and
        // both sides absent is a concurrent delete, already in sync.
        (Some(_), None, None) => Action::InSync,

        (base, Some(o), Some(t)) => {
            let ours_changed = base.map_or(true, |b| !same_content(b, o));
            let theirs_changed = base.map_or(true, |b| !same_content(b, t));
            match (ours_changed, theirs_changed) {
                // Case 4: same hash both sides -> in sync.
                (_, _) if content_key(o) == content_key(t) && same_content(o, t) => Action::InSync,
                // Case 6: only ours changed (theirs == base) -> keep ours.
                (true, false) => Action::InSync,
                // Case 5: only theirs changed (ours == base) -> apply.
                (false, true) => Action::Apply,
                // Neither changed: in sync (degenerate, same as case 4).
                (false, false) => Action::InSync,
                // Case 7: both changed, to different content -> conflict.
                (true, true) => Action::Conflict,
            }
        }
    }
}

/// Render the textual 3-way conflict-marker form for `manual` resolution
/// mode: `<<<<<<< CURRENT\n{ours}\n=======\n{theirs}\n>>>>>>> SOURCE\n`.
#[must_use]
pub fn conflict_markers(ours: &[u8], theirs: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ours.len() + theirs.len() + 64);
    out.extend_from_slice(b"<<<<<<< CURRENT\n");
    out.extend_from_slice(ours);
    if !ours.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b"=======\n");
    out.extend_from_slice(theirs);
    if !theirs.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b">>>>>>> SOURCE\n");
    out
}

/// Strategy a caller chooses for resolving a `Conflict` path. Never chosen
/// internally by the merge engine.
pub enum ConflictMode<'a> {
    /// Invoke an external agent adapter; falls back to `Manual` output if
    /// the adapter fails.
    Agent(&'a dyn AgentAdapter),
    /// Write textual conflict markers for the user to resolve later.
    Manual,
    /// Take theirs verbatim.
    Theirs,
    /// Take ours verbatim.
    Ours,
}

/// External collaborator that can resolve a content-level conflict, e.g.
/// by invoking a coding-agent subprocess. Implemented outside this crate.
pub trait AgentAdapter {
    /// Attempt to merge the three byte buffers for `path`. Returns `None`
    /// on failure, in which case the caller should fall back to
    /// [`ConflictMode::Manual`].
    fn merge(
        &self,
        base: Option<&[u8]>,
        ours: Option<&[u8]>,
        theirs: Option<&[u8]>,
        path: &str,
    ) -> Option<Vec<u8>>;
}

/// Resolve one conflicting path's bytes according to `mode`.
#[must_use]
pub fn resolve_conflict(
    mode: &ConflictMode<'_>,
    base: Option<&[u8]>,
    ours: Option<&[u8]>,
    theirs: Option<&[u8]>,
    path: &str,
) -> Vec<u8> {
    match mode {
        ConflictMode::Agent(adapter) => adapter
            .merge(base, ours, theirs, path)
            .unwrap_or_else(|| conflict_markers(ours.unwrap_or(&[]), theirs.unwrap_or(&[]))),
        ConflictMode::Manual => conflict_markers(ours.unwrap_or(&[]), theirs.unwrap_or(&[])),
        ConflictMode::Theirs => theirs.unwrap_or(&[]).to_vec(),
        ConflictMode::Ours => ours.unwrap_or(&[]).to_vec(),
    }
}
