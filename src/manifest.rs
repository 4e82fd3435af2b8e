//! Manifest model: ordered entries describing one directory state,
//! canonical serialization, stable hashing, diff.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashio::hash_bytes;

/// One entry in a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    /// A regular file.
    File {
        /// POSIX-style relative path, forward slashes. Taken verbatim from
        /// the scanning filesystem's path components with no Unicode
        /// normalization: a filesystem that hands back NFD-decomposed
        /// names (e.g. HFS+/APFS for certain inputs) and one that hands
        /// back NFC for the same visible filename will hash to different
        /// manifests. Accepted gap, not enforced.
        path: String,
        /// Low 9 bits of POSIX permissions.
        mode: u32,
        /// Content length in bytes.
        size: u64,
        /// SHA-256 of the content, lowercase hex.
        hash: String,
    },
    /// A symbolic link. Mode is advisory only, never enforced on restore.
    Symlink {
        /// POSIX-style relative path.
        path: String,
        /// Advisory mode bits; not diffed.
        mode: u32,
        /// Link target text, exactly as returned by `readlink`.
        target: String,
    },
}

impl Entry {
    /// The entry's path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Entry::File { path, .. } | Entry::Symlink { path, .. } => path,
        }
    }
}

/// An ordered, canonical description of a directory's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version; currently always `"1"`.
    pub version: String,
    /// Entries sorted by `path` in byte-lexicographic order.
    pub files: Vec<Entry>,
}

impl Manifest {
    /// Build a manifest from entries, sorting them by path and validating
    /// uniqueness. Returns [`Error::Conflict`] on duplicate paths.
    pub fn new(mut entries: Vec<Entry>) -> Result<Self> {
        entries.sort_by(|a, b| a.path().cmp(b.path()));
        for w in entries.windows(2) {
            if w[0].path() == w[1].path() {
                return Err(Error::conflict(format!(
                    "duplicate manifest path: {}",
                    w[0].path()
                )));
            }
        }
        Ok(Self {
            version: "1".to_string(),
            files: entries,
        })
    }

    /// An empty manifest.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: "1".to_string(),
            files: Vec::new(),
        }
    }

    /// Serialize to the canonical byte form: fixed key order
    /// `{type,path,mode,size,hash,target}`, sorted entries, no
    /// insignificant whitespace.
    #[must_use]
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = String::from(r#"{"version":""#);
        out.push_str(&self.version);
        out.push_str(r#"","files":["#);
        for (i, entry) in self.files.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&canonical_entry(entry));
        }
        out.push_str("]}");
        out.into_bytes()
    }

    /// Parse a manifest from canonical (or any valid) JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupt("manifest", "<bytes>", e.to_string()))
    }

    /// SHA-256 of the canonical serialization, lowercase hex.
    #[must_use]
    pub fn hash(&self) -> String {
        hash_bytes(&self.to_canonical_bytes())
    }

    /// Number of entries.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Sum of `size` over `File` entries (symlinks do not contribute).
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|e| match e {
                Entry::File { size, .. } => Some(*size),
                Entry::Symlink { .. } => None,
            })
            .sum()
    }

    /// Look up an entry by path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Entry> {
        // Entries are sorted by path; binary search is safe.
        self.files
            .binary_search_by(|e| e.path().cmp(path))
            .ok()
            .map(|i| &self.files[i])
    }
}

fn canonical_entry(entry: &Entry) -> String {
    match entry {
        Entry::File {
            path,
            mode,
            size,
            hash,
        } => format!(
            r#"{{"type":"file","path":{},"mode":{mode},"size":{size},"hash":{}}}"#,
            json_string(path),
            json_string(hash)
        ),
        Entry::Symlink { path, mode, target } => format!(
            r#"{{"type":"symlink","path":{},"mode":{mode},"target":{}}}"#,
            json_string(path),
            json_string(target)
        ),
    }
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization cannot fail")
}

/// Result of [`diff`]: sets of paths added, modified, and deleted going
/// from `base` to `target`. Always sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestDiff {
    /// Paths present in `target` but not `base`.
    pub added: Vec<String>,
    /// Paths present in both, with differing content (hash/target/mode).
    pub modified: Vec<String>,
    /// Paths present in `base` but not `target`.
    pub deleted: Vec<String>,
}

/// Compute the set-difference between two manifests.
#[must_use]
pub fn diff(base: &Manifest, target: &Manifest) -> ManifestDiff {
    let mut result = ManifestDiff::default();
    let mut bi = base.files.iter().peekable();
    let mut ti = target.files.iter().peekable();
    loop {
        match (bi.peek(), ti.peek()) {
            (Some(b), Some(t)) => match b.path().cmp(t.path()) {
                std::cmp::Ordering::Less => {
                    result.deleted.push(b.path().to_string());
                    bi.next();
                }
                std::cmp::Ordering::Greater => {
                    result.added.push(t.path().to_string());
                    ti.next();
                }
                std::cmp::Ordering::Equal => {
                    if entries_differ(b, t) {
                        result.modified.push(b.path().to_string());
                    }
                    bi.next();
                    ti.next();
                }
            },
            (Some(b), None) => {
                result.deleted.push(b.path().to_string());
                bi.next();
            }
            (None, Some(t)) => {
                result.added.push(t.path().to_string());
                ti.next();
            }
            (None, None) => break,
        }
    }
    result
}

fn entries_differ(a: &Entry, b: &Entry) -> bool {
    match (a, b) {
        (
            Entry::File {
                mode: ma,
                hash: ha,
                ..
            },
            Entry::File {
                mode: mb,
                hash: hb,
                ..
            },
        ) => ma != mb || ha != hb,
        (Entry::Symlink { target: ta, .. }, Entry::Symlink { target: tb, .. }) => ta != tb,
        // A type change (file <-> symlink) at the same path is a modification.
        _ => true,
    }
}
