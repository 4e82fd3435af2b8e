//! Unified error taxonomy for the snapshot engine.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. There
//! are no panics on caller-reachable input and the engine never prints to
//! stdout/stderr — errors are data, propagated untouched to the caller.

use std::path::PathBuf;

/// The single error type returned by all fallible operations in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced snapshot, manifest, blob, or workspace does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was being looked up (e.g. `"snapshot snap-abc123"`).
        what: String,
    },

    /// A file exists but failed to deserialize or failed hash validation.
    #[error("corrupt {what} at {}: {detail}", path.display())]
    Corrupt {
        /// What kind of record was corrupt (e.g. `"manifest"`, `"snapshot metadata"`).
        what: String,
        /// Path to the corrupt file.
        path: PathBuf,
        /// Human-readable description of the corruption.
        detail: String,
    },

    /// The operation would violate an invariant of the data model.
    #[error("conflict: {detail}")]
    Conflict {
        /// Human-readable description of the violated invariant.
        detail: String,
    },

    /// The advisory lock could not be acquired within the caller's deadline.
    #[error("busy: could not acquire lock at {}", path.display())]
    Busy {
        /// Path to the contended lock file.
        path: PathBuf,
    },

    /// A snapshot ID prefix matched more than one snapshot.
    #[error("ambiguous prefix {prefix:?}: matches {matches:?}")]
    Ambiguous {
        /// The prefix that was resolved.
        prefix: String,
        /// The full IDs it matched (at most a handful are kept for display).
        matches: Vec<String>,
    },

    /// An underlying filesystem operation failed.
    #[error("I/O error during {op} on {}: {source}", path.display())]
    Io {
        /// The path the operation was acting on.
        path: PathBuf,
        /// Short description of the operation (e.g. `"read"`, `"rename"`).
        op: &'static str,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The workspace has uncommitted drift but the operation requires a clean tree.
    #[error("precondition failed: {detail}")]
    PreconditionFailed {
        /// Human-readable description of the unmet precondition.
        detail: String,
    },
}

impl Error {
    /// Build an [`Error::Io`] from a path, operation label, and source error.
    pub fn io(path: impl Into<PathBuf>, op: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            op,
            source,
        }
    }

    /// Build an [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Build an [`Error::Corrupt`].
    pub fn corrupt(what: impl Into<String>, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            what: what.into(),
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Build an [`Error::Conflict`].
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Conflict { detail: detail.into() }
    }

    /// Build an [`Error::PreconditionFailed`].
    pub fn precondition(detail: impl Into<String>) -> Self {
        Self::PreconditionFailed { detail: detail.into() }
    }
}

/// Convenience result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let e = Error::not_found("snapshot snap-abc");
        assert!(e.to_string().contains("snap-abc"));
    }

    #[test]
    fn display_io_includes_path_and_op() {
        let e = Error::io(
            "/tmp/x",
            "rename",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        let msg = e.to_string();
        assert!(msg.contains("/tmp/x"));
        assert!(msg.contains("rename"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn ambiguous_lists_matches() {
        let e = Error::Ambiguous {
            prefix: "snap-ab".into(),
            matches: vec!["snap-ab12".into(), "snap-ab99".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("snap-ab12"));
        assert!(msg.contains("snap-ab99"));
    }
}
