//! Error type for the git interchange adapter.
//!
//! [`GitInterchangeError`] covers the two operations this crate exposes —
//! exporting a snapshot to a git commit and importing a git commit as a
//! snapshot — plus the underlying `fst-core` errors either can surface.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::export_snapshot`] and [`crate::import_commit`].
#[derive(Debug, Error)]
pub enum GitInterchangeError {
    /// The snapshot, commit, or ref mapping entry requested does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// A commit or tree object could not be read or constructed.
    #[error("git object error at {}: {message}", path.display())]
    ObjectError {
        /// Path to the repository being operated on.
        path: PathBuf,
        /// Details from the underlying `gix` error.
        message: String,
    },

    /// The persistent `snapshot_id ↔ commit_oid` mapping is inconsistent
    /// (e.g. the side-table and the `refs/fst/map/*` ref disagree).
    #[error("inconsistent snapshot/commit mapping: {message}")]
    MappingInconsistent {
        /// Details about the mismatch.
        message: String,
    },

    /// A tree entry could not be represented as an `fst` manifest entry
    /// (e.g. a gitlink/submodule, which this adapter does not support).
    #[error("unsupported git entry at {path}: {reason}")]
    UnsupportedEntry {
        /// Path of the offending tree entry.
        path: String,
        /// Why it could not be imported.
        reason: String,
    },

    /// The underlying core engine returned an error.
    #[error("core engine error: {0}")]
    Core(#[from] fst::Error),

    /// An I/O error occurred reading or writing the interchange repository.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, GitInterchangeError>;
