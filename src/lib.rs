//! fst — a local, content-addressed, project-aware snapshot engine for
//! parallel agent-driven coding workflows.
//!
//! This crate is the storage engine and algorithms only: scanning and
//! manifest construction, content-addressed storage, the snapshot DAG,
//! three-way merge, history rewriting, workspace lifecycle, and garbage
//! collection. CLI parsing, cloud sync, and git import/export glue live
//! outside this crate; the `fst-git` crate implements the git interchange
//! adapter on top of the public API here.

pub mod dag;
pub mod error;
pub mod gc;
pub mod hashio;
pub mod history;
pub mod ignore;
pub mod lock;
pub mod manifest;
pub mod merge;
pub mod project;
pub mod scanner;
pub mod store;
pub mod telemetry;
pub mod workspace;

pub use error::{Error, Result};
