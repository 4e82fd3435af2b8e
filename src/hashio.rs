//! Hasher/IO: SHA-256 hashing, atomic file writes, COW clone with
//! copy fallback.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::process::Command;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Lowercase hex SHA-256 of the empty string, used for zero-length files.
pub const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Hash a byte slice, returning lowercase hex.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a file's contents by streaming, without loading it fully in memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, "open", e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::io(path, "read", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Write `bytes` to `path` atomically: write to a sibling temp file, flush
/// and `fsync` best-effort, then `rename` into place. No-op if the target
/// already exists and `skip_if_exists` is set (used for content-addressed
/// writes where identical content is idempotent).
pub fn write_atomic(path: &Path, bytes: &[u8], skip_if_exists: bool) -> Result<()> {
    if skip_if_exists && path.exists() {
        return Ok(());
    }
    let dir = path.parent().ok_or_else(|| {
        Error::io(
            path,
            "resolve parent",
            io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, "create_dir_all", e))?;

    let tmp_path = tmp_sibling_path(path);
    {
        let mut tmp = File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, "create", e))?;
        tmp.write_all(bytes)
            .map_err(|e| Error::io(&tmp_path, "write", e))?;
        // Best-effort durability; ENOTSUP/EINVAL on some filesystems is fine.
        let _ = tmp.sync_all();
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::io(path, "rename", e)
    })?;
    Ok(())
}

fn tmp_sibling_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pid = std::process::id();
    path.with_file_name(format!(".{file_name}.tmp-{pid}"))
}

/// Strategy used by [`clone_tree`] to duplicate a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneBackend {
    /// Attempt OS-level copy-on-write; fall back to a byte copy silently.
    Auto,
    /// Force OS-level copy-on-write; error if unsupported.
    Clone,
    /// Force a byte-for-byte copy, preserving modes and symlinks.
    Copy,
}

/// Duplicate `src` into `dst` (which must not already exist) according to
/// `backend`. `Auto`/`Clone` shell out to `cp --reflink=auto -r`, which both
/// GNU coreutils and macOS `cp` honor; `Clone` additionally asks `cp` to
/// fail rather than silently fall back by passing `--reflink=always`.
pub fn clone_tree(src: &Path, dst: &Path, backend: CloneBackend) -> Result<()> {
    if dst.exists() {
        return Err(Error::conflict(format!(
            "clone destination already exists: {}",
            dst.display()
        )));
    }
    match backend {
        CloneBackend::Copy => copy_tree(src, dst),
        CloneBackend::Auto => match run_cp_reflink(src, dst, "auto") {
            Ok(()) => Ok(()),
            Err(_) => copy_tree(src, dst),
        },
        CloneBackend::Clone => run_cp_reflink(src, dst, "always"),
    }
}

fn run_cp_reflink(src: &Path, dst: &Path, mode: &str) -> Result<()> {
    let status = Command::new("cp")
        .arg(format!("--reflink={mode}"))
        .arg("-r")
        .arg(src)
        .arg(dst)
        .status()
        .map_err(|e| Error::io(src, "spawn cp --reflink", e))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::io(
            src,
            "cp --reflink",
            io::Error::new(io::ErrorKind::Other, format!("cp exited with {status}")),
        ))
    }
}

/// Recursively copy `src` to `dst`, preserving symlinks as symlinks and
/// regular file permission bits.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, "create_dir_all", e))?;
    for entry in fs::read_dir(src).map_err(|e| Error::io(src, "read_dir", e))? {
        let entry = entry.map_err(|e| Error::io(src, "read_dir entry", e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| Error::io(entry.path(), "file_type", e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| Error::io(&from, "read_link", e))?;
            symlink(&target, &to).map_err(|e| Error::io(&to, "symlink", e))?;
        } else {
            fs::copy(&from, &to).map_err(|e| Error::io(&from, "copy", e))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let meta = fs::metadata(&from).map_err(|e| Error::io(&from, "metadata", e))?;
                fs::set_permissions(&to, fs::Permissions::from_mode(meta.permissions().mode()))
                    .map_err(|e| Error::io(&to, "set_permissions", e))?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are only supported on unix",
    ))
}

/// Lowercase hex encoding, following this stack's convention of formatting
/// digests directly rather than pulling in a dedicated hex crate.
mod hex {
    use std::fmt::Write as _;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}
