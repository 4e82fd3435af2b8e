//! Scanner: walks a directory producing an ordered [`Manifest`],
//! consulting a stat cache to avoid re-hashing unchanged files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashio::hash_file;
use crate::ignore::IgnoreMatcher;
use crate::manifest::{Entry, Manifest};

/// One cached stat record, keyed by manifest path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_nanos: i128,
    /// File size in bytes.
    pub size: u64,
    /// POSIX mode bits observed at cache time.
    pub mode: u32,
    /// Cached content hash.
    pub hash: String,
}

/// `path → stat` acceleration structure persisted at
/// `<workspace>/.fst/stat_cache.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl StatCache {
    /// An empty cache.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a cache from disk. A missing or corrupt file is treated as an
    /// empty cache — the scanner must never fail because of a stale or
    /// absent stat cache.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persist the cache atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| Error::corrupt("stat cache", path, e.to_string()))?;
        crate::hashio::write_atomic(path, &bytes, false)
    }

    fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    fn insert(&mut self, path: String, entry: CacheEntry) {
        self.entries.insert(path, entry);
    }
}

/// Walk `root`, consulting `ignore` and an optional `cache`, producing a
/// canonical [`Manifest`] and the updated cache reflecting what was
/// observed during this scan.
///
/// Directory entries are visited in byte-sorted order at every level so
/// that output is stable across platforms.
#[tracing::instrument(skip(ignore, cache), fields(root = %root.display()))]
pub fn scan(root: &Path, ignore: &IgnoreMatcher, cache: &StatCache) -> Result<(Manifest, StatCache)> {
    let mut entries = Vec::new();
    let mut new_cache = StatCache::default();
    walk(root, root, ignore, cache, &mut new_cache, &mut entries)?;
    let manifest = Manifest::new(entries)?;
    tracing::debug!(files = manifest.file_count(), hash = %manifest.hash(), "scan complete");
    Ok((manifest, new_cache))
}

fn walk(
    root: &Path,
    dir: &Path,
    ignore: &IgnoreMatcher,
    cache: &StatCache,
    new_cache: &mut StatCache,
    out: &mut Vec<Entry>,
) -> Result<()> {
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::io(dir, "read_dir", e))?
        .map(|r| r.map(|e| e.path()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::io(dir, "read_dir entry", e))?;
    names.sort();

    for path in names {
        let rel = relative_posix_path(root, &path)?;
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name.is_empty() {
            return Err(Error::conflict(format!(
                "invalid UTF-8 path component at {}",
                path.display()
            )));
        }

        let metadata = fs::symlink_metadata(&path).map_err(|e| Error::io(&path, "lstat", e))?;
        let is_dir = metadata.is_dir();
        if ignore.is_ignored(&rel, is_dir) {
            continue;
        }

        if is_dir {
            walk(root, &path, ignore, cache, new_cache, out)?;
        } else if metadata.file_type().is_symlink() {
            let target = fs::read_link(&path)
                .map_err(|e| Error::io(&path, "read_link", e))?
                .to_string_lossy()
                .into_owned();
            out.push(Entry::Symlink {
                path: rel,
                mode: mode_bits(&metadata),
                target,
            });
        } else {
            let mode = mode_bits(&metadata);
            let size = metadata.len();
            let mtime_nanos = mtime_nanos(&metadata);
            let hash = match cache.get(&rel) {
                Some(cached)
                    if cached.mtime_nanos == mtime_nanos
                        && cached.size == size
                        && cached.mode == mode =>
                {
                    cached.hash.clone()
                }
                _ => hash_file(&path)?,
            };
            new_cache.insert(
                rel.clone(),
                CacheEntry {
                    mtime_nanos,
                    size,
                    mode,
                    hash: hash.clone(),
                },
            );
            out.push(Entry::File {
                path: rel,
                mode,
                size,
                hash,
            });
        }
    }
    Ok(())
}

#[cfg(unix)]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn mtime_nanos(metadata: &fs::Metadata) -> i128 {
    use std::os::unix::fs::MetadataExt;
    i128::from(metadata.mtime()) * 1_000_000_000 + i128::from(metadata.mtime_nsec())
}

#[cfg(not(unix))]
fn mtime_nanos(metadata: &fs::Metadata) -> i128 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

fn relative_posix_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        Error::conflict(format!(
            "{} is not under scan root {}",
            path.display(),
            root.display()
        ))
    })?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            std::path::Component::Normal(os) => {
                let s = os.to_str().ok_or_else(|| {
                    Error::conflict(format!("invalid UTF-8 in path {}", path.display()))
                })?;
                parts.push(s.to_string());
            }
            std::path::Component::CurDir => {}
            _ => {
                return Err(Error::conflict(format!(
                    "path escapes scan root: {}",
                    path.display()
                )))
            }
        }
    }
    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::conflict(format!(
            "empty path component in {}",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_sorted_and_hashes_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"B").unwrap();
        fs::write(dir.path().join("a.txt"), b"A").unwrap();
        let (manifest, _cache) =
            scan(dir.path(), &IgnoreMatcher::default(), &StatCache::empty()).unwrap();
        let paths: Vec<&str> = manifest.files.iter().map(Entry::path).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn scan_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/x.txt"), b"hello\n").unwrap();
        let (m1, _) = scan(dir.path(), &IgnoreMatcher::default(), &StatCache::empty()).unwrap();
        let (m2, _) = scan(dir.path(), &IgnoreMatcher::default(), &StatCache::empty()).unwrap();
        assert_eq!(m1.hash(), m2.hash());
    }

    #[test]
    fn stat_cache_short_circuits_rehash() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello\n").unwrap();
        let (manifest, cache) =
            scan(dir.path(), &IgnoreMatcher::default(), &StatCache::empty()).unwrap();
        // Corrupt the cached hash directly; if the cache is trusted based
        // on mtime/size/mode, the corrupted hash is what gets reused.
        let mut tampered = cache.clone();
        tampered
            .entries
            .get_mut("a.txt")
            .unwrap()
            .hash = "deadbeef".repeat(8);
        let (manifest2, _) =
            scan(dir.path(), &IgnoreMatcher::default(), &tampered).unwrap();
        assert_ne!(manifest.hash(), manifest2.hash());
    }

    #[test]
    fn ignored_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), b"k").unwrap();
        fs::write(dir.path().join("skip.log"), b"s").unwrap();
        let ignore = IgnoreMatcher::parse("*.log\n");
        let (manifest, _) = scan(dir.path(), &ignore, &StatCache::empty()).unwrap();
        let paths: Vec<&str> = manifest.files.iter().map(Entry::path).collect();
        assert_eq!(paths, vec!["keep.txt"]);
    }

    #[test]
    fn empty_file_hashes_to_empty_string_hash() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let (manifest, _) = scan(dir.path(), &IgnoreMatcher::default(), &StatCache::empty()).unwrap();
        match &manifest.files[0] {
            Entry::File { hash, .. } => assert_eq!(hash, crate::hashio::EMPTY_HASH),
            Entry::Symlink { .. } => panic!("expected file"),
        }
    }
}
