//! Ignore matcher: a hand-rolled gitignore-style subset matcher,
//! loaded from `.fstignore`, with `.fst/` always ignored.
//!
//! The grammar deliberately implements only a common subset of gitignore
//! syntax (blank lines, `#` comments, leading `!` negation, trailing `/`
//! directory-only, `*`/`?`/`**` glob segments). A third-party gitignore
//! crate is not warranted for this small grammar.

use crate::error::Result;

/// One parsed `.fstignore` rule.
#[derive(Debug, Clone)]
struct Rule {
    negated: bool,
    dir_only: bool,
    /// Pattern anchored to the root if it contains an internal `/`.
    anchored: bool,
    segments: Vec<String>,
}

/// A compiled set of ignore rules for one project/workspace root.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    /// Build a matcher from `.fstignore` file contents (empty string if the
    /// file does not exist). `.fst/` is always ignored regardless of rules.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut rules = Vec::new();
        for line in contents.lines() {
            if let Some(rule) = parse_line(line) {
                rules.push(rule);
            }
        }
        Self { rules }
    }

    /// Load a matcher from the `.fstignore` file at `project_root`, or an
    /// empty matcher if the file is absent. Never fails on a missing file.
    pub fn load(project_root: &std::path::Path) -> Result<Self> {
        let path = project_root.join(".fstignore");
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(crate::error::Error::io(path, "read", e)),
        }
    }

    /// Returns true if `path` (POSIX-style, relative to the scan root)
    /// should be skipped. `is_dir` affects directory-only (`trailing /`)
    /// rules.
    #[must_use]
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        if path == ".fst" || path.starts_with(".fst/") {
            return true;
        }
        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir && !rule_matches_any_prefix(rule, path) {
                continue;
            }
            if rule_matches(rule, path, is_dir) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

fn parse_line(raw: &str) -> Option<Rule> {
    let line = raw.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut pattern = line;
    let negated = if let Some(rest) = pattern.strip_prefix('!') {
        pattern = rest;
        true
    } else {
        false
    };
    let dir_only = pattern.ends_with('/');
    if dir_only {
        pattern = &pattern[..pattern.len() - 1];
    }
    if pattern.is_empty() {
        return None;
    }
    let anchored = pattern.contains('/');
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    let segments = pattern.split('/').map(str::to_owned).collect();
    Some(Rule {
        negated,
        dir_only,
        anchored,
        segments,
    })
}

/// True if a directory-only rule matches any ancestor prefix of `path`,
/// so that files under an ignored directory are pruned even though the
/// rule only named the directory itself.
fn rule_matches_any_prefix(rule: &Rule, path: &str) -> bool {
    let parts: Vec<&str> = path.split('/').collect();
    for end in 1..parts.len() {
        let prefix = parts[..end].join("/");
        if rule_matches(rule, &prefix, true) {
            return true;
        }
    }
    false
}

fn rule_matches(rule: &Rule, path: &str, is_dir: bool) -> bool {
    if rule.dir_only && !is_dir && !rule_matches_any_prefix(rule, path) {
        return false;
    }
    let path_segments: Vec<&str> = path.split('/').collect();
    if rule.anchored {
        glob_match_segments(&rule.segments, &path_segments)
    } else {
        // Unanchored: the pattern may match starting at any suffix of path.
        (0..path_segments.len()).any(|start| {
            glob_match_segments(&rule.segments, &path_segments[start..])
        })
    }
}

/// Match pattern segments (which may contain a `**` segment) against path
/// segments.
fn glob_match_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((seg, rest)) if seg == "**" => {
            if rest.is_empty() {
                return true;
            }
            (0..=path.len()).any(|i| glob_match_segments(rest, &path[i..]))
        }
        Some((seg, rest)) => match path.split_first() {
            Some((head, tail)) if glob_match_segment(seg, head) => {
                glob_match_segments(rest, tail)
            }
            _ => false,
        },
    }
}

/// Match one glob segment (`*`, `?`, literal chars) against one path
/// segment.
fn glob_match_segment(pattern: &str, text: &str) -> bool {
    fn inner(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) => (0..=t.len()).any(|i| inner(rest, &t[i..])),
            Some(('?', rest)) => !t.is_empty() && inner(rest, &t[1..]),
            Some((c, rest)) => t.first() == Some(c) && inner(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    inner(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fst_dir_always_ignored() {
        let m = IgnoreMatcher::parse("");
        assert!(m.is_ignored(".fst", true));
        assert!(m.is_ignored(".fst/blobs/abc", false));
    }

    #[test]
    fn simple_literal_and_negation() {
        let m = IgnoreMatcher::parse("*.log\n!keep.log\n");
        assert!(m.is_ignored("a.log", false));
        assert!(!m.is_ignored("keep.log", false));
        assert!(!m.is_ignored("a.txt", false));
    }

    #[test]
    fn directory_only_rule_prunes_children() {
        let m = IgnoreMatcher::parse("target/\n");
        assert!(m.is_ignored("target", true));
        assert!(m.is_ignored("target/debug/build", false));
        assert!(!m.is_ignored("targets", true));
    }

    #[test]
    fn anchored_vs_unanchored() {
        let m = IgnoreMatcher::parse("/root-only.txt\nnested.txt\n");
        assert!(m.is_ignored("root-only.txt", false));
        assert!(!m.is_ignored("sub/root-only.txt", false));
        assert!(m.is_ignored("nested.txt", false));
        assert!(m.is_ignored("sub/nested.txt", false));
    }

    #[test]
    fn double_star_matches_any_depth() {
        let m = IgnoreMatcher::parse("**/node_modules\n");
        assert!(m.is_ignored("node_modules", true));
        assert!(m.is_ignored("a/b/node_modules", true));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let m = IgnoreMatcher::parse("# comment\n\n*.tmp\n");
        assert!(m.is_ignored("x.tmp", false));
        assert!(!m.is_ignored("# comment", false));
    }
}
