// src/watch/path_utils.rs

//! Utility functions for mapping watched paths to relative and remote paths.

use std::path::{Path, PathBuf};

/// What a watch root turned out to be when its watcher started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// A single file; its parent directory is watched and only events for the
    /// exact path are kept.
    File,
    Directory,
}

/// A resolved watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    pub path: PathBuf,
    pub kind: RootKind,
}

impl WatchRoot {
    /// Path of `file` as seen by exclusion rules and remote mapping:
    /// the basename for a file root, the root-relative path for a directory.
    pub fn relative(&self, file: &Path) -> Option<String> {
        match self.kind {
            RootKind::File => file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            RootKind::Directory => relative_str(&self.path, file).filter(|s| !s.is_empty()),
        }
    }
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again. This fails for paths that no
///   longer exist, so the parent directory is canonicalized as a fallback.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    let path_canon = path.canonicalize().ok().or_else(|| {
        let parent = path.parent()?.canonicalize().ok()?;
        Some(parent.join(path.file_name()?))
    })?;
    path_canon.strip_prefix(&root_canon).ok().map(to_slash)
}

fn to_slash(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Join an optional prefix and a relative path into a remote repo path.
pub fn repo_path(prefix: Option<&str>, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{relative}"),
        None => relative.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_root_maps_to_basename() {
        let root = WatchRoot {
            path: PathBuf::from("/home/u/notes/todo.md"),
            kind: RootKind::File,
        };
        assert_eq!(
            root.relative(Path::new("/home/u/notes/todo.md")).as_deref(),
            Some("todo.md")
        );
    }

    #[test]
    fn directory_root_maps_to_relative_path() {
        let root = WatchRoot {
            path: PathBuf::from("/w"),
            kind: RootKind::Directory,
        };
        assert_eq!(root.relative(Path::new("/w/a.txt")).as_deref(), Some("a.txt"));
        assert_eq!(root.relative(Path::new("/w/sub/b.txt")).as_deref(), Some("sub/b.txt"));
        assert_eq!(root.relative(Path::new("/w")), None);
        assert_eq!(root.relative(Path::new("/elsewhere/c.txt")), None);
    }

    #[test]
    fn repo_path_applies_prefix() {
        assert_eq!(repo_path(None, "a.txt"), "a.txt");
        assert_eq!(repo_path(Some("backup/"), "sub/a.txt"), "backup/sub/a.txt");
        assert_eq!(repo_path(Some(""), "/a.txt"), "a.txt");
    }
}
