// src/watch/patterns.rs

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{Result, SyncError};

/// Ignore patterns used when a target does not specify any.
pub const DEFAULT_IGNORE_PATTERNS: [&str; 3] = ["node_modules", ".git", "*.tmp"];

/// Compiled exclusion rules for one watch target.
///
/// All rules are evaluated against the root-relative path with forward
/// slashes (`"src/a.js"`), or the basename for a single-file target. A path is
/// excluded when any of these hold:
///
/// - its basename equals a pattern;
/// - a pattern occurs as a substring of the path;
/// - a pattern of the form `*<suffix>` (no further glob syntax) is a suffix of
///   the path;
/// - a pattern with other glob syntax (`src/**/*.bak`) matches the path;
/// - any path segment starts with `.`, except a segment that is exactly `.env`.
#[derive(Clone)]
pub struct PathFilter {
    literals: Vec<String>,
    suffixes: Vec<String>,
    globs: Option<GlobSet>,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("literals", &self.literals)
            .field("suffixes", &self.suffixes)
            .field("has_globs", &self.globs.is_some())
            .finish()
    }
}

fn has_glob_syntax(s: &str) -> bool {
    s.contains(&['*', '?', '[', ']', '{', '}'][..])
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut literals = Vec::new();
        let mut suffixes = Vec::new();
        let mut builder = GlobSetBuilder::new();
        let mut glob_count = 0usize;

        for pat in patterns {
            let pat = pat.as_ref().trim();
            if pat.is_empty() {
                continue;
            }
            match pat.strip_prefix('*') {
                Some(rest) if !rest.is_empty() && !has_glob_syntax(rest) => {
                    suffixes.push(rest.to_string());
                }
                _ if has_glob_syntax(pat) => {
                    let glob = Glob::new(pat)
                        .map_err(|e| SyncError::Config(format!("invalid ignore pattern {pat:?}: {e}")))?;
                    builder.add(glob);
                    glob_count += 1;
                }
                _ => literals.push(pat.to_string()),
            }
        }

        let globs = if glob_count == 0 {
            None
        } else {
            Some(
                builder
                    .build()
                    .map_err(|e| SyncError::Config(format!("building ignore patterns: {e}")))?,
            )
        };

        Ok(Self {
            literals,
            suffixes,
            globs,
        })
    }

    /// Filter with no patterns; only the hidden-segment rule applies.
    pub fn hidden_only() -> Self {
        Self {
            literals: Vec::new(),
            suffixes: Vec::new(),
            globs: None,
        }
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        if rel_path.is_empty() {
            return false;
        }
        if is_hidden(rel_path) {
            return true;
        }

        let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if self
            .literals
            .iter()
            .any(|p| basename == p || rel_path.contains(p.as_str()))
        {
            return true;
        }
        if self.suffixes.iter().any(|s| rel_path.ends_with(s.as_str())) {
            return true;
        }
        self.globs.as_ref().is_some_and(|g| g.is_match(rel_path))
    }
}

fn is_hidden(rel_path: &str) -> bool {
    rel_path
        .split('/')
        .any(|seg| seg.starts_with('.') && seg != ".env" && seg != "." && seg != "..")
}
