// src/sync/filter.rs

//! Size and extension limits applied to a file right before it is uploaded.
//!
//! Exclusion globs decide what the watcher reports at all; this filter only
//! decides whether an existing regular file is worth sending. Filtered files
//! are skipped, never deleted remotely.

use std::path::Path;

use crate::errors::{Result, SyncError};
use crate::types::{Metadata, meta};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub const DEFAULT_BLOCKED_EXTENSIONS: [&str; 5] = [".exe", ".dll", ".so", ".dylib", ".bin"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFilter {
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// Files smaller than this many bytes are skipped.
    pub min_file_size: u64,
    /// Lowercased, dot-prefixed extensions that are never uploaded.
    pub blocked_extensions: Vec<String>,
    /// When non-empty, only these extensions are uploaded.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_FILE_SIZE,
            0,
            DEFAULT_BLOCKED_EXTENSIONS.iter().copied(),
            std::iter::empty::<&str>(),
        )
    }
}

impl UploadFilter {
    /// Extensions may be given with or without the leading dot, in any case.
    pub fn new<B, A>(max_file_size: u64, min_file_size: u64, blocked: B, allowed: A) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            max_file_size,
            min_file_size,
            blocked_extensions: normalize_extensions(blocked),
            allowed_extensions: normalize_extensions(allowed),
        }
    }

    /// This filter with a target's `maxFileSize` and `allowedExtensions`
    /// metadata applied on top.
    pub fn for_target(&self, target_id: &str, metadata: &Metadata) -> Result<UploadFilter> {
        let mut filter = self.clone();

        if let Some(value) = metadata.get(meta::MAX_FILE_SIZE) {
            let parsed = match value {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            filter.max_file_size = parsed.filter(|&n| n > 0).ok_or_else(|| {
                SyncError::Config(format!(
                    "target {target_id}: {} must be a positive byte count (got {value})",
                    meta::MAX_FILE_SIZE
                ))
            })?;
        }

        if let Some(value) = metadata.get(meta::ALLOWED_EXTENSIONS) {
            filter.allowed_extensions = match value {
                serde_json::Value::String(csv) => normalize_extensions(csv.split(',')),
                serde_json::Value::Array(items) => {
                    normalize_extensions(items.iter().filter_map(|v| v.as_str()))
                }
                other => {
                    return Err(SyncError::Config(format!(
                        "target {target_id}: {} must be a list or a comma-separated string (got {other})",
                        meta::ALLOWED_EXTENSIONS
                    )));
                }
            };
        }

        Ok(filter)
    }

    /// Why `path` (of `size` bytes) must not be uploaded, or `None` if it may.
    pub fn check(&self, path: &Path, size: u64) -> Option<String> {
        if size > self.max_file_size {
            return Some(format!(
                "file too large ({} > {})",
                format_size(size),
                format_size(self.max_file_size)
            ));
        }
        if size < self.min_file_size {
            return Some(format!(
                "file too small ({} < {})",
                format_size(size),
                format_size(self.min_file_size)
            ));
        }
        let ext = extension_of(path);
        if self.blocked_extensions.contains(&ext) {
            return Some(format!("blocked file type: {ext}"));
        }
        if !self.allowed_extensions.is_empty() && !self.allowed_extensions.contains(&ext) {
            return Some(format!("file type not in allowed list: {ext:?}"));
        }
        None
    }
}

/// Lowercased extension with its dot, or `""` for none.
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn normalize_extensions<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .map(|item| {
            if item.starts_with('.') {
                item
            } else {
                format!(".{item}")
            }
        })
        .collect()
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        let rounded = (value * 100.0).round() / 100.0;
        format!("{rounded} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_block_native_binaries_and_huge_files() {
        let f = UploadFilter::default();
        assert_eq!(f.check(Path::new("/w/notes.md"), 10), None);
        assert_eq!(
            f.check(Path::new("/w/tool.EXE"), 10).as_deref(),
            Some("blocked file type: .exe")
        );
        assert_eq!(
            f.check(Path::new("/w/big.md"), DEFAULT_MAX_FILE_SIZE + 1).as_deref(),
            Some("file too large (50 MB > 50 MB)")
        );
        assert_eq!(f.check(Path::new("/w/exact.md"), DEFAULT_MAX_FILE_SIZE), None);
        assert_eq!(f.check(Path::new("/w/empty.md"), 0), None);
    }

    #[test]
    fn allow_list_admits_only_listed_extensions() {
        let f = UploadFilter::new(100, 1, ["exe"], ["MD", ".txt", " "]);
        assert_eq!(f.allowed_extensions, vec![".md", ".txt"]);
        assert_eq!(f.check(Path::new("/w/a.md"), 5), None);
        assert!(f.check(Path::new("/w/a.rs"), 5).unwrap().contains("not in allowed list"));
        assert!(f.check(Path::new("/w/Makefile"), 5).is_some());
        assert_eq!(f.check(Path::new("/w/a.md"), 0).as_deref(), Some("file too small (0 B < 1 B)"));
    }

    #[test]
    fn target_metadata_overrides_size_and_allow_list() {
        let base = UploadFilter::default();
        let mut metadata = Metadata::new();
        metadata.insert(meta::MAX_FILE_SIZE.into(), json!(1024));
        metadata.insert(meta::ALLOWED_EXTENSIONS.into(), json!("rs, toml"));

        let f = base.for_target("t", &metadata).unwrap();
        assert_eq!(f.max_file_size, 1024);
        assert_eq!(f.allowed_extensions, vec![".rs", ".toml"]);
        assert_eq!(f.blocked_extensions, base.blocked_extensions);

        metadata.insert(meta::MAX_FILE_SIZE.into(), json!("2048"));
        assert_eq!(base.for_target("t", &metadata).unwrap().max_file_size, 2048);
    }

    #[test]
    fn malformed_overrides_are_config_errors() {
        let base = UploadFilter::default();
        for (key, value) in [
            (meta::MAX_FILE_SIZE, json!(-5)),
            (meta::MAX_FILE_SIZE, json!("lots")),
            (meta::ALLOWED_EXTENSIONS, json!(3)),
        ] {
            let mut metadata = Metadata::new();
            metadata.insert(key.into(), value);
            assert!(matches!(base.for_target("t", &metadata), Err(SyncError::Config(_))));
        }
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3 MB");
    }
}
