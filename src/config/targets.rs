// src/config/targets.rs

//! Watch targets persisted as a JSON array.
//!
//! The file is owned by whatever manages targets; this side only reads it at
//! startup. Records look like:
//!
//! ```json
//! [
//!   {
//!     "id": "docs",
//!     "name": "Docs",
//!     "path": "/home/u/docs",
//!     "ignoredPatterns": "node_modules,.git,*.tmp",
//!     "priority": "high",
//!     "commitMessage": "Backup {target}",
//!     "targetRepo": "docs-backup",
//!     "maxFileSize": 10485760,
//!     "allowedExtensions": "md,txt",
//!     "status": "active"
//!   }
//! ]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::{Result, SyncError};
use crate::fs::FileSystem;
use crate::types::{Metadata, Priority, TargetStatus, WatchTarget, generate_target_id, meta};
use crate::watch::DEFAULT_IGNORE_PATTERNS;

/// Either a JSON list or a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PatternList {
    List(Vec<String>),
    Csv(String),
}

impl PatternList {
    fn into_patterns(self) -> Vec<String> {
        let raw = match self {
            PatternList::List(list) => list,
            PatternList::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "path")]
    root_path: PathBuf,
    #[serde(default, alias = "ignoredPatterns")]
    ignore_patterns: Option<PatternList>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    commit_message: Option<String>,
    #[serde(default, alias = "targetRepo")]
    repo: Option<String>,
    #[serde(default)]
    path_prefix: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    max_file_size: Option<serde_json::Value>,
    #[serde(default)]
    allowed_extensions: Option<PatternList>,
    #[serde(default)]
    status: TargetStatus,
}

impl TargetRecord {
    fn into_target(self) -> WatchTarget {
        let mut metadata = self.metadata;
        let folded = [
            (meta::NAME, self.name),
            (meta::COMMIT_MESSAGE, self.commit_message),
            (meta::REPO, self.repo),
            (meta::PATH_PREFIX, self.path_prefix),
            (meta::GROUP_ID, self.group_id),
        ];
        for (key, value) in folded {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                metadata.insert(key.to_string(), serde_json::Value::String(value));
            }
        }
        if let Some(limit) = self.max_file_size {
            metadata.insert(meta::MAX_FILE_SIZE.to_string(), limit);
        }
        if let Some(list) = self.allowed_extensions {
            let exts = list.into_patterns();
            if !exts.is_empty() {
                metadata.insert(meta::ALLOWED_EXTENSIONS.to_string(), serde_json::json!(exts));
            }
        }

        let ignore_patterns = match self.ignore_patterns {
            Some(list) => list.into_patterns(),
            None => DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        };

        WatchTarget {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(generate_target_id),
            root_path: self.root_path,
            ignore_patterns,
            priority: self.priority.unwrap_or_default(),
            metadata,
        }
    }
}

/// Parse a targets document, keeping only active records.
pub fn parse_targets(json: &str) -> Result<Vec<WatchTarget>> {
    let records: Vec<TargetRecord> = serde_json::from_str(json)?;
    let total = records.len();
    let targets: Vec<WatchTarget> = records
        .into_iter()
        .filter(|r| r.status == TargetStatus::Active)
        .map(TargetRecord::into_target)
        .collect();
    if targets.len() < total {
        info!(
            active = targets.len(),
            inactive = total - targets.len(),
            "skipping inactive targets"
        );
    }
    Ok(targets)
}

/// Load targets from `path`. A missing file yields no targets.
pub fn load_targets(fs: &dyn FileSystem, path: &Path) -> Result<Vec<WatchTarget>> {
    if !fs.exists(path) {
        warn!(path = %path.display(), "targets file not found; starting with no targets");
        return Ok(Vec::new());
    }
    let contents = fs
        .read_to_string(path)
        .map_err(|e| SyncError::Config(format!("reading targets file {}: {e:#}", path.display())))?;
    parse_targets(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn records_fold_extras_into_metadata() {
        let targets = parse_targets(
            r#"[{
                "id": "docs",
                "name": "Docs",
                "path": "/home/u/docs",
                "ignoredPatterns": "node_modules, *.tmp ,",
                "priority": "high",
                "commitMessage": "Backup {target}",
                "targetRepo": "docs-backup",
                "metadata": {"owner_note": 1}
            }]"#,
        )
        .unwrap();

        assert_eq!(targets.len(), 1);
        let t = &targets[0];
        assert_eq!(t.id, "docs");
        assert_eq!(t.root_path, PathBuf::from("/home/u/docs"));
        assert_eq!(t.ignore_patterns, vec!["node_modules", "*.tmp"]);
        assert_eq!(t.priority, Priority::High);
        assert_eq!(t.metadata[meta::NAME], "Docs");
        assert_eq!(t.metadata[meta::REPO], "docs-backup");
        assert_eq!(t.metadata[meta::COMMIT_MESSAGE], "Backup {target}");
        assert_eq!(t.metadata["owner_note"], 1);
    }

    #[test]
    fn defaults_apply_to_sparse_records() {
        let targets = parse_targets(r#"[{"rootPath": "/w", "ignorePatterns": ["dist"]}, {"rootPath": "/v"}]"#)
            .unwrap();
        assert_eq!(targets[0].priority, Priority::Medium);
        assert_eq!(targets[0].ignore_patterns, vec!["dist"]);
        assert!(!targets[0].id.is_empty());
        assert_eq!(targets[1].ignore_patterns, vec!["node_modules", ".git", "*.tmp"]);
    }

    #[test]
    fn upload_limits_are_folded_into_metadata() {
        let targets = parse_targets(
            r#"[{"id": "u", "path": "/u", "maxFileSize": 1024, "allowedExtensions": "md, txt"},
                {"id": "v", "path": "/v", "allowedExtensions": [".rs"]}]"#,
        )
        .unwrap();
        assert_eq!(targets[0].metadata[meta::MAX_FILE_SIZE], 1024);
        assert_eq!(targets[0].metadata[meta::ALLOWED_EXTENSIONS], serde_json::json!(["md", "txt"]));
        assert_eq!(targets[1].metadata[meta::ALLOWED_EXTENSIONS], serde_json::json!([".rs"]));
        assert!(!targets[1].metadata.contains_key(meta::MAX_FILE_SIZE));
    }

    #[test]
    fn inactive_records_are_skipped() {
        let targets = parse_targets(
            r#"[{"id": "a", "path": "/a", "status": "inactive"}, {"id": "b", "path": "/b", "status": "active"}]"#,
        )
        .unwrap();
        let ids: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn missing_file_is_empty_and_bad_json_is_an_error() {
        let fs = MockFileSystem::new();
        assert!(load_targets(&fs, Path::new("/cfg/projects.json")).unwrap().is_empty());

        fs.add_file("/cfg/projects.json", "{not json");
        let err = load_targets(&fs, Path::new("/cfg/projects.json")).unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
    }
}
