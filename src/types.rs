use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque key-value bag attached to a watch target and forwarded unchanged
/// to batch consumers.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Well-known metadata keys understood by the mirror consumer.
pub mod meta {
    /// Repository name overriding `[remote].repo` for this target.
    pub const REPO: &str = "repo";
    /// Commit message template for uploads from this target.
    pub const COMMIT_MESSAGE: &str = "commitMessage";
    /// Prefix prepended to every remote path of this target.
    pub const PATH_PREFIX: &str = "pathPrefix";
    /// Human-readable target name.
    pub const NAME: &str = "name";
    /// Group identifier, carried through for downstream consumers.
    pub const GROUP_ID: &str = "groupId";
    /// Upload size limit in bytes overriding `[sync].max_file_size`.
    pub const MAX_FILE_SIZE: &str = "maxFileSize";
    /// Extension allow-list overriding `[sync].allowed_extensions`.
    pub const ALLOWED_EXTENSIONS: &str = "allowedExtensions";
}

/// Read a string value out of a metadata bag.
pub fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.as_str())
}

/// Scheduling class of a watch target.
///
/// Batches are drained strictly in [`Priority::DRAIN_ORDER`]: all `High`
/// batches of a pass before any `Medium`, all `Medium` before any `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const DRAIN_ORDER: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Index of this priority's bucket in drain order.
    pub(crate) fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!(
                "invalid priority: {other} (expected \"high\", \"medium\" or \"low\")"
            )),
        }
    }
}

/// Status column of a persisted target record. Only `Active` records are
/// started at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Active,
    Inactive,
}

impl Default for TargetStatus {
    fn default() -> Self {
        TargetStatus::Active
    }
}

/// One monitored root plus its sync configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchTarget {
    pub id: String,
    pub root_path: PathBuf,
    pub ignore_patterns: Vec<String>,
    pub priority: Priority,
    pub metadata: Metadata,
}

impl WatchTarget {
    /// Create a target with a generated id.
    pub fn new(root_path: impl Into<PathBuf>, priority: Priority) -> Self {
        Self::with_id(generate_target_id(), root_path, priority)
    }

    pub fn with_id(id: impl Into<String>, root_path: impl Into<PathBuf>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            root_path: root_path.into(),
            ignore_patterns: Vec::new(),
            priority,
            metadata: Metadata::new(),
        }
    }
}

pub fn generate_target_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
