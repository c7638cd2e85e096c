// tests/config_loading.rs

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use watchsync::config::{load_and_validate, load_targets, resolve_targets_path};
use watchsync::errors::SyncError;
use watchsync::fs::RealFileSystem;
use watchsync::fs::mock::MockFileSystem;
use watchsync::types::{Priority, meta, metadata_str};

fn write_toml(src: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{src}").unwrap();
    file
}

#[test]
fn full_config_round_trips_into_runtime_settings() {
    let file = write_toml(
        r#"
[remote]
owner = "octo"
repo = "backup"
branch = "trunk"
username = "octo-bot"
token = "ghp_inline"
timeout_secs = 5

[watch]
debounce_ms = 750
settle_ms = 100
poll_interval_ms = 0

[retry]
max_retries = 5
base_delay_ms = 250
max_delay_ms = 4000
backoff_factor = 1.5

[sync]
targets_file = "targets.json"
commit_message = "sync {target}"
reschedule_ms = 50
shutdown_grace_secs = 3
max_file_size = 1048576
blocked_extensions = ["EXE", ".iso"]
allowed_extensions = ["md"]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.username(), "octo-bot");
    assert_eq!(cfg.watch_settings().debounce, Duration::from_millis(750));
    assert!(cfg.watch_settings().poll_interval.is_zero());
    let retry = cfg.retry_policy();
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.delay_for(1), Duration::from_millis(375));
    assert_eq!(cfg.reschedule_delay(), Duration::from_millis(50));
    assert_eq!(cfg.shutdown_grace(), Duration::from_secs(3));
    let filter = cfg.upload_filter();
    assert_eq!(filter.max_file_size, 1024 * 1024);
    assert_eq!(filter.min_file_size, 0);
    assert_eq!(filter.blocked_extensions, vec![".exe", ".iso"]);
    assert_eq!(filter.allowed_extensions, vec![".md"]);

    let endpoint = cfg.endpoint(cfg.resolve_token().unwrap());
    assert_eq!(endpoint.branch, "trunk");
    assert_eq!(endpoint.timeout, Duration::from_secs(5));
    assert!(!format!("{endpoint:?}").contains("ghp_inline"));
    assert!(!format!("{cfg:?}").contains("ghp_inline"));
}

#[test]
fn invalid_values_return_config_errors() {
    let cases = [
        "[remote]\nowner = \"o\"\n",
        "[remote]\nowner = \"o\"\nrepo = \"r\"\n[watch]\ndebounce_ms = 0\n",
        "[remote]\nowner = \"o\"\nrepo = \"r\"\n[retry]\nbackoff_factor = 0.9\n",
        "[remote]\nowner = \"o\"\nrepo = \"r\"\n[sync]\nmin_file_size = 100\nmax_file_size = 10\n",
    ];
    for src in cases {
        let file = write_toml(src);
        match load_and_validate(file.path()) {
            Err(SyncError::Config(_)) => {}
            other => panic!("expected config error for {src:?}, got {other:?}"),
        }
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_toml("[remote\nowner = ");
    assert!(matches!(load_and_validate(file.path()), Err(SyncError::Toml(_))));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Watchsync.toml").unwrap_err();
    assert!(matches!(err, SyncError::Io(_)));
}

#[test]
fn targets_file_loads_records_with_aliases() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
  {{"id": "a", "path": "/srv/a", "priority": "high", "ignoredPatterns": "dist, *.bak",
    "targetRepo": "a-backup", "commitMessage": "Backup {{target}}"}},
  {{"rootPath": "/srv/b", "status": "inactive"}},
  {{"rootPath": "/srv/c", "pathPrefix": "c", "metadata": {{"owner": "ops"}}}}
]"#
    )
    .unwrap();

    let targets = load_targets(&RealFileSystem, file.path()).unwrap();

    assert_eq!(targets.len(), 2);
    let a = &targets[0];
    assert_eq!(a.id, "a");
    assert_eq!(a.priority, Priority::High);
    assert_eq!(a.ignore_patterns, vec!["dist".to_string(), "*.bak".to_string()]);
    assert_eq!(metadata_str(&a.metadata, meta::REPO), Some("a-backup"));
    assert_eq!(metadata_str(&a.metadata, meta::COMMIT_MESSAGE), Some("Backup {target}"));

    let c = &targets[1];
    assert!(!c.id.is_empty());
    assert_eq!(c.priority, Priority::Medium);
    assert_eq!(c.ignore_patterns, vec!["node_modules", ".git", "*.tmp"]);
    assert_eq!(metadata_str(&c.metadata, meta::PATH_PREFIX), Some("c"));
    assert_eq!(metadata_str(&c.metadata, "owner"), Some("ops"));
}

#[test]
fn missing_targets_file_means_no_targets() {
    let fs = MockFileSystem::new();
    let targets = load_targets(&fs, Path::new("/nowhere/projects.json")).unwrap();
    assert!(targets.is_empty());
}

#[test]
fn malformed_targets_file_is_rejected() {
    let fs = MockFileSystem::new();
    fs.add_file("/cfg/projects.json", "{ not json");
    let err = load_targets(&fs, Path::new("/cfg/projects.json")).unwrap_err();
    assert!(matches!(err, SyncError::Json(_)));
}

#[test]
fn targets_path_follows_the_config_file() {
    let cfg = Path::new("/etc/watchsync/Watchsync.toml");
    assert_eq!(
        resolve_targets_path(cfg, "projects.json"),
        Path::new("/etc/watchsync/projects.json")
    );
}
