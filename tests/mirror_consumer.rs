// tests/mirror_consumer.rs

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use watchsync::engine::{BatchConsumer, ChangeBatch};
use watchsync::errors::SyncError;
use watchsync::fs::mock::MockFileSystem;
use watchsync::remote::ApiError;
use watchsync::sync::{DEFAULT_COMMIT_MESSAGE, MirrorConsumer, UploadFilter};
use watchsync::types::{Priority, meta};
use watchsync::watch::{RootKind, WatchRoot};
use watchsync_test_utils::builders::{WatchTargetBuilder, client_with};
use watchsync_test_utils::fake_remote::{ApiCall, CallKind, FakeContentApi};
use watchsync_test_utils::{init_tracing, with_timeout};

fn dir_root(path: &str) -> WatchRoot {
    WatchRoot {
        path: PathBuf::from(path),
        kind: RootKind::Directory,
    }
}

fn consumer(api: &Arc<FakeContentApi>, fs: &MockFileSystem) -> MirrorConsumer {
    init_tracing();
    let client = client_with(api.clone(), Arc::new(fs.clone()), "octo");
    MirrorConsumer::new(client, Arc::new(fs.clone()))
}

#[tokio::test]
async fn uploads_present_files_and_deletes_missing_ones() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/main.rs", "fn main() {}");
    let stale_sha = api.seed("src/old.rs", &BASE64.encode("old"));
    let mirror = consumer(&api, &fs);

    let target = WatchTargetBuilder::new("t1", "/proj").build();
    let batch = ChangeBatch::new(
        &target,
        dir_root("/proj"),
        vec!["/proj/src/main.rs".into(), "/proj/src/old.rs".into()],
    );

    let report = mirror.sync_batch(&batch).await.unwrap();

    assert_eq!(report.success_count, 2);
    assert_eq!(report.fail_count, 0);
    assert_eq!(
        api.writes(),
        vec![
            ApiCall::Put {
                path: "src/main.rs".into(),
                sha: None,
                message: DEFAULT_COMMIT_MESSAGE.into()
            },
            ApiCall::Delete {
                path: "src/old.rs".into(),
                sha: stale_sha,
                message: "Delete src/old.rs".into()
            },
        ]
    );
}

#[tokio::test]
async fn file_root_uses_basename_and_prefix() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/etc/app/settings.json", "{}");
    let mirror = consumer(&api, &fs);

    let target = WatchTargetBuilder::new("cfg", "/etc/app/settings.json")
        .meta(meta::PATH_PREFIX, "/configs/")
        .build();
    let root = WatchRoot {
        path: PathBuf::from("/etc/app/settings.json"),
        kind: RootKind::File,
    };
    let batch = ChangeBatch::new(&target, root, vec!["/etc/app/settings.json".into()]);

    mirror.sync_batch(&batch).await.unwrap();

    assert_eq!(api.paths(), vec!["configs/settings.json".to_string()]);
}

#[tokio::test]
async fn commit_message_template_is_filled_in() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/n/a.md", "a");
    fs.add_file("/n/b.md", "b");
    let mirror = consumer(&api, &fs).with_default_message("unused");

    let target = WatchTargetBuilder::new("notes", "/n")
        .meta(meta::NAME, "Notes")
        .meta(meta::COMMIT_MESSAGE, "{target}: {count} files")
        .build();
    let batch = ChangeBatch::new(&target, dir_root("/n"), vec!["/n/a.md".into(), "/n/b.md".into()]);

    mirror.sync_batch(&batch).await.unwrap();

    for call in api.writes() {
        let ApiCall::Put { message, .. } = call else {
            panic!("unexpected write {call:?}");
        };
        assert_eq!(message, "Notes: 2 files");
    }
}

#[tokio::test]
async fn directories_and_foreign_paths_are_skipped() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_dir("/w/sub");
    let mirror = consumer(&api, &fs);

    let target = WatchTargetBuilder::new("w", "/w").build();
    let batch = ChangeBatch::new(
        &target,
        dir_root("/w"),
        vec!["/w/sub".into(), "/elsewhere/file.txt".into()],
    );

    let report = mirror.sync_batch(&batch).await.unwrap();

    assert_eq!(report.skipped, 2);
    let reasons: Vec<&str> = report.skips.iter().map(|s| s.reason.as_str()).collect();
    assert_eq!(reasons, vec!["not a regular file", "outside the watch root"]);
    assert_eq!(report.success_count + report.fail_count, 0);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn upload_filter_skips_oversized_and_blocked_files() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/w/small.txt", "ok");
    fs.add_file("/w/huge.log", vec![b'x'; 64]);
    fs.add_file("/w/tool.dll", "MZ");
    let remote_sha = api.seed("huge.log", &BASE64.encode("old"));
    let mirror = consumer(&api, &fs).with_upload_filter(UploadFilter::new(
        32,
        0,
        [".exe", ".dll"],
        std::iter::empty::<&str>(),
    ));

    let target = WatchTargetBuilder::new("w", "/w").build();
    let batch = ChangeBatch::new(
        &target,
        dir_root("/w"),
        vec!["/w/small.txt".into(), "/w/huge.log".into(), "/w/tool.dll".into()],
    );
    let report = mirror.sync_batch(&batch).await.unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(report.fail_count, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.skips[0].file, PathBuf::from("/w/huge.log"));
    assert_eq!(report.skips[0].reason, "file too large (64 B > 32 B)");
    assert_eq!(report.skips[1].reason, "blocked file type: .dll");
    // A filtered file is left alone remotely, not deleted.
    assert_eq!(api.sha_of("huge.log"), Some(remote_sha));
    assert_eq!(api.paths(), vec!["huge.log".to_string(), "small.txt".to_string()]);
}

#[tokio::test]
async fn target_metadata_overrides_upload_limits() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/w/readme.md", vec![b'x'; 200]);
    fs.add_file("/w/main.rs", "fn main() {}");
    let mirror = consumer(&api, &fs);

    let target = WatchTargetBuilder::new("w", "/w")
        .meta(meta::MAX_FILE_SIZE, "100")
        .meta(meta::ALLOWED_EXTENSIONS, "md")
        .build();
    let batch = ChangeBatch::new(
        &target,
        dir_root("/w"),
        vec!["/w/readme.md".into(), "/w/main.rs".into()],
    );
    let report = mirror.sync_batch(&batch).await.unwrap();

    assert_eq!(report.skipped, 2);
    assert!(report.skips[0].reason.starts_with("file too large"));
    assert!(report.skips[1].reason.contains("not in allowed list"));
    assert!(api.calls().is_empty());

    let bad = WatchTargetBuilder::new("bad", "/w")
        .meta(meta::MAX_FILE_SIZE, "huge")
        .build();
    let batch = ChangeBatch::new(&bad, dir_root("/w"), vec!["/w/main.rs".into()]);
    assert!(matches!(mirror.sync_batch(&batch).await, Err(SyncError::Config(_))));
}

#[tokio::test]
async fn auth_failure_suspends_the_target_until_resumed() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/w/a.txt", "a");
    let mirror = consumer(&api, &fs);
    let target = WatchTargetBuilder::new("w", "/w").priority(Priority::High).build();
    let batch = ChangeBatch::new(&target, dir_root("/w"), vec!["/w/a.txt".into()]);

    api.fail_next(CallKind::Get, ApiError::status(401, "Bad credentials"));
    let report = mirror.sync_batch(&batch).await.unwrap();
    assert_eq!(report.fail_count, 1);
    assert!(mirror.is_suspended("w"));
    assert!(mirror.has_suspended());

    let calls_before = api.calls().len();
    let skipped = mirror.sync_batch(&batch).await.unwrap();
    assert_eq!(skipped.skipped, 1);
    assert_eq!(skipped.skips[0].reason, "target suspended");
    assert_eq!(api.calls().len(), calls_before);

    assert!(mirror.resume("w"));
    let report = mirror.sync_batch(&batch).await.unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(api.paths(), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn repo_metadata_routes_to_its_own_client() {
    let default_api = FakeContentApi::shared("octo");
    let notes_api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/n/a.md", "a");
    let notes_client = client_with(notes_api.clone(), Arc::new(fs.clone()), "octo");
    let mirror = consumer(&default_api, &fs).with_repo_client("notes", notes_client);

    let routed = WatchTargetBuilder::new("n", "/n").meta(meta::REPO, "notes").build();
    let batch = ChangeBatch::new(&routed, dir_root("/n"), vec!["/n/a.md".into()]);
    mirror.sync_batch(&batch).await.unwrap();

    assert_eq!(notes_api.paths(), vec!["a.md".to_string()]);
    assert!(default_api.paths().is_empty());

    let unknown = WatchTargetBuilder::new("x", "/n").meta(meta::REPO, "missing").build();
    let batch = ChangeBatch::new(&unknown, dir_root("/n"), vec!["/n/a.md".into()]);
    let err = mirror.sync_batch(&batch).await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[tokio::test]
async fn consumer_publishes_reports() {
    let api = FakeContentApi::shared("octo");
    let fs = MockFileSystem::new();
    fs.add_file("/w/ok.txt", "ok");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mirror = consumer(&api, &fs).with_report_sink(tx);

    let target = WatchTargetBuilder::new("w", "/w").build();
    let batch = ChangeBatch::new(
        &target,
        dir_root("/w"),
        vec!["/w/ok.txt".into(), "/w/gone.txt".into()],
    );
    mirror.consume(Arc::new(batch)).await.unwrap();

    let report = with_timeout(rx.recv()).await.unwrap();
    assert_eq!(report.target_id, "w");
    // The missing file is a delete of a path the remote never had: a no-op.
    assert_eq!(report.success_count, 2);
    assert!(report.failures.is_empty());
}
