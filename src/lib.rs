// src/lib.rs

pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod registry;
pub mod remote;
pub mod retry;
pub mod sync;
pub mod types;
pub mod watch;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate, load_targets, resolve_targets_path};
use crate::engine::PriorityChangeQueue;
use crate::fs::{FileSystem, RealFileSystem};
use crate::registry::WatchTargetRegistry;
use crate::remote::{HttpContentApi, RemoteSyncClient};
use crate::sync::MirrorConsumer;
use crate::types::{WatchTarget, meta, metadata_str};

/// How often suspended targets trigger a credential re-check.
const REVALIDATE_INTERVAL: Duration = Duration::from_secs(300);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and targets loading
/// - remote clients (one per repository in use)
/// - the priority queue and the mirror consumer
/// - the watch target registry
/// - Ctrl-C handling and graceful shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let targets_path = match &args.targets {
        Some(path) => PathBuf::from(path),
        None => resolve_targets_path(&config_path, &cfg.sync.targets_file),
    };
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let targets = load_targets(fs.as_ref(), &targets_path)?;

    if args.dry_run {
        print_dry_run(&cfg, &targets_path, &targets);
        return Ok(());
    }

    let token = cfg.resolve_token()?;
    let api = HttpContentApi::new(cfg.endpoint(token))?;
    let client = RemoteSyncClient::new(
        Arc::new(api.clone()),
        Arc::clone(&fs),
        cfg.retry_policy(),
        cfg.username(),
    );

    if args.check {
        return run_check(&client).await;
    }

    if cfg.sync.validate_credentials && !client.validate_credentials().await {
        return Err(anyhow!(
            "credential validation failed for user {:?}; fix [remote] credentials or set [sync].validate_credentials = false",
            cfg.username()
        ));
    }

    let mut consumer = MirrorConsumer::new(client.clone(), Arc::clone(&fs))
        .with_default_message(cfg.sync.commit_message.clone())
        .with_upload_filter(cfg.upload_filter());
    for repo in repos_in_use(&targets) {
        debug!(repo = %repo, "creating client for repository");
        let repo_client = RemoteSyncClient::new(
            Arc::new(api.for_repo(&repo)),
            Arc::clone(&fs),
            cfg.retry_policy(),
            cfg.username(),
        );
        consumer = consumer.with_repo_client(repo, repo_client);
    }
    let consumer = Arc::new(consumer);

    let queue = PriorityChangeQueue::new(cfg.reschedule_delay());
    queue.on_batch_processed(consumer.clone());

    let mut registry = WatchTargetRegistry::new(queue.clone(), cfg.watch_settings());
    for target in targets {
        let id = target.id.clone();
        if let Err(err) = registry.add_target(target) {
            warn!(target_id = %id, error = %err, "target not started");
        }
    }
    info!(
        targets = registry.len(),
        repo = %format!("{}/{}", cfg.remote.owner, cfg.remote.repo),
        "watchsync running; press Ctrl-C to stop"
    );

    let revalidate = tokio::spawn(revalidate_suspended(client, Arc::clone(&consumer)));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    revalidate.abort();
    registry.stop_all();
    match tokio::time::timeout(cfg.shutdown_grace(), queue.wait_until_idle()).await {
        Ok(()) => info!("queue drained; exiting"),
        Err(_) => warn!(
            pending = queue.pending_len(),
            "shutdown grace period elapsed with batches still queued"
        ),
    }
    Ok(())
}

/// Distinct `repo` metadata values across targets.
fn repos_in_use(targets: &[WatchTarget]) -> BTreeSet<String> {
    targets
        .iter()
        .filter_map(|t| metadata_str(&t.metadata, meta::REPO))
        .map(str::to_string)
        .collect()
}

/// Periodically re-check credentials while any target is suspended, and
/// resume them once the check passes.
async fn revalidate_suspended(client: RemoteSyncClient, consumer: Arc<MirrorConsumer>) {
    loop {
        tokio::time::sleep(REVALIDATE_INTERVAL).await;
        if !consumer.has_suspended() {
            continue;
        }
        if client.validate_credentials().await {
            info!("credentials valid again; resuming suspended targets");
            consumer.resume_all();
        }
    }
}

async fn run_check(client: &RemoteSyncClient) -> Result<()> {
    if !client.validate_credentials().await {
        println!("credentials: INVALID");
        return Err(anyhow!("credential validation failed"));
    }
    println!("credentials: ok");
    let head = client.head_commit().await?;
    println!("branch head: {head}");
    Ok(())
}

/// Simple dry-run output: print remote, timings and targets.
fn print_dry_run(cfg: &ConfigFile, targets_path: &Path, targets: &[WatchTarget]) {
    println!("watchsync dry-run");
    println!(
        "  remote = {}/{} (branch {}) via {}",
        cfg.remote.owner, cfg.remote.repo, cfg.remote.branch, cfg.remote.api_base
    );
    println!("  user = {}", cfg.username());
    println!(
        "  watch.debounce_ms = {}, settle_ms = {}",
        cfg.watch.debounce_ms, cfg.watch.settle_ms
    );
    println!(
        "  retry = {} retries, {}ms..{}ms x{}",
        cfg.retry.max_retries, cfg.retry.base_delay_ms, cfg.retry.max_delay_ms, cfg.retry.backoff_factor
    );
    println!();

    println!("targets ({}) from {}:", targets.len(), targets_path.display());
    for target in targets {
        println!("  - {} [{}]", target.id, target.priority);
        println!("      path: {}", target.root_path.display());
        if !target.root_path.exists() {
            println!("      (path does not exist; target will not start)");
        }
        if !target.ignore_patterns.is_empty() {
            println!("      ignore: {:?}", target.ignore_patterns);
        }
        for (key, value) in &target.metadata {
            println!("      {key}: {value}");
        }
    }

    debug!("dry-run complete (no watching)");
}
