// src/watch/watcher.rs

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::errors::{Result, SyncError};
use crate::watch::coalesce::Coalescer;
use crate::watch::path_utils::{RootKind, WatchRoot};
use crate::watch::patterns::PathFilter;
use crate::watch::WatchSettings;

/// An installed OS watch plus the identity of the directory it was put on.
struct InstalledWatch {
    _watcher: RecommendedWatcher,
    identity: Option<RootIdentity>,
}

type OsWatcherSlot = Arc<Mutex<Option<InstalledWatch>>>;

/// `(device, inode)` of a directory, so a root that was deleted and
/// re-created under the same path can be told apart from the original.
type RootIdentity = (u64, u64);

#[cfg(unix)]
fn root_identity(path: &Path) -> Option<RootIdentity> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn root_identity(_path: &Path) -> Option<RootIdentity> {
    None
}

/// Handle for one running change watcher.
///
/// Owns the OS-level watch (if installed) and the background tasks that
/// coalesce events and re-check a missing root. [`stop`](Self::stop) and
/// dropping the handle both release everything; pending, unflushed changes
/// are discarded.
pub struct WatcherHandle {
    root: WatchRoot,
    stop_tx: watch::Sender<bool>,
    os_watcher: OsWatcherSlot,
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl WatcherHandle {
    pub fn root(&self) -> &WatchRoot {
        &self.root
    }

    /// Whether the OS-level watch is currently installed.
    pub fn is_watching(&self) -> bool {
        lock(&self.os_watcher).is_some()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Release the OS watch and cancel any pending debounce. Idempotent.
    pub fn stop(&self) {
        if self.stop_tx.send_replace(true) {
            return;
        }
        lock(&self.os_watcher).take();
        info!(root = %self.root.path.display(), "file watcher stopped");
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(slot: &OsWatcherSlot) -> MutexGuard<'_, Option<InstalledWatch>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start watching `root` and call `on_batch` once per debounced batch.
///
/// A root that does not exist yet is not an error: a warning is logged, the
/// root is treated as a directory, and the watch is installed as soon as the
/// path appears. Callback failures and panics are logged and never stop the
/// watcher.
///
/// Must be called from within a tokio runtime.
pub fn start_watcher<F>(
    root: impl Into<PathBuf>,
    filter: PathFilter,
    settings: &WatchSettings,
    on_batch: F,
) -> Result<WatcherHandle>
where
    F: Fn(&WatchRoot, Vec<PathBuf>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let root = resolve_root(root.into());
    let filter = Arc::new(filter);

    let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();
    let (stop_tx, stop_rx) = watch::channel(false);
    let os_watcher: OsWatcherSlot = Arc::new(Mutex::new(None));
    let stale = Arc::new(AtomicBool::new(false));

    if watch_target(&root).exists() {
        let installed = install(&root, &filter, &raw_tx, &stale)?;
        *lock(&os_watcher) = Some(installed);
        info!(root = %root.path.display(), kind = ?root.kind, "file watcher started");
    }

    if !settings.poll_interval.is_zero() {
        tokio::spawn(supervise(
            root.clone(),
            Arc::clone(&filter),
            raw_tx,
            settings.poll_interval,
            Arc::clone(&os_watcher),
            stale,
            stop_rx.clone(),
        ));
    }

    tokio::spawn(flush_loop(root.clone(), settings.clone(), raw_rx, stop_rx, on_batch));

    Ok(WatcherHandle {
        root,
        stop_tx,
        os_watcher,
    })
}

/// Canonicalize and stat the root once. Anything that cannot be stat'ed is
/// treated as a directory.
fn resolve_root(path: PathBuf) -> WatchRoot {
    let path = path.canonicalize().unwrap_or(path);
    let kind = match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => RootKind::File,
        Ok(_) => RootKind::Directory,
        Err(err) => {
            let unavailable = SyncError::PathUnavailable(path.clone());
            warn!(error = %err, "{unavailable}; treating it as a directory and waiting for it to appear");
            RootKind::Directory
        }
    };
    WatchRoot { path, kind }
}

/// What is handed to the OS: the parent for a file root.
fn watch_target(root: &WatchRoot) -> &Path {
    match root.kind {
        RootKind::File => root.path.parent().unwrap_or(&root.path),
        RootKind::Directory => &root.path,
    }
}

fn install(
    root: &WatchRoot,
    filter: &Arc<PathFilter>,
    raw_tx: &mpsc::UnboundedSender<PathBuf>,
    stale: &Arc<AtomicBool>,
) -> Result<InstalledWatch> {
    stale.store(false, Ordering::SeqCst);
    let handler = event_handler(root.clone(), Arc::clone(filter), raw_tx.clone(), Arc::clone(stale));
    let mut watcher = RecommendedWatcher::new(handler, Config::default())?;
    let mode = match root.kind {
        RootKind::File => RecursiveMode::NonRecursive,
        RootKind::Directory => RecursiveMode::Recursive,
    };
    let target = watch_target(root);
    watcher.watch(target, mode)?;
    Ok(InstalledWatch {
        _watcher: watcher,
        identity: root_identity(target),
    })
}

/// Only content-affecting notifications count.
fn is_content_event(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(_) | EventKind::Other => false,
    }
}

/// Closure run synchronously by notify on its own thread.
///
/// Removal of the watched directory itself raises `stale`: the OS watch is
/// dead from then on, even if the path comes back.
fn event_handler(
    root: WatchRoot,
    filter: Arc<PathFilter>,
    raw_tx: mpsc::UnboundedSender<PathBuf>,
    stale: Arc<AtomicBool>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(root = %root.path.display(), error = %err, "file watch error");
                return;
            }
        };
        if !is_content_event(&event.kind) {
            return;
        }
        if matches!(event.kind, EventKind::Remove(_))
            && event.paths.iter().any(|p| p == watch_target(&root))
        {
            debug!(root = %root.path.display(), "watched directory removed");
            stale.store(true, Ordering::SeqCst);
        }
        for path in event.paths {
            if root.kind == RootKind::File && path != root.path {
                continue;
            }
            let Some(rel) = root.relative(&path) else {
                continue;
            };
            if filter.is_excluded(&rel) {
                trace!(path = %rel, "ignored change");
                continue;
            }
            debug!(kind = ?event.kind, path = %path.display(), "change detected");
            // Receiver gone means the watcher is shutting down.
            let _ = raw_tx.send(path);
        }
    }
}

/// Re-check the root every `interval`: install the watch once it appears,
/// drop it when the root vanishes, and re-install it when the directory
/// under the path was replaced since the watch went on.
async fn supervise(
    root: WatchRoot,
    filter: Arc<PathFilter>,
    raw_tx: mpsc::UnboundedSender<PathBuf>,
    interval: std::time::Duration,
    os_watcher: OsWatcherSlot,
    stale: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let target = watch_target(&root);
        let present = target.exists();
        let identity = root_identity(target);
        let mut slot = lock(&os_watcher);
        if *stop_rx.borrow() {
            break;
        }
        let replaced = match slot.as_ref() {
            Some(current) if present => {
                stale.swap(false, Ordering::SeqCst) || current.identity != identity
            }
            _ => false,
        };
        if replaced {
            info!(root = %root.path.display(), "watch path was re-created; re-installing file watcher");
            *slot = None;
        }
        match (slot.is_some(), present) {
            (false, true) => match install(&root, &filter, &raw_tx, &stale) {
                Ok(installed) => {
                    info!(root = %root.path.display(), "watch path appeared; file watcher started");
                    *slot = Some(installed);
                }
                Err(err) => warn!(root = %root.path.display(), error = %err, "failed to install watch"),
            },
            (true, false) => {
                warn!("{}", SyncError::PathUnavailable(root.path.clone()));
                *slot = None;
            }
            _ => {}
        }
    }
    debug!(root = %root.path.display(), "watch supervisor finished");
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn flush_loop<F>(
    root: WatchRoot,
    settings: WatchSettings,
    mut raw_rx: mpsc::UnboundedReceiver<PathBuf>,
    mut stop_rx: watch::Receiver<bool>,
    on_batch: F,
) where
    F: Fn(&WatchRoot, Vec<PathBuf>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let mut coalescer = Coalescer::new(settings.settle, settings.debounce);

    loop {
        let deadline = coalescer.next_deadline();
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            received = raw_rx.recv() => match received {
                Some(path) => coalescer.record(path, Instant::now().into_std()),
                None => break,
            },
            _ = sleep_until(deadline) => {}
        }

        if let Some(batch) = coalescer.poll(Instant::now().into_std()) {
            dispatch(&root, batch, &on_batch);
        }
    }

    if !coalescer.is_idle() {
        debug!(
            root = %root.path.display(),
            dropped = coalescer.pending_len(),
            "watcher stopped with unflushed changes"
        );
    }
    coalescer.clear();
}

fn dispatch<F>(root: &WatchRoot, batch: Vec<PathBuf>, on_batch: &F)
where
    F: Fn(&WatchRoot, Vec<PathBuf>) -> anyhow::Result<()>,
{
    let count = batch.len();
    debug!(root = %root.path.display(), files = count, "debounce window elapsed");
    match catch_unwind(AssertUnwindSafe(|| on_batch(root, batch))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(root = %root.path.display(), error = %err, "batch callback failed"),
        Err(_) => error!(root = %root.path.display(), "batch callback panicked"),
    }
}
