// src/registry.rs

//! Owner of every running watch target.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::engine::{ChangeBatch, PriorityChangeQueue};
use crate::errors::{Result, SyncError};
use crate::types::{Priority, WatchTarget};
use crate::watch::{PathFilter, WatchRoot, WatchSettings, WatcherHandle, start_watcher};

struct ActiveTarget {
    target: WatchTarget,
    watcher: WatcherHandle,
}

/// Maps target id to its running watcher and routes each debounced batch,
/// tagged with the target's priority and metadata, into the shared queue.
///
/// Created by the composition root and passed by reference; there is no
/// global instance.
pub struct WatchTargetRegistry {
    queue: PriorityChangeQueue,
    settings: WatchSettings,
    targets: BTreeMap<String, ActiveTarget>,
}

impl std::fmt::Debug for WatchTargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchTargetRegistry")
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish()
    }
}

impl WatchTargetRegistry {
    pub fn new(queue: PriorityChangeQueue, settings: WatchSettings) -> Self {
        Self {
            queue,
            settings,
            targets: BTreeMap::new(),
        }
    }

    pub fn queue(&self) -> &PriorityChangeQueue {
        &self.queue
    }

    /// Start watching `target`.
    ///
    /// Fails with [`SyncError::PathUnavailable`] if the root does not exist.
    /// The new watcher is started before an existing target with the same id
    /// is stopped and replaced, so on any error the existing one keeps
    /// running untouched.
    pub fn add_target(&mut self, target: WatchTarget) -> Result<()> {
        if !target.root_path.exists() {
            warn!(
                target_id = %target.id,
                path = %target.root_path.display(),
                "cannot add target: path does not exist"
            );
            return Err(SyncError::PathUnavailable(target.root_path.clone()));
        }
        let filter = PathFilter::new(&target.ignore_patterns)?;

        let queue = self.queue.clone();
        let snapshot = target.clone();
        let watcher = start_watcher(
            target.root_path.clone(),
            filter,
            &self.settings,
            move |root: &WatchRoot, files: Vec<PathBuf>| {
                queue.enqueue(ChangeBatch::new(&snapshot, root.clone(), files));
                Ok(())
            },
        )?;

        info!(
            target_id = %target.id,
            path = %target.root_path.display(),
            priority = %target.priority,
            "target added"
        );
        let id = target.id.clone();
        if let Some(old) = self
            .targets
            .insert(id.clone(), ActiveTarget { target, watcher })
        {
            info!(target_id = %id, "replaced existing target");
            old.watcher.stop();
        }
        Ok(())
    }

    /// Stop and forget `id`. Returns `false` for an unknown id.
    pub fn remove_target(&mut self, id: &str) -> bool {
        match self.targets.remove(id) {
            Some(active) => {
                active.watcher.stop();
                info!(target_id = %id, "target removed");
                true
            }
            None => false,
        }
    }

    /// Change a target's priority, restarting its watcher. Returns `Ok(false)`
    /// for an unknown id. If the restart fails the target keeps its old
    /// priority and watcher.
    pub fn update_priority(&mut self, id: &str, priority: Priority) -> Result<bool> {
        let Some(active) = self.targets.get(id) else {
            return Ok(false);
        };
        if active.target.priority == priority {
            return Ok(true);
        }
        let mut target = active.target.clone();
        target.priority = priority;
        self.add_target(target)?;
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&WatchTarget> {
        self.targets.get(id).map(|a| &a.target)
    }

    /// Whether the OS-level watch for `id` is currently installed.
    pub fn is_watching(&self, id: &str) -> bool {
        self.targets.get(id).is_some_and(|a| a.watcher.is_watching())
    }

    /// All targets, ordered by id.
    pub fn list_targets(&self) -> Vec<&WatchTarget> {
        self.targets.values().map(|a| &a.target).collect()
    }

    pub fn targets_by_priority(&self, priority: Priority) -> Vec<&WatchTarget> {
        self.targets
            .values()
            .map(|a| &a.target)
            .filter(|t| t.priority == priority)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Remove every target. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let count = self.targets.len();
        for (_, active) in std::mem::take(&mut self.targets) {
            active.watcher.stop();
        }
        if count > 0 {
            info!(count, "all targets stopped");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::RootKind;

    fn registry() -> WatchTargetRegistry {
        WatchTargetRegistry::new(PriorityChangeQueue::default(), WatchSettings::default())
    }

    #[tokio::test]
    async fn add_rejects_missing_root() {
        let mut reg = registry();
        let err = reg
            .add_target(WatchTarget::with_id("t1", "/definitely/not/here/watchsync", Priority::High))
            .unwrap_err();
        assert!(matches!(err, SyncError::PathUnavailable(_)));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn add_replace_remove_and_views() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry();

        reg.add_target(WatchTarget::with_id("a", dir.path(), Priority::High)).unwrap();
        reg.add_target(WatchTarget::with_id("b", dir.path(), Priority::Low)).unwrap();
        reg.add_target(WatchTarget::with_id("a", dir.path(), Priority::Medium)).unwrap();

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("a").unwrap().priority, Priority::Medium);
        assert!(reg.targets_by_priority(Priority::High).is_empty());
        assert_eq!(reg.targets_by_priority(Priority::Low)[0].id, "b");
        let ids: Vec<&str> = reg.list_targets().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(reg.is_watching("a"));

        assert!(reg.update_priority("b", Priority::High).unwrap());
        assert_eq!(reg.get("b").unwrap().priority, Priority::High);
        assert!(!reg.update_priority("zzz", Priority::High).unwrap());

        assert!(reg.remove_target("a"));
        assert!(!reg.remove_target("a"));
        assert_eq!(reg.stop_all(), 1);
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn failed_replacement_keeps_the_running_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry();
        reg.add_target(WatchTarget::with_id("a", dir.path(), Priority::High)).unwrap();

        let mut broken = WatchTarget::with_id("a", dir.path(), Priority::Low);
        broken.ignore_patterns = vec!["src/[unclosed".to_string()];
        assert!(reg.add_target(broken).is_err());

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("a").unwrap().priority, Priority::High);
        assert!(reg.is_watching("a"));
    }

    #[tokio::test]
    async fn failed_priority_change_keeps_the_old_priority() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir(&root).unwrap();
        let mut reg = registry();
        reg.add_target(WatchTarget::with_id("p", &root, Priority::Medium)).unwrap();

        std::fs::remove_dir_all(&root).unwrap();
        let err = reg.update_priority("p", Priority::High).unwrap_err();

        assert!(matches!(err, SyncError::PathUnavailable(_)));
        assert_eq!(reg.get("p").unwrap().priority, Priority::Medium);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn single_file_roots_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, "x").unwrap();

        let mut reg = registry();
        reg.add_target(WatchTarget::with_id("f", &file, Priority::Low)).unwrap();
        let active = reg.targets.get("f").unwrap();
        assert_eq!(active.watcher.root().kind, RootKind::File);
    }
}
