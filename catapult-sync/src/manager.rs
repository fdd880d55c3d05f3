//! Long-running coordinator.
//!
//! Runs four cooperative tasks under one shutdown signal: the filesystem
//! watcher, a periodic remote poll (to catch changes the watcher cannot
//! see), the queue drain, and an hourly queue cleanup. Reconciliation
//! batches are serialized through the file-manager mutex; a second batch
//! cannot start while one is mutating state.

use catapult_core::{Config, FileManager, RemoteStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityChecker;
use crate::error::Result;
use crate::queue::{OperationKind, OperationQueue, QueuedOperation};
use crate::syncer::{SyncOutcome, Syncer};
use crate::tracker::IssueTracker;
use crate::watcher::FileWatcher;

const QUEUE_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const QUEUE_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// How long a ticket must stay quiet before it is auto-resolved, and how
/// long resolved tickets stay cached before they are forgotten.
const ISSUE_QUIET_WINDOW: Duration = Duration::from_secs(3600);
const ISSUE_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone)]
pub struct AutoSyncManager {
    config: Config,
    files: Arc<Mutex<FileManager>>,
    remote: Arc<dyn RemoteStore>,
    syncer: Arc<Syncer>,
    queue: Arc<OperationQueue>,
    connectivity: Arc<ConnectivityChecker>,
    tracker: Option<Arc<IssueTracker>>,
}

impl AutoSyncManager {
    pub fn new(
        config: Config,
        files: FileManager,
        remote: Arc<dyn RemoteStore>,
        queue: OperationQueue,
        tracker: Option<Arc<IssueTracker>>,
    ) -> Self {
        Self {
            syncer: Arc::new(Syncer::new(remote.clone())),
            files: Arc::new(Mutex::new(files)),
            remote,
            queue: Arc::new(queue),
            connectivity: Arc::new(ConnectivityChecker::new()),
            tracker,
            config,
        }
    }

    /// Run until the shutdown signal flips. State and queue are saved as
    /// part of every mutation, so there is nothing extra to flush on exit.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(base = %self.config.storage.base_dir.display(), "auto-sync starting");

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let watcher = FileWatcher::new(
            self.config.storage.base_dir.clone(),
            self.files.lock().await.ignores().clone(),
            Duration::from_secs(self.config.sync.debounce_secs),
        );
        let watcher_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { watcher.run(event_tx, shutdown).await })
        };

        let drain_task = {
            let manager = self.clone();
            let shutdown = shutdown.clone();
            let interval = Duration::from_secs(self.config.sync.drain_interval_secs);
            tokio::spawn(async move { manager.periodic(interval, shutdown, Self::drain_queue).await })
        };

        let poll_task = {
            let manager = self.clone();
            let shutdown = shutdown.clone();
            let interval = Duration::from_secs(self.config.sync.poll_interval_secs);
            tokio::spawn(async move { manager.periodic(interval, shutdown, Self::poll_remote).await })
        };

        let cleanup_task = {
            let manager = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                manager
                    .periodic(QUEUE_CLEANUP_INTERVAL, shutdown, Self::cleanup_queue)
                    .await
            })
        };

        let tracker_task = self.tracker.as_ref().map(|_| {
            let manager = self.clone();
            let shutdown = shutdown.clone();
            let interval = Duration::from_secs(self.config.issues.resolution_check_interval_secs);
            tokio::spawn(async move { manager.periodic(interval, shutdown, Self::tend_issues).await })
        });

        let mut shutdown_events = shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown_events.changed() => break,
                event = event_rx.recv() => match event {
                    Some(path) => self.handle_file_event(path).await,
                    None => break,
                },
            }
        }

        // Watcher exits on the same signal; wait for all tasks so nothing
        // is left mutating state.
        let _ = watcher_task.await;
        let _ = drain_task.await;
        let _ = poll_task.await;
        let _ = cleanup_task.await;
        if let Some(task) = tracker_task {
            let _ = task.await;
        }
        info!("auto-sync stopped");
        Ok(())
    }

    /// Run `tick` every `interval` until shutdown.
    async fn periodic<F, Fut>(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        tick: F,
    ) where
        F: Fn(Self) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => tick(self.clone()).await,
                _ = shutdown.changed() => break,
            }
        }
    }

    /// A debounced watcher notification for one path.
    async fn handle_file_event(&self, path: PathBuf) {
        let rel = {
            let files = self.files.lock().await;
            files.relative_path(&path)
        };

        if !path.exists() {
            // Deletions propagate through full batches; a transient file
            // that vanished before its debounce window fired is not worth
            // a sync of its own.
            debug!(path = %rel, "event path no longer exists, dropping");
            return;
        }

        if self.connectivity.is_connected().await {
            debug!(path = %rel, "change detected, running batch");
            if let Err(e) = self.run_batch().await {
                warn!(error = %e, "batch failed after file event");
            }
        } else {
            info!(path = %rel, "offline, queueing sync");
            let op = QueuedOperation::new(path, OperationKind::Sync);
            if let Err(e) = self.queue.add(op).await {
                warn!(error = %e, "failed to enqueue operation");
            }
        }
    }

    /// One serialized reconciliation batch; saves state afterwards and
    /// forwards failures to the issue tracker.
    pub async fn run_batch(&self) -> Result<SyncOutcome> {
        let outcome = {
            let mut files = self.files.lock().await;
            let outcome = self.syncer.sync_all(&mut files).await?;
            files.save(&self.config.storage.state_path)?;
            outcome
        };

        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.report_failures(&outcome.failures).await {
                warn!(error = %e, "failed to report sync failures");
            }
        }
        Ok(outcome)
    }

    /// Work through pending operations while connected. Exhausted entries
    /// are dropped with a log line; everything else retries next round.
    async fn drain_queue(self) {
        if !self.connectivity.is_connected().await {
            return;
        }
        let pending = self.queue.pending().await;
        if pending.is_empty() {
            return;
        }
        debug!(pending = pending.len(), "draining operation queue");

        for op in pending {
            if op.retries >= self.config.sync.retry_attempts {
                warn!(id = %op.id, retries = op.retries, last_error = %op.last_error,
                    "operation exceeded retry limit, dropping");
                if let Err(e) = self.queue.remove(&op.id).await {
                    warn!(error = %e, "failed to drop exhausted operation");
                }
                continue;
            }

            match self.execute_operation(&op).await {
                Ok(()) => {
                    if let Err(e) = self.queue.remove(&op.id).await {
                        warn!(error = %e, "failed to remove completed operation");
                    }
                }
                Err(e) => {
                    debug!(id = %op.id, error = %e, "queued operation failed");
                    if let Err(e) = self.queue.update_retry(&op.id, &e.to_string()).await {
                        warn!(error = %e, "failed to record retry");
                    }
                }
            }
        }
    }

    /// A queued operation replays as a full batch against fresh state; the
    /// reconciler works out what the path actually needs now.
    async fn execute_operation(&self, op: &QueuedOperation) -> Result<()> {
        {
            let mut files = self.files.lock().await;
            files.load(&self.config.storage.state_path)?;
        }
        let outcome = self.run_batch().await?;

        let rel = {
            let files = self.files.lock().await;
            files.relative_path(&op.file_path)
        };
        if let Some(failure) = outcome.failures.iter().find(|f| f.path == rel) {
            return Err(crate::error::SyncError::Other(failure.message.clone()));
        }
        Ok(())
    }

    /// The watcher cannot see remote-side changes; a manifest poll catches
    /// paths that only exist remotely and triggers a batch for them.
    async fn poll_remote(self) {
        debug!("polling remote for changes");
        let manifest = match self.remote.get_all_files_with_content().await {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "remote poll failed");
                return;
            }
        };

        let has_unknown_path = {
            let files = self.files.lock().await;
            manifest
                .keys()
                .any(|rel| files.record(&files.absolute_path(rel)).is_none())
        };

        if has_unknown_path {
            info!("remote has new files, running batch");
            if let Err(e) = self.run_batch().await {
                warn!(error = %e, "batch failed after remote poll");
            }
        }
    }

    async fn cleanup_queue(self) {
        match self
            .queue
            .cleanup(QUEUE_MAX_AGE, self.config.sync.retry_attempts)
            .await
        {
            Ok(0) => {}
            Ok(removed) => info!(removed, "removed stale queue entries"),
            Err(e) => warn!(error = %e, "queue cleanup failed"),
        }
    }

    /// Close quiet tickets and forget resolved ones after a day.
    async fn tend_issues(self) {
        let tracker = match &self.tracker {
            Some(tracker) => tracker,
            None => return,
        };
        if let Err(e) = tracker.resolve_stale(ISSUE_QUIET_WINDOW).await {
            warn!(error = %e, "issue auto-resolution failed");
        }
        tracker.cleanup(ISSUE_CACHE_MAX_AGE).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catapult_core::{hash, RemoteError, RemoteFile};
    use std::collections::HashMap;

    /// Minimal remote double: path to bytes, toggleable availability.
    #[derive(Default)]
    struct TestRemote {
        files: Mutex<HashMap<String, Vec<u8>>>,
        offline: Mutex<bool>,
    }

    impl TestRemote {
        async fn check(&self) -> std::result::Result<(), RemoteError> {
            if *self.offline.lock().await {
                Err(RemoteError::transport("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteStore for TestRemote {
        async fn ensure_repository_exists(&self) -> std::result::Result<(), RemoteError> {
            self.check().await
        }
        async fn get_all_files_with_content(
            &self,
        ) -> std::result::Result<HashMap<String, RemoteFile>, RemoteError> {
            self.check().await?;
            let files = self.files.lock().await;
            Ok(files
                .iter()
                .map(|(path, content)| {
                    (
                        path.clone(),
                        RemoteFile {
                            path: path.clone(),
                            content: content.clone(),
                            remote_id: hash::remote_blob_id(content),
                            size: content.len() as u64,
                        },
                    )
                })
                .collect())
        }
        async fn create_file(&self, path: &str, content: &[u8]) -> std::result::Result<(), RemoteError> {
            self.check().await?;
            self.files.lock().await.insert(path.to_string(), content.to_vec());
            Ok(())
        }
        async fn update_file(&self, path: &str, content: &[u8]) -> std::result::Result<(), RemoteError> {
            self.create_file(path, content).await
        }
        async fn delete_file(&self, path: &str) -> std::result::Result<(), RemoteError> {
            self.check().await?;
            self.files.lock().await.remove(path);
            Ok(())
        }
        async fn file_exists(&self, path: &str) -> std::result::Result<bool, RemoteError> {
            self.check().await?;
            Ok(self.files.lock().await.contains_key(path))
        }
        async fn get_file(&self, path: &str) -> std::result::Result<RemoteFile, RemoteError> {
            self.check().await?;
            Err(RemoteError::Api { status: 404, message: path.to_string() })
        }
    }

    fn manager_for(dir: &tempfile::TempDir, remote: Arc<TestRemote>) -> AutoSyncManager {
        let mut config = Config::default();
        config.storage.base_dir = dir.path().join("base");
        config.storage.state_path = dir.path().join("state.json");
        config.storage.queue_path = dir.path().join("queue.json");
        std::fs::create_dir_all(&config.storage.base_dir).unwrap();

        let files = FileManager::new(config.storage.base_dir.clone());
        let queue = OperationQueue::load(config.storage.queue_path.clone(), 100).unwrap();
        AutoSyncManager::new(config, files, remote, queue, None)
    }

    #[tokio::test]
    async fn offline_event_enqueues_one_sync_operation() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(TestRemote::default());
        let mut manager = manager_for(&dir, remote);
        manager.connectivity = Arc::new(ConnectivityChecker::with_endpoints(Vec::new()));

        let file = manager.config.storage.base_dir.join("a.txt");
        std::fs::write(&file, "v3").unwrap();
        manager.handle_file_event(file.clone()).await;

        let pending = manager.queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_path, file);
        assert_eq!(pending[0].operation, OperationKind::Sync);
    }

    #[tokio::test]
    async fn vanished_event_path_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(TestRemote::default());
        let mut manager = manager_for(&dir, remote);
        manager.connectivity = Arc::new(ConnectivityChecker::with_endpoints(Vec::new()));

        manager
            .handle_file_event(manager.config.storage.base_dir.join("gone.txt"))
            .await;
        assert!(manager.queue.is_empty().await);
    }

    #[tokio::test]
    async fn drain_uploads_queued_change_and_empties_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(TestRemote::default());
        let mut manager = manager_for(&dir, remote.clone());
        manager.connectivity = Arc::new(ConnectivityChecker::assume_online());

        let file = manager.config.storage.base_dir.join("a.txt");
        std::fs::write(&file, "final content").unwrap();
        manager
            .queue
            .add(QueuedOperation::new(file, OperationKind::Sync))
            .await
            .unwrap();

        manager.clone().drain_queue().await;

        assert!(manager.queue.is_empty().await);
        assert_eq!(
            remote.files.lock().await.get("a.txt").unwrap(),
            b"final content"
        );
    }

    #[tokio::test]
    async fn drain_counts_retries_while_offline_remote_fails() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(TestRemote::default());
        *remote.offline.lock().await = true;

        let mut manager = manager_for(&dir, remote);
        // Detector says online, gateway still fails: the advisory probe
        // must not be trusted.
        manager.connectivity = Arc::new(ConnectivityChecker::assume_online());

        let file = manager.config.storage.base_dir.join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let id = manager
            .queue
            .add(QueuedOperation::new(file, OperationKind::Sync))
            .await
            .unwrap();

        manager.clone().drain_queue().await;

        let pending = manager.queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].retries, 1);
        assert!(pending[0].last_error.contains("connection refused"));
    }

    #[tokio::test]
    async fn drain_drops_operations_past_the_retry_limit() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(TestRemote::default());
        let mut manager = manager_for(&dir, remote);
        manager.connectivity = Arc::new(ConnectivityChecker::assume_online());

        let file = manager.config.storage.base_dir.join("a.txt");
        let id = manager
            .queue
            .add(QueuedOperation::new(file, OperationKind::Sync))
            .await
            .unwrap();
        for _ in 0..manager.config.sync.retry_attempts {
            manager.queue.update_retry(&id, "boom").await.unwrap();
        }

        manager.clone().drain_queue().await;
        assert!(manager.queue.is_empty().await);
    }
}
