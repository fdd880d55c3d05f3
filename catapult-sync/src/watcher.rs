//! Filesystem watcher.
//!
//! Bridges the OS notification source into the async world, filters events
//! against the ignore set, and coalesces bursts through the debouncer so a
//! path produces one downstream notification per quiescent period. Watch
//! errors are logged and the loop keeps going; only shutdown ends it.

use catapult_core::IgnoreSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::error::Result;

pub struct FileWatcher {
    base_dir: PathBuf,
    ignores: IgnoreSet,
    debouncer: Debouncer,
}

impl FileWatcher {
    pub fn new(base_dir: PathBuf, ignores: IgnoreSet, debounce_delay: Duration) -> Self {
        Self {
            base_dir,
            ignores,
            debouncer: Debouncer::new(debounce_delay),
        }
    }

    /// Watch the base directory until shutdown. Each surviving event sends
    /// the touched absolute path on `events` after its debounce window.
    pub async fn run(
        &self,
        events: mpsc::UnboundedSender<PathBuf>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        // notify calls back on its own thread; hand events over to the
        // async loop through an unbounded channel.
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            })?;
        watcher.watch(&self.base_dir, RecursiveMode::Recursive)?;
        info!(base = %self.base_dir.display(), "watching for changes");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                res = raw_rx.recv() => match res {
                    None => break,
                    Some(Err(e)) => warn!(error = %e, "watch error"),
                    Some(Ok(event)) => self.handle_event(event, &events),
                },
            }
        }

        self.debouncer.stop();
        drop(watcher);
        info!("watcher stopped");
        Ok(())
    }

    fn handle_event(&self, event: Event, events: &mpsc::UnboundedSender<PathBuf>) {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        for path in event.paths {
            // Directory-level noise is uninteresting; a deleted path no
            // longer looks like a directory and still passes through.
            if path.is_dir() || self.ignores.matches(&path) {
                continue;
            }
            debug!(path = %path.display(), kind = ?event.kind, "filesystem event");
            let key = path.display().to_string();
            let tx = events.clone();
            self.debouncer.add(key, move || {
                let _ = tx.send(path);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_one(
        rx: &mut mpsc::UnboundedReceiver<PathBuf>,
        within: Duration,
    ) -> Option<PathBuf> {
        tokio::time::timeout(within, rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn edit_burst_produces_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let watcher = FileWatcher::new(
            dir.path().to_path_buf(),
            IgnoreSet::default(),
            Duration::from_millis(200),
        );
        let base = dir.path().to_path_buf();
        let handle = tokio::spawn(async move { watcher.run(tx, shutdown_rx).await });

        // Give the watcher a moment to register, then burst.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let target = base.join("a.txt");
        for content in ["one", "two", "three"] {
            std::fs::write(&target, content).unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        let first = collect_one(&mut rx, Duration::from_secs(5)).await;
        assert_eq!(first, Some(target));
        // The burst was coalesced; nothing else arrives.
        let second = collect_one(&mut rx, Duration::from_millis(500)).await;
        assert_eq!(second, None);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn ignored_paths_never_surface() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let watcher = FileWatcher::new(
            dir.path().to_path_buf(),
            IgnoreSet::default(),
            Duration::from_millis(100),
        );
        let base = dir.path().to_path_buf();
        let handle = tokio::spawn(async move { watcher.run(tx, shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(base.join("scratch.tmp"), "x").unwrap();
        std::fs::write(base.join("noise.swp"), "x").unwrap();

        let got = collect_one(&mut rx, Duration::from_millis(800)).await;
        assert_eq!(got, None);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
