//! The reconciler.
//!
//! One batch walks the union of local records and the remote manifest and
//! decides, per path, between upload, download, remote delete, no-op and
//! conflict. A failing path is recorded and skipped; the batch always runs
//! to the end.

use catapult_core::{hash, FileManager, RemoteFile, RemoteStore};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

const BATCH_TIMEOUT: Duration = Duration::from_secs(60);
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where conflict copies are archived, relative to the base directory.
const CONFLICT_DIR: &str = ".catapult/conflicts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Synced,
    Uploaded,
    Pulled,
    Conflict,
    DeletedRemote,
    /// Stale shadow record with nothing behind it on either side.
    Dropped,
}

/// Counters for one reconciliation batch.
#[derive(Debug, Default, Clone)]
pub struct SyncOutcome {
    pub synced: usize,
    pub uploaded: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub deleted: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncOutcome {
    fn count(&mut self, decision: Decision) {
        match decision {
            Decision::Synced => self.synced += 1,
            Decision::Uploaded => self.uploaded += 1,
            Decision::Pulled => self.pulled += 1,
            Decision::Conflict => self.conflicts += 1,
            Decision::DeletedRemote => self.deleted += 1,
            Decision::Dropped => {}
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Synced: {}, Updated: {}, Pulled: {}, Conflicts: {}, Deleted: {}",
            self.synced, self.uploaded, self.pulled, self.conflicts, self.deleted
        )
    }
}

#[derive(Debug, Clone)]
pub struct SyncFailure {
    /// Base-relative path.
    pub path: String,
    pub message: String,
    /// Present when the failure came from the remote gateway.
    pub remote_error: Option<catapult_core::RemoteError>,
}

pub struct Syncer {
    remote: Arc<dyn RemoteStore>,
    batch_timeout: Duration,
    file_op_timeout: Duration,
}

impl Syncer {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            batch_timeout: BATCH_TIMEOUT,
            file_op_timeout: FILE_OP_TIMEOUT,
        }
    }

    /// Run one full reconciliation batch over `files`.
    pub async fn sync_all(&self, files: &mut FileManager) -> Result<SyncOutcome> {
        files.scan()?;

        let manifest = timeout(self.batch_timeout, self.remote.get_all_files_with_content())
            .await
            .map_err(|_| {
                SyncError::Remote(catapult_core::RemoteError::transport(
                    "timed out fetching the remote manifest",
                ))
            })??;

        // Union of everything we track and everything the remote has,
        // keyed by base-relative path.
        let mut paths: BTreeSet<String> = manifest.keys().cloned().collect();
        paths.extend(files.records().keys().map(|p| files.relative_path(p)));

        debug!(paths = paths.len(), remote = manifest.len(), "reconciling");

        let mut outcome = SyncOutcome::default();
        for rel in paths {
            match self.sync_path(files, &manifest, &rel).await {
                Ok(decision) => outcome.count(decision),
                Err(err) => {
                    let message = err.to_string();
                    warn!(path = %rel, error = %message, "sync failed for path");
                    let abs = files.absolute_path(&rel);
                    files.record_sync_error(&abs, &message);
                    outcome.failures.push(SyncFailure {
                        path: rel,
                        remote_error: err.remote().cloned(),
                        message,
                    });
                }
            }
        }

        info!(%outcome, "batch finished");
        Ok(outcome)
    }

    async fn sync_path(
        &self,
        files: &mut FileManager,
        manifest: &HashMap<String, RemoteFile>,
        rel: &str,
    ) -> Result<Decision> {
        let abs = files.absolute_path(rel);
        let local_exists = abs.is_file();

        let remote = match manifest.get(rel) {
            None => {
                if !local_exists {
                    // Shadow record with no remote counterpart left.
                    files.remove_file(&abs);
                    debug!(path = rel, "dropped stale record");
                    return Ok(Decision::Dropped);
                }
                // Local only: push it up.
                let bytes = tokio::fs::read(&abs).await?;
                self.with_deadline(self.remote.create_file(rel, &bytes)).await?;
                files.update_sync_info(&abs, &hash::remote_blob_id(&bytes))?;
                return Ok(Decision::Uploaded);
            }
            Some(remote) => remote,
        };

        let marked_deleted = files.record(&abs).map(|r| r.deleted).unwrap_or(false);
        if !local_exists || marked_deleted {
            let previously_synced = files
                .record(&abs)
                .map(|r| !r.never_synced())
                .unwrap_or(false);
            if previously_synced {
                // Tracked, synced, now gone locally: the deletion wins.
                // Mark first so a failed remote delete leaves the record
                // flagged for the next batch instead of looking modified.
                files.mark_deleted(&abs)?;
                self.with_deadline(self.remote.delete_file(rel)).await?;
                files.remove_file(&abs);
                return Ok(Decision::DeletedRemote);
            }
            // Never synced here: materialize the remote copy.
            self.write_local(&abs, &remote.content).await?;
            files.scan()?;
            files.update_sync_info(&abs, &remote.remote_id)?;
            return Ok(Decision::Pulled);
        }

        let local_bytes = tokio::fs::read(&abs).await?;
        if local_bytes == remote.content {
            files.update_sync_info(&abs, &remote.remote_id)?;
            return Ok(Decision::Synced);
        }

        let current_hash = hash::content_hash(&local_bytes);
        let last_synced_hash = files
            .record(&abs)
            .map(|r| r.last_synced_hash.clone())
            .unwrap_or_default();

        if current_hash == last_synced_hash {
            // Local untouched since last sync, remote moved on.
            self.write_local(&abs, &remote.content).await?;
            files.scan()?;
            files.update_sync_info(&abs, &remote.remote_id)?;
            return Ok(Decision::Pulled);
        }

        // Both sides changed. Local wins, but both versions are archived
        // first so nothing is lost.
        self.archive_conflict(files.base_dir(), rel, &local_bytes, &remote.content)
            .await?;
        self.with_deadline(self.remote.update_file(rel, &local_bytes)).await?;
        files.update_sync_info(&abs, &hash::remote_blob_id(&local_bytes))?;
        info!(path = rel, "conflict resolved in favor of local copy");
        Ok(Decision::Conflict)
    }

    async fn with_deadline<T>(
        &self,
        op: impl std::future::Future<Output = std::result::Result<T, catapult_core::RemoteError>>,
    ) -> Result<T> {
        timeout(self.file_op_timeout, op)
            .await
            .map_err(|_| {
                SyncError::Remote(catapult_core::RemoteError::transport(
                    "remote operation timed out",
                ))
            })?
            .map_err(SyncError::Remote)
    }

    async fn write_local(&self, abs: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(abs, content).await?;
        Ok(())
    }

    /// Keep both sides of a conflict under `.catapult/conflicts/`, mirroring
    /// the file's relative path with `.local` and `.remote` suffixes.
    async fn archive_conflict(
        &self,
        base_dir: &Path,
        rel: &str,
        local: &[u8],
        remote: &[u8],
    ) -> Result<()> {
        let archive = base_dir.join(CONFLICT_DIR);
        let local_path = archive.join(format!("{rel}.local"));
        let remote_path = archive.join(format!("{rel}.remote"));
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local_path, local).await?;
        tokio::fs::write(&remote_path, remote).await?;
        warn!(path = rel, "both sides changed, archived both versions");
        Ok(())
    }
}
