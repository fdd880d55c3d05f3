//! Durable bounded queue of pending sync operations.
//!
//! Every mutation persists the whole map to disk while the write lock is
//! held, so the on-disk file and the in-memory view never diverge. When the
//! queue is full the oldest entry by timestamp is evicted first.

use catapult_core::state::restrict_permissions;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Sync,
    Delete,
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    #[serde(default)]
    pub id: String,
    pub file_path: PathBuf,
    pub operation: OperationKind,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub last_error: String,
}

impl QueuedOperation {
    pub fn new(file_path: PathBuf, operation: OperationKind) -> Self {
        Self {
            id: String::new(),
            file_path,
            operation,
            timestamp: Utc::now(),
            retries: 0,
            last_error: String::new(),
        }
    }
}

pub struct OperationQueue {
    path: PathBuf,
    max_size: usize,
    entries: RwLock<HashMap<String, QueuedOperation>>,
}

impl OperationQueue {
    /// Open the queue, reading whatever survived the last run.
    pub fn load(path: PathBuf, max_size: usize) -> Result<Self> {
        let entries: HashMap<String, QueuedOperation> = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(pending = entries.len(), path = %path.display(), "operation queue loaded");
        Ok(Self {
            path,
            max_size,
            entries: RwLock::new(entries),
        })
    }

    /// Insert an operation, stamping id and timestamp when absent, evicting
    /// the oldest entries if the queue would overflow. Returns the id.
    pub async fn add(&self, mut op: QueuedOperation) -> Result<String> {
        let mut entries = self.entries.write().await;

        if op.id.is_empty() {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            op.id = format!("{}_{}", op.file_path.display(), nanos);
        }

        while entries.len() >= self.max_size && !entries.contains_key(&op.id) {
            let oldest = entries
                .values()
                .min_by_key(|e| e.timestamp)
                .map(|e| e.id.clone());
            match oldest {
                Some(id) => {
                    warn!(evicted = %id, "queue full, evicting oldest operation");
                    entries.remove(&id);
                }
                None => break,
            }
        }

        let id = op.id.clone();
        entries.insert(id.clone(), op);
        self.persist(&entries)?;
        Ok(id)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(id).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// Count one failed attempt against an entry.
    pub async fn update_retry(&self, id: &str, error: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(id) {
            entry.retries += 1;
            entry.last_error = error.to_string();
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// Drop entries older than `max_age` or retried at least `max_retries`
    /// times. Returns how many were removed.
    pub async fn cleanup(&self, max_age: Duration, max_retries: u32) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let cutoff = Utc::now()
            - ChronoDuration::from_std(max_age).unwrap_or_else(|_| ChronoDuration::hours(24));
        let before = entries.len();
        entries.retain(|_, e| e.timestamp > cutoff && e.retries < max_retries);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "queue cleanup");
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Snapshot of pending operations, oldest first.
    pub async fn pending(&self) -> Vec<QueuedOperation> {
        let entries = self.entries.read().await;
        let mut pending: Vec<_> = entries.values().cloned().collect();
        pending.sort_by_key(|e| e.timestamp);
        pending
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn persist(&self, entries: &HashMap<String, QueuedOperation>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
