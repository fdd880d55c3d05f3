//! Persistent per-file synchronization state.
//!
//! The whole store is one JSON object keyed by the absolute local path.
//! Loading a missing file yields an empty map; saving goes through a
//! temporary file and rename so a crash leaves the last complete write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::Result;

/// Everything known about one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Current local content hash. Empty when no local file exists (a
    /// remote-only shadow record).
    #[serde(default)]
    pub hash: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    /// `hash` at the moment of the last successful sync.
    #[serde(default)]
    pub last_synced_hash: String,
    /// Remote blob identifier the file was last synced to.
    #[serde(default)]
    pub last_synced_remote_id: String,
    /// Set when a previously tracked local file has disappeared.
    #[serde(default)]
    pub deleted: bool,
    /// Last failure description, cleared on success.
    #[serde(default)]
    pub last_sync_error_message: String,
}

impl FileRecord {
    pub fn new(path: PathBuf, hash: String, last_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            path,
            hash,
            last_modified,
            size,
            last_synced_hash: String::new(),
            last_synced_remote_id: String::new(),
            deleted: false,
            last_sync_error_message: String::new(),
        }
    }

    /// A record representing a path seen only on the remote.
    pub fn shadow(path: PathBuf) -> Self {
        Self::new(path, String::new(), Utc::now(), 0)
    }

    pub fn never_synced(&self) -> bool {
        self.last_synced_remote_id.is_empty()
    }
}

pub fn load_records(path: &Path) -> Result<HashMap<PathBuf, FileRecord>> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let records: HashMap<PathBuf, FileRecord> = serde_json::from_slice(&bytes)?;
            debug!(count = records.len(), path = %path.display(), "loaded state");
            Ok(records)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

pub fn save_records(path: &Path, records: &HashMap<PathBuf, FileRecord>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &json)?;
    restrict_permissions(&tmp)?;
    std::fs::rename(&tmp, path)?;
    debug!(count = records.len(), path = %path.display(), "saved state");
    Ok(())
}

/// Clamp a file to user-only read/write.
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
