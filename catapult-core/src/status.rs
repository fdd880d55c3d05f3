//! Read-only status view.
//!
//! Computes one display label per tracked path from the record map and the
//! remote manifest. Never mutates anything.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::remote::RemoteFile;
use crate::state::FileRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// The last sync attempt failed; carries the recorded message.
    SyncError(String),
    /// Local file gone after a prior sync; `remote_present` tells whether
    /// the remote copy still exists.
    DeletedLocally { remote_present: bool },
    /// Exists locally, nothing on the remote.
    LocalOnly,
    /// Exists on the remote, never materialized locally.
    RemoteOnly,
    /// Both sides exist but no successful sync has happened yet.
    NotSynced,
    Synced,
    ModifiedLocally,
    ModifiedInRepository,
    /// Both sides changed since the last sync.
    Conflicted,
}

impl FileStatus {
    pub fn label(&self) -> String {
        match self {
            FileStatus::SyncError(msg) => format!("Sync Error ({msg})"),
            FileStatus::DeletedLocally { remote_present: true } => {
                "Deleted Locally (still in repository)".to_string()
            }
            FileStatus::DeletedLocally { remote_present: false } => "Deleted Locally".to_string(),
            FileStatus::LocalOnly => "Local Only".to_string(),
            FileStatus::RemoteOnly => "Only in Repository".to_string(),
            FileStatus::NotSynced => "Not Synced".to_string(),
            FileStatus::Synced => "Synced".to_string(),
            FileStatus::ModifiedLocally => "Modified Locally".to_string(),
            FileStatus::ModifiedInRepository => "Modified in Repository".to_string(),
            FileStatus::Conflicted => "Conflict".to_string(),
        }
    }
}

/// Label priority: errors first, then lifecycle states, then the hash
/// comparison lattice.
pub fn evaluate(record: &FileRecord, remote: Option<&RemoteFile>) -> FileStatus {
    if !record.last_sync_error_message.is_empty() {
        return FileStatus::SyncError(record.last_sync_error_message.clone());
    }
    if record.deleted {
        return FileStatus::DeletedLocally {
            remote_present: remote.is_some(),
        };
    }
    let remote = match remote {
        None => return FileStatus::LocalOnly,
        Some(r) => r,
    };
    if record.hash.is_empty() {
        return FileStatus::RemoteOnly;
    }
    if record.last_synced_remote_id.is_empty() {
        return FileStatus::NotSynced;
    }

    let local_clean = record.hash == record.last_synced_hash;
    let remote_clean = remote.remote_id == record.last_synced_remote_id;
    match (local_clean, remote_clean) {
        (true, true) => FileStatus::Synced,
        (false, true) => FileStatus::ModifiedLocally,
        (true, false) => FileStatus::ModifiedInRepository,
        (false, false) => FileStatus::Conflicted,
    }
}

/// One `relative-path: label` line per known path, sorted, covering the
/// union of tracked records and the remote manifest.
pub fn report(
    records: &HashMap<PathBuf, FileRecord>,
    manifest: &HashMap<String, RemoteFile>,
    relative: impl Fn(&PathBuf) -> String,
) -> Vec<(String, FileStatus)> {
    let mut statuses: BTreeMap<String, FileStatus> = BTreeMap::new();

    for (path, record) in records {
        let rel = relative(path);
        let status = evaluate(record, manifest.get(&rel));
        statuses.insert(rel, status);
    }
    for rel in manifest.keys() {
        statuses
            .entry(rel.clone())
            .or_insert(FileStatus::RemoteOnly);
    }

    statuses.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(hash: &str, synced_hash: &str, remote_id: &str) -> FileRecord {
        let mut rec = FileRecord::new(
            PathBuf::from("/base/a.txt"),
            hash.to_string(),
            Utc::now(),
            1,
        );
        rec.last_synced_hash = synced_hash.to_string();
        rec.last_synced_remote_id = remote_id.to_string();
        rec
    }

    fn remote(remote_id: &str) -> RemoteFile {
        RemoteFile {
            path: "a.txt".to_string(),
            content: b"x".to_vec(),
            remote_id: remote_id.to_string(),
            size: 1,
        }
    }

    #[test]
    fn error_outranks_everything() {
        let mut rec = record("h", "h", "r");
        rec.last_sync_error_message = "boom".to_string();
        assert_eq!(
            evaluate(&rec, Some(&remote("r"))),
            FileStatus::SyncError("boom".to_string())
        );
    }

    #[test]
    fn deleted_locally_reports_remote_presence() {
        let mut rec = record("", "h", "r");
        rec.deleted = true;
        assert_eq!(
            evaluate(&rec, Some(&remote("r"))),
            FileStatus::DeletedLocally { remote_present: true }
        );
        assert_eq!(
            evaluate(&rec, None),
            FileStatus::DeletedLocally { remote_present: false }
        );
    }

    #[test]
    fn lifecycle_states() {
        assert_eq!(evaluate(&record("h", "", ""), None), FileStatus::LocalOnly);
        assert_eq!(
            evaluate(&record("", "", ""), Some(&remote("r"))),
            FileStatus::RemoteOnly
        );
        assert_eq!(
            evaluate(&record("h", "", ""), Some(&remote("r"))),
            FileStatus::NotSynced
        );
    }

    #[test]
    fn comparison_lattice() {
        assert_eq!(
            evaluate(&record("h", "h", "r"), Some(&remote("r"))),
            FileStatus::Synced
        );
        assert_eq!(
            evaluate(&record("h2", "h", "r"), Some(&remote("r"))),
            FileStatus::ModifiedLocally
        );
        assert_eq!(
            evaluate(&record("h", "h", "r"), Some(&remote("r2"))),
            FileStatus::ModifiedInRepository
        );
        assert_eq!(
            evaluate(&record("h2", "h", "r"), Some(&remote("r2"))),
            FileStatus::Conflicted
        );
    }

    #[test]
    fn report_covers_remote_only_paths() {
        let records = HashMap::new();
        let mut manifest = HashMap::new();
        manifest.insert("only-remote.txt".to_string(), remote("r"));

        let lines = report(&records, &manifest, |p| p.display().to_string());
        assert_eq!(
            lines,
            vec![("only-remote.txt".to_string(), FileStatus::RemoteOnly)]
        );
    }
}
