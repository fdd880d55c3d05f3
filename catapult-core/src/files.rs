//! The in-memory record map and its mutation API.
//!
//! The manager owns every [`FileRecord`]. Scans bring the map in line with
//! the filesystem; sync transitions and error bookkeeping go through the
//! methods here so the invariants hold in one place. Deletions are not
//! detected by the scan itself: a previously tracked path that is now
//! absent keeps its record (a shadow) until the reconciler decides what the
//! disappearance means.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::Error;
use crate::hash;
use crate::ignore::IgnoreSet;
use crate::state::{self, FileRecord};
use crate::Result;

pub struct FileManager {
    base_dir: PathBuf,
    ignores: IgnoreSet,
    files: HashMap<PathBuf, FileRecord>,
}

impl FileManager {
    pub fn new(base_dir: PathBuf) -> Self {
        Self::with_ignores(base_dir, IgnoreSet::default())
    }

    pub fn with_ignores(base_dir: PathBuf, ignores: IgnoreSet) -> Self {
        Self {
            base_dir,
            ignores,
            files: HashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn ignores(&self) -> &IgnoreSet {
        &self.ignores
    }

    pub fn records(&self) -> &HashMap<PathBuf, FileRecord> {
        &self.files
    }

    pub fn record(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Base-relative form of a path, with forward slashes. This is the key
    /// every other component uses to talk about a file.
    pub fn relative_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.base_dir).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        let mut path = self.base_dir.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Walk the base directory and refresh the map: new files get records,
    /// known files get their hash and metadata updated, sync bookkeeping
    /// survives untouched. Idempotent.
    pub fn scan(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        let ignores = self.ignores.clone();

        let mut seen = 0usize;
        for entry in WalkDir::new(&self.base_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !ignores.matches(e.path()))
        {
            let entry = entry.map_err(|e| Error::Other(format!("scan failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_path_buf();
            let metadata = entry.metadata().map_err(|e| Error::Other(format!("scan failed: {e}")))?;
            let modified: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            let content_hash = hash::hash_file(&path)?;
            seen += 1;

            match self.files.get_mut(&path) {
                Some(record) => {
                    if record.hash != content_hash {
                        trace!(path = %path.display(), "content changed since last scan");
                    }
                    record.hash = content_hash;
                    record.last_modified = modified;
                    record.size = metadata.len();
                    record.deleted = false;
                }
                None => {
                    self.files.insert(
                        path.clone(),
                        FileRecord::new(path, content_hash, modified, metadata.len()),
                    );
                }
            }
        }

        debug!(files = seen, tracked = self.files.len(), base = %self.base_dir.display(), "scan complete");
        Ok(())
    }

    /// Record a successful sync transition. Both sync fields move together
    /// and any previous failure is wiped.
    pub fn update_sync_info(&mut self, path: &Path, remote_id: &str) -> Result<()> {
        let record = self
            .files
            .get_mut(path)
            .ok_or_else(|| Error::UnknownFile(path.display().to_string()))?;
        record.last_synced_hash = record.hash.clone();
        record.last_synced_remote_id = remote_id.to_string();
        record.deleted = false;
        record.last_sync_error_message.clear();
        Ok(())
    }

    /// Register a remote-only path so it carries state before it exists
    /// locally.
    pub fn insert_shadow(&mut self, path: &Path) -> &mut FileRecord {
        self.files
            .entry(path.to_path_buf())
            .or_insert_with(|| FileRecord::shadow(path.to_path_buf()))
    }

    /// Mark a tracked path whose local file has disappeared after a
    /// successful sync. Callers must drop the record instead when it was
    /// never synced.
    pub fn mark_deleted(&mut self, path: &Path) -> Result<()> {
        let record = self
            .files
            .get_mut(path)
            .ok_or_else(|| Error::UnknownFile(path.display().to_string()))?;
        record.deleted = true;
        record.hash.clear();
        Ok(())
    }

    /// Attach a failure message to a path. A record is created on demand so
    /// failures on not-yet-tracked paths stay visible.
    pub fn record_sync_error(&mut self, path: &Path, message: &str) {
        let record = self.insert_shadow(path);
        record.last_sync_error_message = message.to_string();
    }

    pub fn clear_sync_error(&mut self, path: &Path) {
        if let Some(record) = self.files.get_mut(path) {
            record.last_sync_error_message.clear();
        }
    }

    pub fn remove_file(&mut self, path: &Path) {
        self.files.remove(path);
    }

    pub fn save(&self, state_path: &Path) -> Result<()> {
        state::save_records(state_path, &self.files)
    }

    pub fn load(&mut self, state_path: &Path) -> Result<()> {
        self.files = state::load_records(state_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn scan_registers_all_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "hello\n");
        let b = write(dir.path(), "sub/b.txt", "world");

        let mut manager = FileManager::new(dir.path().to_path_buf());
        manager.scan().unwrap();

        assert_eq!(manager.records().len(), 2);
        assert_eq!(manager.record(&a).unwrap().hash, hash::content_hash(b"hello\n"));
        assert_eq!(manager.record(&b).unwrap().size, 5);
    }

    #[test]
    fn scan_skips_ignored_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.txt", "x");
        write(dir.path(), ".git/HEAD", "ref");
        write(dir.path(), "node_modules/pkg/index.js", "{}");
        write(dir.path(), "junk.tmp", "x");
        write(dir.path(), ".catapult/conflicts/keep.txt.local", "x");

        let mut manager = FileManager::new(dir.path().to_path_buf());
        manager.scan().unwrap();

        assert_eq!(manager.records().len(), 1);
        assert!(manager.record(&dir.path().join("keep.txt")).is_some());
    }

    #[test]
    fn rescan_preserves_sync_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "v1");

        let mut manager = FileManager::new(dir.path().to_path_buf());
        manager.scan().unwrap();
        manager.update_sync_info(&a, "remote-id-1").unwrap();

        write(dir.path(), "a.txt", "v2");
        manager.scan().unwrap();

        let record = manager.record(&a).unwrap();
        assert_eq!(record.hash, hash::content_hash(b"v2"));
        assert_eq!(record.last_synced_hash, hash::content_hash(b"v1"));
        assert_eq!(record.last_synced_remote_id, "remote-id-1");
    }

    #[test]
    fn scan_keeps_shadow_records_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "v1");

        let mut manager = FileManager::new(dir.path().to_path_buf());
        manager.scan().unwrap();
        manager.update_sync_info(&a, "remote-id-1").unwrap();

        std::fs::remove_file(&a).unwrap();
        manager.scan().unwrap();

        // Still tracked; the reconciler decides what the absence means.
        assert!(manager.record(&a).is_some());
        assert!(!manager.record(&a).unwrap().deleted);
    }

    #[test]
    fn update_sync_info_clears_errors_and_moves_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "data");

        let mut manager = FileManager::new(dir.path().to_path_buf());
        manager.scan().unwrap();
        manager.record_sync_error(&a, "boom");
        manager.update_sync_info(&a, "rid").unwrap();

        let record = manager.record(&a).unwrap();
        assert_eq!(record.last_synced_hash, record.hash);
        assert_eq!(record.last_synced_remote_id, "rid");
        assert!(record.last_sync_error_message.is_empty());
    }

    #[test]
    fn record_sync_error_creates_shadow_when_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = FileManager::new(dir.path().to_path_buf());
        let ghost = dir.path().join("ghost.txt");

        manager.record_sync_error(&ghost, "upload failed");

        let record = manager.record(&ghost).unwrap();
        assert!(record.hash.is_empty());
        assert_eq!(record.last_sync_error_message, "upload failed");
    }

    #[test]
    fn relative_and_absolute_paths_round_trip() {
        let manager = FileManager::new(PathBuf::from("/base"));
        let abs = manager.absolute_path("sub/dir/c.txt");
        assert_eq!(abs, PathBuf::from("/base/sub/dir/c.txt"));
        assert_eq!(manager.relative_path(&abs), "sub/dir/c.txt");
    }

    #[test]
    fn state_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "data");
        let state_path = dir.path().join("state.json");

        let mut manager = FileManager::new(dir.path().to_path_buf());
        manager.scan().unwrap();
        manager.update_sync_info(&a, "rid").unwrap();
        manager.save(&state_path).unwrap();

        let mut reloaded = FileManager::new(dir.path().to_path_buf());
        reloaded.load(&state_path).unwrap();
        assert_eq!(reloaded.records(), manager.records());
    }
}
