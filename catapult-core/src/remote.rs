//! Capability surfaces for the remote host.
//!
//! The sync engine consumes exactly these traits; concrete clients live in
//! their own crate and tests substitute in-memory doubles. Nothing here may
//! leak wire details.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::RemoteError;

/// One file as the remote store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Base-relative path with forward slashes.
    pub path: String,
    pub content: Vec<u8>,
    /// Opaque identifier the host assigns to these bytes. Predictable
    /// locally through [`crate::hash::remote_blob_id`].
    pub remote_id: String,
    pub size: u64,
}

/// The file store operations the synchronizer depends on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Idempotent. Creates the private repository if absent and waits until
    /// subsequent reads succeed.
    async fn ensure_repository_exists(&self) -> Result<(), RemoteError>;

    /// Full manifest of the default branch, path to file, directories
    /// traversed recursively.
    async fn get_all_files_with_content(&self) -> Result<HashMap<String, RemoteFile>, RemoteError>;

    async fn create_file(&self, path: &str, content: &[u8]) -> Result<(), RemoteError>;

    async fn update_file(&self, path: &str, content: &[u8]) -> Result<(), RemoteError>;

    async fn delete_file(&self, path: &str) -> Result<(), RemoteError>;

    async fn file_exists(&self, path: &str) -> Result<bool, RemoteError>;

    async fn get_file(&self, path: &str) -> Result<RemoteFile, RemoteError>;
}

/// An externally visible problem ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIssue {
    pub number: u64,
    pub title: String,
    /// "open" or "closed" as reported by the host.
    pub state: String,
    pub url: String,
}

/// The ticket operations the issue tracker depends on.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
        assignees: &[String],
    ) -> Result<RemoteIssue, RemoteError>;

    async fn comment_issue(&self, number: u64, body: &str) -> Result<(), RemoteError>;

    /// Reopen (`open = true`) or close an existing ticket.
    async fn set_issue_state(&self, number: u64, open: bool) -> Result<(), RemoteError>;

    async fn list_open_issues(&self, labels: &[String]) -> Result<Vec<RemoteIssue>, RemoteError>;
}
