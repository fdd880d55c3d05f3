//! Deduplicated external problem reporting.
//!
//! Recurring sync failures collapse into a bounded number of tickets. A
//! failure is categorized (typed taxonomy first, message keywords as the
//! fallback), mapped to a deterministic title, and either appended to the
//! matching cached ticket or opened as a new one while the ceiling allows.

use catapult_core::{IssueStore, IssuesConfig, RemoteError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::syncer::SyncFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Conflict,
    Network,
    Permission,
    Authentication,
    Corruption,
    Quota,
    Unknown,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Conflict => "conflict",
            IssueCategory::Network => "network",
            IssueCategory::Permission => "permission",
            IssueCategory::Authentication => "authentication",
            IssueCategory::Corruption => "corruption",
            IssueCategory::Quota => "quota",
            IssueCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure. The typed taxonomy decides where it can; `Api` and
/// untyped failures fall back to message keywords.
pub fn categorize(remote: Option<&RemoteError>, message: &str) -> IssueCategory {
    match remote {
        Some(RemoteError::Transport { .. }) => IssueCategory::Network,
        Some(RemoteError::Permission { .. }) => IssueCategory::Permission,
        Some(RemoteError::FileTooLarge { .. }) => IssueCategory::Quota,
        Some(RemoteError::Validation { .. }) => IssueCategory::Corruption,
        Some(RemoteError::Api { status: 401, .. }) => IssueCategory::Authentication,
        _ => categorize_message(message),
    }
}

/// Keyword fallback for failures the taxonomy leaves ambiguous.
pub fn categorize_message(message: &str) -> IssueCategory {
    let lower = message.to_lowercase();
    if lower.contains("conflict") {
        IssueCategory::Conflict
    } else if lower.contains("credential")
        || lower.contains("token")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        IssueCategory::Authentication
    } else if lower.contains("permission") || lower.contains("forbidden") {
        IssueCategory::Permission
    } else if lower.contains("quota") || lower.contains("too large") || lower.contains("space") {
        IssueCategory::Quota
    } else if lower.contains("corrupt") || lower.contains("invalid") {
        IssueCategory::Corruption
    } else if lower.contains("network")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("unreachable")
    {
        IssueCategory::Network
    } else {
        IssueCategory::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Updated,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub key: String,
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    pub category: IssueCategory,
    pub files: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

pub struct IssueTracker {
    config: IssuesConfig,
    store: Arc<dyn IssueStore>,
    cache: RwLock<HashMap<String, TrackedIssue>>,
}

impl IssueTracker {
    pub fn new(config: IssuesConfig, store: Arc<dyn IssueStore>) -> Self {
        Self {
            config,
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Report every failure of a batch, one ticket per category group.
    pub async fn report_failures(&self, failures: &[SyncFailure]) -> Result<()> {
        if failures.is_empty() || !self.config.enabled {
            return Ok(());
        }

        let mut groups: HashMap<IssueCategory, (String, Vec<String>)> = HashMap::new();
        for failure in failures {
            let category = categorize(failure.remote_error.as_ref(), &failure.message);
            let group = groups
                .entry(category)
                .or_insert_with(|| (failure.message.clone(), Vec::new()));
            group.1.push(failure.path.clone());
        }

        for (category, (message, mut files)) in groups {
            files.sort();
            files.dedup();
            self.report(category, &message, files).await?;
        }
        Ok(())
    }

    /// Report one problem. Dedup is by final title: a cached ticket with the
    /// same title gets a comment (and is reopened when closed); otherwise a
    /// new ticket is created while the open ceiling allows.
    pub async fn report(
        &self,
        category: IssueCategory,
        message: &str,
        files: Vec<String>,
    ) -> Result<()> {
        if !self.config.enabled || !self.config.auto_create {
            return Ok(());
        }

        let title = self.issue_title(category, &files);
        let key = issue_key(category, message, &files);

        // Find the duplicate under the read lock, then talk to the remote
        // without holding it.
        let existing = {
            let cache = self.cache.read().await;
            cache.values().find(|i| i.title == title).cloned()
        };

        if let Some(existing) = existing {
            let reopen = matches!(existing.state, IssueState::Closed | IssueState::Resolved);
            if reopen {
                self.store.set_issue_state(existing.number, true).await?;
                info!(number = existing.number, "reopened recurring issue");
            }
            self.store
                .comment_issue(existing.number, &self.recurrence_comment(message, &files))
                .await?;

            let mut cache = self.cache.write().await;
            if let Some(entry) = cache.get_mut(&existing.key) {
                entry.state = if reopen { IssueState::Open } else { IssueState::Updated };
                entry.last_seen = Utc::now();
            }
            return Ok(());
        }

        let open_count = {
            let cache = self.cache.read().await;
            cache
                .values()
                .filter(|i| matches!(i.state, IssueState::Open | IssueState::Updated))
                .count()
        };
        if open_count >= self.config.max_open_issues {
            warn!(
                ceiling = self.config.max_open_issues,
                category = %category,
                "open issue ceiling reached, dropping report"
            );
            return Ok(());
        }

        let body = self.issue_body(category, message, &files);
        let created = self
            .store
            .create_issue(&title, &body, &self.config.labels, &self.config.assignees)
            .await?;
        debug!(number = created.number, %category, "filed new issue");

        let mut cache = self.cache.write().await;
        cache.insert(
            key.clone(),
            TrackedIssue {
                key,
                number: created.number,
                title,
                state: IssueState::Open,
                category,
                files,
                last_seen: Utc::now(),
            },
        );
        Ok(())
    }

    /// Mark tickets whose problems stopped recurring. Close them remotely
    /// when auto-resolve is on.
    pub async fn resolve_stale(&self, quiet_for: Duration) -> Result<usize> {
        if !self.config.auto_resolve {
            return Ok(0);
        }
        let cutoff =
            Utc::now() - ChronoDuration::from_std(quiet_for).unwrap_or_else(|_| ChronoDuration::hours(1));

        let to_resolve: Vec<(String, u64)> = {
            let cache = self.cache.read().await;
            cache
                .values()
                .filter(|i| {
                    matches!(i.state, IssueState::Open | IssueState::Updated)
                        && i.last_seen < cutoff
                })
                .map(|i| (i.key.clone(), i.number))
                .collect()
        };

        for (key, number) in &to_resolve {
            self.store
                .comment_issue(*number, "No recurrence observed; closing automatically.")
                .await?;
            self.store.set_issue_state(*number, false).await?;
            let mut cache = self.cache.write().await;
            if let Some(entry) = cache.get_mut(key) {
                entry.state = IssueState::Resolved;
            }
            info!(number, "auto-resolved quiet issue");
        }
        Ok(to_resolve.len())
    }

    /// Forget closed and resolved tickets untouched for longer than
    /// `max_age`.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff =
            Utc::now() - ChronoDuration::from_std(max_age).unwrap_or_else(|_| ChronoDuration::hours(24));
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, i| {
            !(matches!(i.state, IssueState::Closed | IssueState::Resolved) && i.last_seen < cutoff)
        });
        before - cache.len()
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    fn issue_title(&self, category: IssueCategory, files: &[String]) -> String {
        if self.config.include_file_names && files.len() == 1 {
            format!("Sync failure ({category}): {}", files[0])
        } else {
            format!("Sync failure ({category}): {} files affected", files.len())
        }
    }

    fn issue_body(&self, category: IssueCategory, message: &str, files: &[String]) -> String {
        let mut body = format!(
            "Automatic report from catapult.\n\nCategory: `{category}`\n"
        );
        if self.config.include_error_details {
            body.push_str(&format!("\nError:\n```\n{message}\n```\n"));
        }
        if self.config.include_file_names && !files.is_empty() {
            body.push_str("\nAffected files:\n");
            for file in files {
                body.push_str(&format!("- `{file}`\n"));
            }
        }
        if self.config.include_system_info {
            body.push_str(&format!(
                "\nSystem: {} {}\n",
                std::env::consts::OS,
                std::env::consts::ARCH
            ));
        }
        body
    }

    fn recurrence_comment(&self, message: &str, files: &[String]) -> String {
        let mut comment = format!("Recurred at {}.\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        if self.config.include_error_details {
            comment.push_str(&format!("\n```\n{message}\n```\n"));
        }
        if self.config.include_file_names && !files.is_empty() {
            comment.push_str(&format!("\nAffected: {}\n", files.join(", ")));
        }
        comment
    }
}

/// Stable identity of a problem: category, message and the sorted file
/// list, hashed and truncated.
pub fn issue_key(category: IssueCategory, message: &str, files: &[String]) -> String {
    let mut sorted = files.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update(message.as_bytes());
    for file in &sorted {
        hasher.update(file.as_bytes());
    }
    hex::encode(hasher.finalize())[..12].to_string()
}
