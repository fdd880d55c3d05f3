//! User configuration.
//!
//! One YAML file under `~/.catapult/config.yaml`, written back with
//! user-only permissions because it carries the access token after
//! authentication. Every field has a default so a missing file or a
//! partially filled one both work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::state::restrict_permissions;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub repository: RepositoryConfig,
    pub issues: IssuesConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    /// OAuth application client id used for device-flow authentication.
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Populated after `catapult init`.
    pub token: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            scopes: vec!["repo".to_string()],
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
    pub state_path: PathBuf,
    pub queue_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("~/Catapult"),
            state_path: PathBuf::from("~/.catapult/state.json"),
            queue_path: PathBuf::from("~/.catapult/queue.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub name: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "catapult-folder".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IssuesConfig {
    pub enabled: bool,
    /// Repository tickets are filed against; empty means the sync
    /// repository itself.
    pub repository: String,
    pub auto_create: bool,
    pub auto_resolve: bool,
    pub include_file_names: bool,
    pub include_error_details: bool,
    pub include_system_info: bool,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub max_open_issues: usize,
    pub resolution_check_interval_secs: u64,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository: String::new(),
            auto_create: true,
            auto_resolve: true,
            include_file_names: true,
            include_error_details: true,
            include_system_info: false,
            labels: vec!["catapult".to_string(), "auto-generated".to_string()],
            assignees: Vec::new(),
            max_open_issues: 10,
            resolution_check_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub debounce_secs: u64,
    pub poll_interval_secs: u64,
    pub drain_interval_secs: u64,
    pub retry_attempts: u32,
    pub max_queue_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_secs: 2,
            poll_interval_secs: 300,
            drain_interval_secs: 30,
            retry_attempts: 3,
            max_queue_size: 100,
        }
    }
}

impl Config {
    /// `~/.catapult/config.yaml`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(home_dir()?.join(".catapult").join("config.yaml"))
    }

    /// Read the config, or defaults when the file does not exist yet.
    /// All `~/` paths come back expanded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => serde_yaml_ng::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        config.expand_paths()?;
        Ok(config)
    }

    /// Write the config with user-only permissions, enforced on every save
    /// since the file holds the token.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_yaml_ng::to_string(self)?;
        std::fs::write(path, text)?;
        restrict_permissions(path)?;
        Ok(())
    }

    /// Repository the issue tracker files tickets against.
    pub fn issue_repository(&self) -> &str {
        if self.issues.repository.is_empty() {
            &self.repository.name
        } else {
            &self.issues.repository
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.storage.base_dir = expand_tilde(&self.storage.base_dir)?;
        self.storage.state_path = expand_tilde(&self.storage.state_path)?;
        self.storage.queue_path = expand_tilde(&self.storage.queue_path)?;
        Ok(())
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::Config("HOME directory not found".to_string()))
}

/// Expand a leading `~/` against the home directory.
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.remote.scopes, vec!["repo"]);
        assert_eq!(config.repository.name, "catapult-folder");
        assert!(config.issues.enabled);
        assert_eq!(config.issues.max_open_issues, 10);
        assert_eq!(config.issues.labels, vec!["catapult", "auto-generated"]);
        assert_eq!(config.sync.debounce_secs, 2);
        assert_eq!(config.sync.poll_interval_secs, 300);
    }

    #[test]
    fn issue_repository_falls_back_to_sync_repository() {
        let mut config = Config::default();
        assert_eq!(config.issue_repository(), "catapult-folder");
        config.issues.repository = "catapult-issues".to_string();
        assert_eq!(config.issue_repository(), "catapult-issues");
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let text = "repository:\n  name: my-folder\nissues:\n  enabled: false\n";
        let config: Config = serde_yaml_ng::from_str(text).unwrap();
        assert_eq!(config.repository.name, "my-folder");
        assert!(!config.issues.enabled);
        assert_eq!(config.sync.retry_attempts, 3);
        assert_eq!(config.remote.scopes, vec!["repo"]);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.remote.client_id = "abc".to_string();
        config.remote.token = "tok".to_string();
        config.storage.base_dir = dir.path().join("Catapult");
        config.storage.state_path = dir.path().join("state.json");
        config.storage.queue_path = dir.path().join("queue.json");
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn tilde_expansion() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_tilde(Path::new("~/Catapult")).unwrap(),
            home.join("Catapult")
        );
        assert_eq!(
            expand_tilde(Path::new("/abs/path")).unwrap(),
            PathBuf::from("/abs/path")
        );
    }
}
