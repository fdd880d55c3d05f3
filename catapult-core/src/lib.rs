pub mod config;
pub mod error;
pub mod files;
pub mod hash;
pub mod ignore;
pub mod remote;
pub mod state;
pub mod status;

pub use config::{Config, IssuesConfig, RemoteConfig, RepositoryConfig, StorageConfig, SyncSettings};
pub use error::{Error, RemoteError, Result};
pub use files::FileManager;
pub use ignore::IgnoreSet;
pub use remote::{IssueStore, RemoteFile, RemoteIssue, RemoteStore};
pub use state::FileRecord;
pub use status::FileStatus;
