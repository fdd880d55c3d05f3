//! The synchronization engine.
//!
//! Wires the filesystem watcher, debouncer, connectivity probe, durable
//! operation queue and reconciler into a long-running manager, and keeps
//! recurring failures deduplicated into external tickets.

pub mod connectivity;
pub mod debounce;
pub mod error;
pub mod manager;
pub mod queue;
pub mod syncer;
pub mod tracker;
pub mod watcher;

pub use connectivity::ConnectivityChecker;
pub use debounce::Debouncer;
pub use error::{Result, SyncError};
pub use manager::AutoSyncManager;
pub use queue::{OperationKind, OperationQueue, QueuedOperation};
pub use syncer::{SyncFailure, SyncOutcome, Syncer};
pub use tracker::{IssueCategory, IssueTracker};
