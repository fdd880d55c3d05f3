//! GitHub-backed implementations of the remote capability traits.
//!
//! The gateway talks to the repository contents API, the issue client to
//! the issues API, and the device flow to the OAuth device endpoints. All
//! of them translate HTTP outcomes into the closed error taxonomy in
//! `catapult-core`; nothing above this crate sees a status code.

mod api;
mod auth;
mod client;
mod issues;

pub use auth::{DeviceAuthorization, DeviceFlow};
pub use client::GitHubClient;
pub use issues::GitHubIssues;
