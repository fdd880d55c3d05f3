//! User-facing failure output.
//!
//! Every gateway error kind gets a short diagnosis and a couple of
//! concrete next steps, printed to stderr so scripted callers can keep
//! parsing stdout.

use catapult_core::RemoteError;
use catapult_sync::SyncFailure;
use colored::*;

pub fn print_failure(failure: &SyncFailure) {
    match &failure.remote_error {
        Some(remote) => print_remote_error(&failure.path, remote),
        None => {
            eprintln!("  {} {}: {}", "✗".red(), failure.path.bold(), failure.message);
        }
    }
}

pub fn print_remote_error(path: &str, error: &RemoteError) {
    eprintln!("  {} {}: {}", "✗".red(), path.bold(), error);
    for hint in hints(error) {
        eprintln!("      {} {}", "→".cyan(), hint);
    }
}

fn hints(error: &RemoteError) -> Vec<&'static str> {
    match error {
        RemoteError::FileTooLarge { .. } => vec![
            "Keep files above 100 MiB out of the synchronized folder",
            "Use an external storage service for large assets",
        ],
        RemoteError::Validation { .. } => vec![
            "Rename the file to something the server accepts",
            "Check the file content for anything the host rejects",
        ],
        RemoteError::Permission { .. } => vec![
            "Run `catapult init` again to refresh the access token",
            "Make sure the token's scopes include `repo`",
        ],
        RemoteError::Repository { .. } => vec![
            "Run `catapult init` to create the repository",
            "Check `repository.name` in the configuration",
        ],
        RemoteError::Api { status, .. } if *status == 403 => vec![
            "The API rate limit may be exhausted; wait a few minutes and retry",
        ],
        RemoteError::Api { .. } => vec![
            "Retry shortly; transient server errors clear on their own",
        ],
        RemoteError::Transport { .. } => vec![
            "Check the network connection",
            "In watch mode the change is queued and retried automatically",
        ],
    }
}
