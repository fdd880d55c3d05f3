use thiserror::Error;

/// Failures surfaced by the remote gateway.
///
/// This is a closed set: every remote operation resolves to exactly one of
/// these variants, and each variant carries the context needed to print a
/// useful diagnosis. Implementations must not invent new kinds through
/// string-typed side channels.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{path}: file is {size} bytes, above the {limit} byte upload ceiling")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("{path}: rejected by the server: {message}")]
    Validation { path: String, message: String },

    #[error("permission denied: {message}")]
    Permission { message: String },

    #[error("repository unavailable: {message}")]
    Repository { message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network failure: {message}")]
    Transport { message: String },
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::Transport { message: message.into() }
    }

    /// True for failures worth retrying once connectivity recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport { .. } | RemoteError::Api { status: 500..=599, .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown file: {0}")]
    UnknownFile(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
