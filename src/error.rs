use thiserror::Error;

use crate::model::SyncStrategy;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// Auth or rate-limit response (HTTP 401/403/429). A run of these is
    /// fatal to the scan.
    #[error("GitHub API throttled: {0}")]
    GatewayThrottled(String),

    #[error("Sync conflict during {strategy:?} in: {}", paths.join(", "))]
    SyncConflict {
        strategy: SyncStrategy,
        paths: Vec<String>,
    },

    #[error("Push lease failed for {branch}: remote is at {actual}, expected {expected}")]
    StaleLease {
        branch: String,
        expected: String,
        actual: String,
    },

    #[error("Remote mutation failed: {0}")]
    RemoteMutation(String),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for the error class the scanner's consecutive-failure
    /// detector counts.
    pub fn is_throttle(&self) -> bool {
        matches!(self, AppError::GatewayThrottled(_))
    }
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        if let octocrab::Error::GitHub { source, .. } = &e {
            let status = source.status_code.as_u16();
            if matches!(status, 401 | 403 | 429) {
                return AppError::GatewayThrottled(format!("HTTP {status}: {}", source.message));
            }
        }
        AppError::GitHubApi(e.to_string())
    }
}

impl From<git2::Error> for AppError {
    fn from(e: git2::Error) -> Self {
        AppError::Git(e.message().to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
