use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::model::GitIdentity;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    /// Personal or installation access token. CLI flag and GITHUB_TOKEN
    /// override this.
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            token: None,
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Repositories scanned concurrently.
    #[serde(default = "default_repo_tasks")]
    pub repo_tasks: usize,
    /// PR pages fetched concurrently across all repositories.
    #[serde(default = "default_page_tasks")]
    pub page_tasks: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Bound on descriptors buffered between scanner and workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            repo_tasks: default_repo_tasks(),
            page_tasks: default_page_tasks(),
            page_size: default_page_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            base_dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_git_user_name")]
    pub user_name: String,
    #[serde(default = "default_git_user_email")]
    pub user_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            user_name: default_git_user_name(),
            user_email: default_git_user_email(),
        }
    }
}

impl GitConfig {
    pub fn identity(&self) -> GitIdentity {
        GitIdentity {
            name: self.user_name.clone(),
            email: self.user_email.clone(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_repo_tasks() -> usize {
    8
}

fn default_page_tasks() -> usize {
    16
}

fn default_page_size() -> u32 {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/tmp/pr-mend-workspaces")
}

fn default_git_user_name() -> String {
    "pr-mend".to_string()
}

fn default_git_user_email() -> String {
    "pr-mend@users.noreply.github.com".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("pr-mend").required(false));
        }

        // Environment variable overrides with PR_MEND_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PR_MEND")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Token from config; callers layer the CLI flag and GITHUB_TOKEN on
    /// top.
    pub fn github_token(&self) -> Option<&str> {
        self.github.token.as_deref()
    }
}
