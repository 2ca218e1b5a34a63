use std::path::{Path, PathBuf};

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::model::PullRequestDescriptor;
use crate::workspace::git;

/// Hands out workspace directories, one per pull request under
/// remediation.
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

/// A cloned PR branch, exclusively owned by one remediation from checkout
/// to cleanup.
pub struct Workspace {
    pub path: PathBuf,
    pub branch: String,
    /// Remote tip observed at clone time; the lease for any later force
    /// push.
    pub head_sha: String,
    pub remote_url: String,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
        }
    }

    /// Clean up an existing workspace directory and ensure its parent exists.
    async fn prepare_workspace_dir(path: &Path) -> Result<()> {
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to clean workspace: {e}")))?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;
        }
        Ok(())
    }

    /// Clone the PR's head branch and fetch its base so sync has the base
    /// history to work against. A failed checkout leaves no directory
    /// behind.
    pub async fn checkout_pull_request(
        &self,
        pr: &PullRequestDescriptor,
        token: Option<&str>,
    ) -> Result<Workspace> {
        let workspace_path = self.workspace_path(pr);
        Self::prepare_workspace_dir(&workspace_path).await?;

        match Self::clone_and_fetch(&workspace_path, pr, token).await {
            Ok(head_sha) => Ok(Workspace {
                path: workspace_path,
                branch: pr.head_ref.clone(),
                head_sha,
                remote_url: pr.clone_url.clone(),
            }),
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&workspace_path).await;
                Err(e)
            }
        }
    }

    async fn clone_and_fetch(
        path: &Path,
        pr: &PullRequestDescriptor,
        token: Option<&str>,
    ) -> Result<String> {
        let head_sha = git::clone_pull_request(&pr.clone_url, path, &pr.head_ref, token).await?;
        git::fetch_branch(path, &pr.base_ref, token).await?;
        Ok(head_sha)
    }

    /// Remove the workspace directory. Called on every termination path,
    /// success or failure.
    pub async fn cleanup(&self, workspace: &Workspace) -> Result<()> {
        if workspace.path.exists() {
            tokio::fs::remove_dir_all(&workspace.path)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to cleanup workspace: {e}")))?;
        }
        Ok(())
    }

    fn workspace_path(&self, pr: &PullRequestDescriptor) -> PathBuf {
        let safe_name = pr.repo.full_name().replace('/', "__");
        self.base_dir.join(format!("{safe_name}__pr-{}", pr.number))
    }
}
