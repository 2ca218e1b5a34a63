pub mod github;
pub mod queries;
pub mod wire;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CheckRun, PullRequestDescriptor, PullRequestPage, RepositoryPage};

/// The remote seam the scanner and remediator depend on. One
/// implementation talks to GitHub; tests substitute their own.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Total repository count for the organization, for progress sizing.
    async fn count_repositories(&self, org: &str) -> Result<u64>;

    /// One page of the organization's repositories with their open-PR
    /// counts.
    async fn page_repositories(&self, org: &str, cursor: Option<&str>) -> Result<RepositoryPage>;

    /// One page of a repository's open pull requests with merge state and
    /// check rollup.
    async fn page_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        cursor: Option<&str>,
    ) -> Result<PullRequestPage>;

    /// Fetch a single pull request by number.
    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestDescriptor>;

    /// Full message of the PR's first commit, if any.
    async fn fetch_first_commit(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<String>>;

    /// Set the PR title.
    async fn update_title(&self, owner: &str, repo: &str, number: u64, title: &str) -> Result<()>;

    /// Set the PR body.
    async fn update_body(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<()>;

    /// Post a comment on the PR.
    async fn post_comment(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<()>;

    /// Check runs for a commit.
    async fn list_check_runs(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<CheckRun>>;

    /// Re-request one check run.
    async fn rerun_check(&self, owner: &str, repo: &str, check_run_id: u64) -> Result<()>;
}
