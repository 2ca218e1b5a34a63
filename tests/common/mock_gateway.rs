//! Mock gateway for driving the scanner and remediator in tests.
//!
//! Repositories and pull requests are registered up front; every mutating
//! call gets recorded so tests can assert on exactly what would have
//! reached GitHub. Not every helper is used by every test binary.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pr_mend::error::{AppError, Result};
use pr_mend::gateway::Gateway;
use pr_mend::model::{
    CheckRun, PullRequestDescriptor, PullRequestPage, RepositoryPage, RepositorySummary,
};

use super::repo_ref;

/// How an injected failure presents itself to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Auth or rate-limit response, the class the scanner's
    /// consecutive-failure detector counts.
    Throttle,
    /// Any other API error.
    Api,
}

impl FailureMode {
    fn as_error(self, what: &str) -> AppError {
        match self {
            FailureMode::Throttle => {
                AppError::GatewayThrottled(format!("HTTP 403: rate limited on {what}"))
            }
            FailureMode::Api => AppError::GitHubApi(format!("injected failure on {what}")),
        }
    }
}

/// Call record for `update_title`, `update_body`, and `post_comment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCall {
    pub number: u64,
    pub value: String,
}

pub struct MockGateway {
    repos: Mutex<Vec<(RepositorySummary, Vec<PullRequestDescriptor>)>>,
    repo_page_size: usize,
    pr_page_size: usize,
    pr_page_delay: Option<Duration>,
    // Response maps
    first_commits: Mutex<HashMap<(String, u64), String>>,
    check_runs: Mutex<HashMap<String, Vec<CheckRun>>>,
    // Error injection
    count_failure: Mutex<Option<FailureMode>>,
    repo_page_failure: Mutex<Option<FailureMode>>,
    pr_page_failures: Mutex<HashMap<String, FailureMode>>,
    first_commit_failure: Mutex<Option<FailureMode>>,
    title_failure: Mutex<Option<FailureMode>>,
    body_failure: Mutex<Option<FailureMode>>,
    comment_failure: Mutex<Option<FailureMode>>,
    // Call tracking
    pr_page_calls: Mutex<Vec<String>>,
    title_updates: Mutex<Vec<MetadataCall>>,
    body_updates: Mutex<Vec<MetadataCall>>,
    comments: Mutex<Vec<MetadataCall>>,
    check_run_queries: Mutex<Vec<String>>,
    rerun_ids: Mutex<Vec<u64>>,
    // Concurrency probe for page_pull_requests
    inflight_pr_pages: AtomicUsize,
    pr_page_high_water: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            repos: Mutex::new(Vec::new()),
            repo_page_size: 100,
            pr_page_size: 100,
            pr_page_delay: None,
            first_commits: Mutex::new(HashMap::new()),
            check_runs: Mutex::new(HashMap::new()),
            count_failure: Mutex::new(None),
            repo_page_failure: Mutex::new(None),
            pr_page_failures: Mutex::new(HashMap::new()),
            first_commit_failure: Mutex::new(None),
            title_failure: Mutex::new(None),
            body_failure: Mutex::new(None),
            comment_failure: Mutex::new(None),
            pr_page_calls: Mutex::new(Vec::new()),
            title_updates: Mutex::new(Vec::new()),
            body_updates: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            check_run_queries: Mutex::new(Vec::new()),
            rerun_ids: Mutex::new(Vec::new()),
            inflight_pr_pages: AtomicUsize::new(0),
            pr_page_high_water: AtomicUsize::new(0),
        }
    }

    /// Serve repository and PR listings in pages of the given sizes
    /// instead of all at once.
    pub fn paged(mut self, repo_page_size: usize, pr_page_size: usize) -> Self {
        self.repo_page_size = repo_page_size;
        self.pr_page_size = pr_page_size;
        self
    }

    /// Hold every `page_pull_requests` call open for the given duration so
    /// tests can observe concurrency.
    pub fn with_pr_page_delay(mut self, delay: Duration) -> Self {
        self.pr_page_delay = Some(delay);
        self
    }

    // === Setup ===

    pub fn add_repo(&self, name: &str, pull_requests: Vec<PullRequestDescriptor>) {
        let summary = RepositorySummary {
            repo: repo_ref(name),
            open_pull_requests: pull_requests.len() as u64,
        };
        self.repos.lock().unwrap().push((summary, pull_requests));
    }

    /// A repository reporting zero open pull requests.
    pub fn add_empty_repo(&self, name: &str) {
        self.add_repo(name, Vec::new());
    }

    /// An archived repository; its PRs must never be fetched.
    pub fn add_archived_repo(&self, name: &str, pull_requests: Vec<PullRequestDescriptor>) {
        let mut repo = repo_ref(name);
        repo.is_archived = true;
        let summary = RepositorySummary {
            repo,
            open_pull_requests: pull_requests.len() as u64,
        };
        self.repos.lock().unwrap().push((summary, pull_requests));
    }

    pub fn set_first_commit(&self, repo: &str, number: u64, message: &str) {
        self.first_commits
            .lock()
            .unwrap()
            .insert((repo.to_string(), number), message.to_string());
    }

    pub fn set_check_runs(&self, sha: &str, runs: Vec<CheckRun>) {
        self.check_runs.lock().unwrap().insert(sha.to_string(), runs);
    }

    // === Error injection ===

    pub fn fail_repository_count(&self, mode: FailureMode) {
        *self.count_failure.lock().unwrap() = Some(mode);
    }

    pub fn fail_repository_pages(&self, mode: FailureMode) {
        *self.repo_page_failure.lock().unwrap() = Some(mode);
    }

    /// Make `page_pull_requests` fail for one repository.
    pub fn fail_pull_request_pages(&self, repo: &str, mode: FailureMode) {
        self.pr_page_failures
            .lock()
            .unwrap()
            .insert(repo.to_string(), mode);
    }

    pub fn fail_first_commit(&self, mode: FailureMode) {
        *self.first_commit_failure.lock().unwrap() = Some(mode);
    }

    pub fn fail_title_updates(&self, mode: FailureMode) {
        *self.title_failure.lock().unwrap() = Some(mode);
    }

    pub fn fail_body_updates(&self, mode: FailureMode) {
        *self.body_failure.lock().unwrap() = Some(mode);
    }

    pub fn fail_comments(&self, mode: FailureMode) {
        *self.comment_failure.lock().unwrap() = Some(mode);
    }

    // === Call tracking accessors ===

    pub fn get_pr_page_calls(&self) -> Vec<String> {
        self.pr_page_calls.lock().unwrap().clone()
    }

    pub fn get_title_updates(&self) -> Vec<MetadataCall> {
        self.title_updates.lock().unwrap().clone()
    }

    pub fn get_body_updates(&self) -> Vec<MetadataCall> {
        self.body_updates.lock().unwrap().clone()
    }

    pub fn get_comments(&self) -> Vec<MetadataCall> {
        self.comments.lock().unwrap().clone()
    }

    pub fn get_check_run_queries(&self) -> Vec<String> {
        self.check_run_queries.lock().unwrap().clone()
    }

    pub fn get_rerun_ids(&self) -> Vec<u64> {
        self.rerun_ids.lock().unwrap().clone()
    }

    /// Most `page_pull_requests` calls ever in flight at once.
    pub fn pr_page_high_water(&self) -> usize {
        self.pr_page_high_water.load(Ordering::SeqCst)
    }

    // === Assertion helpers ===

    pub fn assert_no_remote_mutations(&self) {
        assert!(
            self.get_title_updates().is_empty(),
            "expected no title updates"
        );
        assert!(
            self.get_body_updates().is_empty(),
            "expected no body updates"
        );
        assert!(self.get_comments().is_empty(), "expected no comments");
        assert!(self.get_rerun_ids().is_empty(), "expected no check re-runs");
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn count_repositories(&self, _org: &str) -> Result<u64> {
        if let Some(mode) = *self.count_failure.lock().unwrap() {
            return Err(mode.as_error("repository count"));
        }
        Ok(self.repos.lock().unwrap().len() as u64)
    }

    async fn page_repositories(&self, _org: &str, cursor: Option<&str>) -> Result<RepositoryPage> {
        if let Some(mode) = *self.repo_page_failure.lock().unwrap() {
            return Err(mode.as_error("repository page"));
        }
        let repos = self.repos.lock().unwrap();
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + self.repo_page_size).min(repos.len());
        let has_next = end < repos.len();
        Ok(RepositoryPage {
            repositories: repos[start..end]
                .iter()
                .map(|(summary, _)| summary.clone())
                .collect(),
            end_cursor: has_next.then(|| end.to_string()),
            has_next_page: has_next,
        })
    }

    async fn page_pull_requests(
        &self,
        _owner: &str,
        repo: &str,
        cursor: Option<&str>,
    ) -> Result<PullRequestPage> {
        self.pr_page_calls.lock().unwrap().push(repo.to_string());

        let inflight = self.inflight_pr_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.pr_page_high_water.fetch_max(inflight, Ordering::SeqCst);
        if let Some(delay) = self.pr_page_delay {
            tokio::time::sleep(delay).await;
        }
        self.inflight_pr_pages.fetch_sub(1, Ordering::SeqCst);

        let injected = self.pr_page_failures.lock().unwrap().get(repo).copied();
        if let Some(mode) = injected {
            return Err(mode.as_error("pull request page"));
        }

        let repos = self.repos.lock().unwrap();
        let Some((_, pull_requests)) = repos.iter().find(|(s, _)| s.repo.name == repo) else {
            return Err(AppError::Discovery(format!("unknown repository: {repo}")));
        };
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + self.pr_page_size).min(pull_requests.len());
        let has_next = end < pull_requests.len();
        Ok(PullRequestPage {
            pull_requests: pull_requests[start..end].to_vec(),
            end_cursor: has_next.then(|| end.to_string()),
            has_next_page: has_next,
        })
    }

    async fn fetch_pull_request(
        &self,
        _owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestDescriptor> {
        let repos = self.repos.lock().unwrap();
        repos
            .iter()
            .find(|(s, _)| s.repo.name == repo)
            .and_then(|(_, prs)| prs.iter().find(|pr| pr.number == number))
            .cloned()
            .ok_or_else(|| AppError::Discovery(format!("unknown pull request: {repo}#{number}")))
    }

    async fn fetch_first_commit(
        &self,
        _owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<String>> {
        if let Some(mode) = *self.first_commit_failure.lock().unwrap() {
            return Err(mode.as_error("first commit"));
        }
        Ok(self
            .first_commits
            .lock()
            .unwrap()
            .get(&(repo.to_string(), number))
            .cloned())
    }

    async fn update_title(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        title: &str,
    ) -> Result<()> {
        if let Some(mode) = *self.title_failure.lock().unwrap() {
            return Err(mode.as_error("title update"));
        }
        self.title_updates.lock().unwrap().push(MetadataCall {
            number,
            value: title.to_string(),
        });
        Ok(())
    }

    async fn update_body(&self, _owner: &str, _repo: &str, number: u64, body: &str) -> Result<()> {
        if let Some(mode) = *self.body_failure.lock().unwrap() {
            return Err(mode.as_error("body update"));
        }
        self.body_updates.lock().unwrap().push(MetadataCall {
            number,
            value: body.to_string(),
        });
        Ok(())
    }

    async fn post_comment(&self, _owner: &str, _repo: &str, number: u64, body: &str) -> Result<()> {
        if let Some(mode) = *self.comment_failure.lock().unwrap() {
            return Err(mode.as_error("comment"));
        }
        self.comments.lock().unwrap().push(MetadataCall {
            number,
            value: body.to_string(),
        });
        Ok(())
    }

    async fn list_check_runs(&self, _owner: &str, _repo: &str, sha: &str) -> Result<Vec<CheckRun>> {
        self.check_run_queries.lock().unwrap().push(sha.to_string());
        Ok(self
            .check_runs
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .unwrap_or_default())
    }

    async fn rerun_check(&self, _owner: &str, _repo: &str, check_run_id: u64) -> Result<()> {
        self.rerun_ids.lock().unwrap().push(check_run_id);
        Ok(())
    }
}
