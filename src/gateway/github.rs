use async_trait::async_trait;
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::gateway::{queries, wire, Gateway};
use crate::model::{CheckRun, PullRequestDescriptor, PullRequestPage, RepositoryPage, RepositoryRef};

/// Repositories fetched per org page. PR pages use the configured page
/// size instead.
const REPOS_PER_PAGE: u32 = 50;

const API_VERSION: &str = "2022-11-28";

/// GitHub-backed gateway: GraphQL and typed REST through octocrab, plus
/// raw HTTP for the check-runs endpoints octocrab does not cover.
pub struct GitHubGateway {
    client: Octocrab,
    http: reqwest::Client,
    token: String,
    api_url: String,
    page_size: u32,
}

impl GitHubGateway {
    pub fn new(api_url: &str, token: &str, page_size: u32) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(api_url)
            .map_err(|e| AppError::Config(format!("Invalid API URL {api_url}: {e}")))?
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent("pr-mend")
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            http,
            token: token.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            page_size,
        })
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let response: wire::GraphQlResponse<T> = self
            .client
            .graphql(&serde_json::json!({
                "query": query,
                "variables": variables,
            }))
            .await?;
        wire::into_data(response)
    }

    fn classify_http_failure(status: reqwest::StatusCode, message: String) -> AppError {
        if matches!(status.as_u16(), 401 | 403 | 429) {
            AppError::GatewayThrottled(message)
        } else {
            AppError::GitHubApi(message)
        }
    }
}

#[async_trait]
impl Gateway for GitHubGateway {
    async fn count_repositories(&self, org: &str) -> Result<u64> {
        let data: wire::OrgRepositoriesData = self
            .graphql(
                queries::ORG_REPOSITORIES,
                serde_json::json!({ "org": org, "reposCursor": null, "pageSize": 1 }),
            )
            .await?;
        let organization = data
            .organization
            .ok_or_else(|| AppError::Discovery(format!("Organization not found: {org}")))?;
        Ok(organization.repositories.total_count)
    }

    async fn page_repositories(&self, org: &str, cursor: Option<&str>) -> Result<RepositoryPage> {
        let data: wire::OrgRepositoriesData = self
            .graphql(
                queries::ORG_REPOSITORIES,
                serde_json::json!({
                    "org": org,
                    "reposCursor": cursor,
                    "pageSize": REPOS_PER_PAGE,
                }),
            )
            .await?;
        let organization = data
            .organization
            .ok_or_else(|| AppError::Discovery(format!("Organization not found: {org}")))?;
        Ok(wire::map_repository_page(org, organization.repositories))
    }

    async fn page_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        cursor: Option<&str>,
    ) -> Result<PullRequestPage> {
        let data: wire::RepoPullRequestsData = self
            .graphql(
                queries::REPO_OPEN_PRS_PAGE,
                serde_json::json!({
                    "owner": owner,
                    "name": repo,
                    "prsCursor": cursor,
                    "pageSize": self.page_size,
                }),
            )
            .await?;
        let repository = data
            .repository
            .ok_or_else(|| AppError::Discovery(format!("Repository not found: {owner}/{repo}")))?;

        let repo_ref = RepositoryRef {
            owner: owner.to_string(),
            name: repo.to_string(),
            is_archived: false,
        };
        let connection = repository.pull_requests;
        let pull_requests = connection
            .nodes
            .into_iter()
            .map(|node| wire::map_pull_request(&repo_ref, node))
            .collect();
        Ok(PullRequestPage {
            pull_requests,
            end_cursor: connection.page_info.end_cursor,
            has_next_page: connection.page_info.has_next_page,
        })
    }

    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestDescriptor> {
        let data: wire::SinglePullRequestData = self
            .graphql(
                queries::PR_WITH_STATUS,
                serde_json::json!({ "owner": owner, "name": repo, "number": number }),
            )
            .await?;
        let node = data
            .repository
            .and_then(|r| r.pull_request)
            .ok_or_else(|| {
                AppError::GitHubApi(format!("Pull request not found: {owner}/{repo}#{number}"))
            })?;
        let repo_ref = RepositoryRef {
            owner: owner.to_string(),
            name: repo.to_string(),
            is_archived: false,
        };
        Ok(wire::map_pull_request(&repo_ref, node))
    }

    async fn fetch_first_commit(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<String>> {
        let data: wire::FirstCommitData = self
            .graphql(
                queries::PR_FIRST_COMMIT,
                serde_json::json!({ "owner": owner, "name": repo, "number": number }),
            )
            .await?;
        Ok(wire::first_commit_message(data))
    }

    async fn update_title(&self, owner: &str, repo: &str, number: u64, title: &str) -> Result<()> {
        debug!(pr = number, repo = %format!("{owner}/{repo}"), "updating PR title");
        self.client
            .pulls(owner, repo)
            .update(number)
            .title(title)
            .send()
            .await?;
        Ok(())
    }

    async fn update_body(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<()> {
        debug!(pr = number, repo = %format!("{owner}/{repo}"), "updating PR body");
        self.client
            .pulls(owner, repo)
            .update(number)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn post_comment(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<()> {
        self.client
            .issues(owner, repo)
            .create_comment(number, body)
            .await?;
        Ok(())
    }

    async fn list_check_runs(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<CheckRun>> {
        #[derive(Deserialize)]
        struct CheckRunsResponse {
            #[serde(default)]
            check_runs: Vec<RawCheckRun>,
        }

        #[derive(Deserialize)]
        struct RawCheckRun {
            id: u64,
            name: String,
            status: String,
            conclusion: Option<String>,
        }

        let url = format!("{}/repos/{owner}/{repo}/commits/{sha}/check-runs", self.api_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_http_failure(
                status,
                format!("Failed to fetch check runs ({status}): {text}"),
            ));
        }

        let parsed: CheckRunsResponse = response.json().await?;
        Ok(parsed
            .check_runs
            .into_iter()
            .map(|run| CheckRun {
                id: run.id,
                name: run.name,
                status: run.status,
                conclusion: run.conclusion,
            })
            .collect())
    }

    async fn rerun_check(&self, owner: &str, repo: &str, check_run_id: u64) -> Result<()> {
        let url = format!(
            "{}/repos/{owner}/{repo}/check-runs/{check_run_id}/rerequest",
            self.api_url
        );
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_http_failure(
                status,
                format!("Failed to re-request check run {check_run_id} ({status}): {text}"),
            ));
        }
        Ok(())
    }
}
