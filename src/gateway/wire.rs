//! Typed GraphQL response payloads and their mapping into domain types.
//! Only the fields the pipeline consumes are modeled; everything else in
//! the wire payload is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::model::{
    Mergeable, MergeState, PullRequestDescriptor, RepositoryPage, RepositoryRef,
    RepositorySummary,
};

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

/// Unwrap the envelope: GraphQL-level errors become API errors, with
/// RATE_LIMITED surfaced as the throttle class the scanner counts.
pub fn into_data<T>(response: GraphQlResponse<T>) -> Result<T> {
    if let Some(errors) = response.errors {
        if !errors.is_empty() {
            let rate_limited = errors
                .iter()
                .any(|e| e.error_type.as_deref() == Some("RATE_LIMITED"));
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            let joined = messages.join(", ");
            if rate_limited {
                return Err(AppError::GatewayThrottled(joined));
            }
            return Err(AppError::GitHubApi(format!("GraphQL error: {joined}")));
        }
    }
    response
        .data
        .ok_or_else(|| AppError::GitHubApi("No data in GraphQL response".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct OrgRepositoriesData {
    pub organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
pub struct Organization {
    pub repositories: RepositoryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConnection {
    #[serde(default)]
    pub total_count: u64,
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<RepoNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoNode {
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
    pub pull_requests: TotalCount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    #[serde(default)]
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RepoPullRequestsData {
    pub repository: Option<RepositoryPrs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPrs {
    pub pull_requests: PullRequestConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestConnection {
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<PrNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrNode {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub is_draft: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub head_ref_oid: String,
    pub mergeable: Option<String>,
    pub merge_state_status: Option<String>,
    pub commits: Option<CommitConnection>,
}

#[derive(Debug, Deserialize)]
pub struct CommitConnection {
    #[serde(default)]
    pub nodes: Vec<CommitNode>,
}

#[derive(Debug, Deserialize)]
pub struct CommitNode {
    pub commit: Option<CommitInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub message: Option<String>,
    pub status_check_rollup: Option<StatusCheckRollup>,
}

#[derive(Debug, Deserialize)]
pub struct StatusCheckRollup {
    pub contexts: Option<ContextConnection>,
}

#[derive(Debug, Deserialize)]
pub struct ContextConnection {
    #[serde(default)]
    pub nodes: Vec<ContextNode>,
}

/// A rollup entry. CheckRun and StatusContext carry different fields, so
/// everything is optional and `__typename` discriminates; unknown
/// typenames fall through untouched.
#[derive(Debug, Deserialize)]
pub struct ContextNode {
    #[serde(rename = "__typename")]
    pub typename: Option<String>,
    pub name: Option<String>,
    pub conclusion: Option<String>,
    pub context: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SinglePullRequestData {
    pub repository: Option<RepositoryPr>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPr {
    pub pull_request: Option<PrNode>,
}

#[derive(Debug, Deserialize)]
pub struct FirstCommitData {
    pub repository: Option<RepositoryFirstCommit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFirstCommit {
    pub pull_request: Option<PrCommits>,
}

#[derive(Debug, Deserialize)]
pub struct PrCommits {
    pub commits: CommitConnection,
}

pub fn parse_mergeable(raw: Option<&str>) -> Mergeable {
    match raw.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("MERGEABLE") => Mergeable::Mergeable,
        Some("CONFLICTING") => Mergeable::Conflicting,
        _ => Mergeable::Unknown,
    }
}

pub fn parse_merge_state(raw: Option<&str>) -> MergeState {
    match raw.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("BEHIND") => MergeState::Behind,
        Some("BLOCKED") => MergeState::Blocked,
        Some("CLEAN") => MergeState::Clean,
        Some("DIRTY") => MergeState::Dirty,
        Some("DRAFT") => MergeState::Draft,
        Some("HAS_HOOKS") => MergeState::HasHooks,
        Some("UNSTABLE") => MergeState::Unstable,
        _ => MergeState::Unknown,
    }
}

/// Names of failing entries in the last commit's rollup. CheckRun
/// conclusions are matched case-insensitively; entries without a
/// name/context are skipped.
fn extract_failing_checks(node: &PrNode) -> Vec<String> {
    let contexts = node
        .commits
        .as_ref()
        .and_then(|c| c.nodes.first())
        .and_then(|n| n.commit.as_ref())
        .and_then(|c| c.status_check_rollup.as_ref())
        .and_then(|r| r.contexts.as_ref())
        .map(|c| c.nodes.as_slice())
        .unwrap_or_default();

    let mut failing = Vec::new();
    for ctx in contexts {
        match ctx.typename.as_deref() {
            Some("CheckRun") => {
                let conclusion = ctx
                    .conclusion
                    .as_deref()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                let failed = matches!(
                    conclusion.as_str(),
                    "failure" | "cancelled" | "timed_out" | "action_required"
                );
                if failed {
                    if let Some(name) = ctx.name.as_deref().filter(|n| !n.is_empty()) {
                        failing.push(name.to_string());
                    }
                }
            }
            Some("StatusContext") => {
                let state = ctx.state.as_deref().unwrap_or("");
                if state == "FAILURE" || state == "ERROR" {
                    if let Some(context) = ctx.context.as_deref().filter(|c| !c.is_empty()) {
                        failing.push(context.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    failing
}

pub fn map_pull_request(repo: &RepositoryRef, node: PrNode) -> PullRequestDescriptor {
    let failing_checks = extract_failing_checks(&node);
    PullRequestDescriptor {
        clone_url: repo.clone_url(),
        repo: repo.clone(),
        number: node.number,
        title: node.title,
        body: node.body.unwrap_or_default(),
        head_ref: node.head_ref_name,
        base_ref: node.base_ref_name,
        head_sha: node.head_ref_oid,
        is_draft: node.is_draft,
        updated_at: node.updated_at,
        mergeable: parse_mergeable(node.mergeable.as_deref()),
        merge_state: parse_merge_state(node.merge_state_status.as_deref()),
        failing_checks,
    }
}

pub fn map_repository_page(org: &str, connection: RepositoryConnection) -> RepositoryPage {
    let repositories = connection
        .nodes
        .into_iter()
        .map(|node| RepositorySummary {
            repo: RepositoryRef {
                owner: org.to_string(),
                name: node.name,
                is_archived: node.is_archived,
            },
            open_pull_requests: node.pull_requests.total_count,
        })
        .collect();
    RepositoryPage {
        repositories,
        end_cursor: connection.page_info.end_cursor,
        has_next_page: connection.page_info.has_next_page,
    }
}

pub fn first_commit_message(data: FirstCommitData) -> Option<String> {
    data.repository?
        .pull_request?
        .commits
        .nodes
        .into_iter()
        .next()?
        .commit?
        .message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> RepositoryRef {
        RepositoryRef {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
            is_archived: false,
        }
    }

    fn pr_node(value: serde_json::Value) -> PrNode {
        serde_json::from_value(value).unwrap()
    }

    fn base_node(contexts: serde_json::Value) -> serde_json::Value {
        json!({
            "number": 5,
            "title": "Add widget",
            "body": "Body",
            "isDraft": false,
            "headRefName": "feature",
            "baseRefName": "main",
            "headRefOid": "abc123",
            "mergeable": "MERGEABLE",
            "mergeStateStatus": "CLEAN",
            "commits": {
                "nodes": [
                    {
                        "commit": {
                            "statusCheckRollup": {
                                "contexts": { "nodes": contexts }
                            }
                        }
                    }
                ]
            }
        })
    }

    #[test]
    fn check_run_conclusions_are_case_insensitive() {
        let node = pr_node(base_node(json!([
            { "__typename": "CheckRun", "name": "Test 1", "conclusion": "FAILURE" },
            { "__typename": "CheckRun", "name": "Test 2", "conclusion": "Failure" },
            { "__typename": "CheckRun", "name": "Test 3", "conclusion": "timed_out" },
            { "__typename": "CheckRun", "name": "Test 4", "conclusion": "success" }
        ])));
        let pr = map_pull_request(&repo(), node);
        assert_eq!(pr.failing_checks, vec!["Test 1", "Test 2", "Test 3"]);
    }

    #[test]
    fn status_contexts_failure_and_error_count() {
        let node = pr_node(base_node(json!([
            { "__typename": "StatusContext", "context": "ci/jenkins", "state": "FAILURE" },
            { "__typename": "StatusContext", "context": "security/scan", "state": "ERROR" },
            { "__typename": "StatusContext", "context": "ci/ok", "state": "SUCCESS" }
        ])));
        let pr = map_pull_request(&repo(), node);
        assert_eq!(pr.failing_checks, vec!["ci/jenkins", "security/scan"]);
    }

    #[test]
    fn nameless_and_unknown_entries_are_skipped() {
        let node = pr_node(base_node(json!([
            { "__typename": "CheckRun", "conclusion": "failure" },
            { "__typename": "StatusContext", "state": "FAILURE" },
            { "__typename": "SomethingElse", "name": "Mystery" }
        ])));
        let pr = map_pull_request(&repo(), node);
        assert!(pr.failing_checks.is_empty());
    }

    #[test]
    fn missing_rollup_yields_no_failing_checks() {
        let node = pr_node(json!({
            "number": 9,
            "title": "No checks",
            "headRefName": "feature",
            "baseRefName": "main",
            "headRefOid": "def456",
            "commits": { "nodes": [ { "commit": { "statusCheckRollup": null } } ] }
        }));
        let pr = map_pull_request(&repo(), node);
        assert!(pr.failing_checks.is_empty());
        assert_eq!(pr.mergeable, Mergeable::Unknown);
        assert_eq!(pr.merge_state, MergeState::Unknown);
    }

    #[test]
    fn merge_state_parses_case_insensitively() {
        assert_eq!(parse_merge_state(Some("dirty")), MergeState::Dirty);
        assert_eq!(parse_merge_state(Some("BEHIND")), MergeState::Behind);
        assert_eq!(parse_merge_state(Some("Blocked")), MergeState::Blocked);
        assert_eq!(parse_merge_state(None), MergeState::Unknown);
        assert_eq!(parse_mergeable(Some("conflicting")), Mergeable::Conflicting);
    }

    #[test]
    fn null_body_maps_to_empty_string() {
        let node = pr_node(json!({
            "number": 3,
            "title": "T",
            "body": null,
            "headRefName": "f",
            "baseRefName": "main",
            "headRefOid": "abc"
        }));
        let pr = map_pull_request(&repo(), node);
        assert_eq!(pr.body, "");
        assert_eq!(pr.clone_url, "https://github.com/acme/widgets.git");
    }

    #[test]
    fn repository_page_maps_owner_and_counts() {
        let connection: RepositoryConnection = serde_json::from_value(json!({
            "totalCount": 2,
            "pageInfo": { "endCursor": "abc", "hasNextPage": true },
            "nodes": [
                { "name": "widgets", "isArchived": false, "pullRequests": { "totalCount": 3 } },
                { "name": "attic", "isArchived": true, "pullRequests": { "totalCount": 0 } }
            ]
        }))
        .unwrap();
        let page = map_repository_page("acme", connection);
        assert_eq!(page.repositories.len(), 2);
        assert_eq!(page.repositories[0].repo.full_name(), "acme/widgets");
        assert_eq!(page.repositories[0].open_pull_requests, 3);
        assert!(page.repositories[1].repo.is_archived);
        assert_eq!(page.end_cursor.as_deref(), Some("abc"));
        assert!(page.has_next_page);
    }

    #[test]
    fn envelope_surfaces_graphql_errors() {
        let response: GraphQlResponse<OrgRepositoriesData> = serde_json::from_value(json!({
            "data": null,
            "errors": [ { "message": "Field 'bogus' doesn't exist" } ]
        }))
        .unwrap();
        let err = into_data(response).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn envelope_maps_rate_limit_to_throttle() {
        let response: GraphQlResponse<OrgRepositoriesData> = serde_json::from_value(json!({
            "data": null,
            "errors": [ { "message": "API rate limit exceeded", "type": "RATE_LIMITED" } ]
        }))
        .unwrap();
        let err = into_data(response).unwrap_err();
        assert!(err.is_throttle());
    }

    #[test]
    fn first_commit_message_walks_the_nesting() {
        let data: FirstCommitData = serde_json::from_value(json!({
            "repository": {
                "pullRequest": {
                    "commits": {
                        "nodes": [ { "commit": { "message": "Fix bug\n\nBody" } } ]
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(first_commit_message(data).as_deref(), Some("Fix bug\n\nBody"));

        let empty: FirstCommitData = serde_json::from_value(json!({
            "repository": { "pullRequest": { "commits": { "nodes": [] } } }
        }))
        .unwrap();
        assert_eq!(first_commit_message(empty), None);
    }
}
