//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod mock_gateway;

pub use mock_gateway::{FailureMode, MetadataCall, MockGateway};

use pr_mend::model::{
    CheckRun, MergeState, Mergeable, PullRequestDescriptor, RepositoryRef,
};

pub const ORG: &str = "acme";

pub fn repo_ref(name: &str) -> RepositoryRef {
    RepositoryRef {
        owner: ORG.to_string(),
        name: name.to_string(),
        is_archived: false,
    }
}

/// An open PR that merges cleanly: nothing blocks it.
pub fn clean_pr(repo: &str, number: u64) -> PullRequestDescriptor {
    PullRequestDescriptor {
        repo: repo_ref(repo),
        number,
        title: format!("Change number {number}"),
        body: String::new(),
        head_ref: format!("feature-{number}"),
        base_ref: "main".to_string(),
        head_sha: format!("{repo}-{number}-sha"),
        clone_url: format!("https://github.com/{ORG}/{repo}.git"),
        is_draft: false,
        updated_at: None,
        mergeable: Mergeable::Mergeable,
        merge_state: MergeState::Clean,
        failing_checks: Vec::new(),
    }
}

/// An open PR stuck on a failing check run.
pub fn blocked_pr(repo: &str, number: u64) -> PullRequestDescriptor {
    PullRequestDescriptor {
        merge_state: MergeState::Blocked,
        failing_checks: vec!["ci/build".to_string()],
        ..clean_pr(repo, number)
    }
}

pub fn check_run(id: u64, name: &str, status: &str, conclusion: Option<&str>) -> CheckRun {
    CheckRun {
        id,
        name: name.to_string(),
        status: status.to_string(),
        conclusion: conclusion.map(|c| c.to_string()),
    }
}
