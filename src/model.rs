use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A repository inside the scanned organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub is_archived: bool,
}

impl RepositoryRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// GraphQL `mergeable` on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    Unknown,
}

/// GraphQL `mergeStateStatus` on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeState {
    Behind,
    Blocked,
    Clean,
    Dirty,
    Draft,
    HasHooks,
    Unstable,
    Unknown,
}

/// Immutable snapshot of an open pull request at discovery time.
///
/// Stale after any remote mutation; re-fetch before acting on it again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestDescriptor {
    pub repo: RepositoryRef,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head_ref: String,
    pub base_ref: String,
    /// Branch tip observed at discovery; the lease reference for push.
    pub head_sha: String,
    pub clone_url: String,
    pub is_draft: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub mergeable: Mergeable,
    pub merge_state: MergeState,
    /// Names of failing check runs / status contexts on the last commit.
    pub failing_checks: Vec<String>,
}

impl PullRequestDescriptor {
    pub fn slug(&self) -> String {
        format!("{}#{}", self.repo.full_name(), self.number)
    }

    pub fn url(&self) -> String {
        format!(
            "https://github.com/{}/{}/pull/{}",
            self.repo.owner, self.repo.name, self.number
        )
    }
}

/// Why a pull request cannot currently merge. A PR is blocked iff its
/// reason set is non-empty. The set is recomputed from raw status fields,
/// never patched incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockedReason {
    FailingCheck,
    MergeConflict,
    BranchProtectionBlocked,
    BehindBase,
}

impl fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockedReason::FailingCheck => "failing check",
            BlockedReason::MergeConflict => "merge conflict",
            BlockedReason::BranchProtectionBlocked => "branch protection",
            BlockedReason::BehindBase => "behind base",
        };
        f.write_str(s)
    }
}

/// How to re-synchronize a PR branch with its base before fixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// Leave the branch where it is.
    #[default]
    None,
    /// Rebase the branch onto the base tip.
    Rebase,
    /// Merge the base tip into the branch.
    Merge,
}

/// What to do when sync hits conflicting paths. `Ours` keeps the PR
/// branch's content, `Theirs` the base branch's content, under both sync
/// strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum ConflictStrategy {
    #[default]
    Fail,
    Ours,
    Theirs,
}

/// Category of change applied to a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FixKind {
    Title,
    Body,
    File,
}

impl fmt::Display for FixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixKind::Title => "title",
            FixKind::Body => "body",
            FixKind::File => "files",
        };
        f.write_str(s)
    }
}

/// Where remediation gave up. Closed set; every failure maps to one of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    CloneFailed,
    SyncConflict,
    FixFailed,
    CommitFailed,
    PushRejected,
    RemoteUpdateFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::CloneFailed => "clone failed",
            FailureKind::SyncConflict => "sync conflict",
            FailureKind::FixFailed => "fix failed",
            FailureKind::CommitFailed => "commit failed",
            FailureKind::PushRejected => "push rejected",
            FailureKind::RemoteUpdateFailed => "remote update failed",
        };
        f.write_str(s)
    }
}

/// Terminal state of one remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Ran to completion (including the nothing-to-do case).
    Done,
    /// Dry run: stopped before the first remote-mutating step.
    DryRunStopped,
    Failed(FailureKind),
}

/// Result of remediating one pull request. Produced exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationOutcome {
    pub repo: String,
    pub number: u64,
    pub url: String,
    /// Fix categories that produced an actual change.
    pub applied: BTreeSet<FixKind>,
    pub pushed: bool,
    pub comment_posted: bool,
    pub termination: Termination,
}

impl RemediationOutcome {
    pub fn error(&self) -> Option<FailureKind> {
        match self.termination {
            Termination::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}

/// Commit identity used for amended and merge commits. The original
/// author of an amended commit is preserved; only the committer is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// A check run on a commit, as reported by the checks API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

impl CheckRun {
    /// Completed with a conclusion that counts as failed for re-run
    /// purposes.
    pub fn is_failed(&self) -> bool {
        if !self.status.eq_ignore_ascii_case("completed") {
            return false;
        }
        match &self.conclusion {
            Some(c) => matches!(
                c.to_ascii_lowercase().as_str(),
                "failure" | "cancelled" | "timed_out" | "action_required"
            ),
            None => false,
        }
    }
}

/// One page of the organization repository listing.
#[derive(Debug, Clone)]
pub struct RepositoryPage {
    pub repositories: Vec<RepositorySummary>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone)]
pub struct RepositorySummary {
    pub repo: RepositoryRef,
    pub open_pull_requests: u64,
}

/// One page of a repository's open pull requests.
#[derive(Debug, Clone)]
pub struct PullRequestPage {
    pub pull_requests: Vec<PullRequestDescriptor>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// Counters the scan producer returns when the stream closes.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScanStats {
    pub repositories_scanned: u64,
    pub repositories_failed: u64,
    pub pull_requests_examined: u64,
    pub blocked_found: u64,
    /// True when the producer stopped early on a fatal gateway error.
    pub aborted: bool,
}

/// Aggregate result of a whole run, folded in one place by the
/// orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub repositories_scanned: u64,
    pub repositories_failed: u64,
    pub pull_requests_examined: u64,
    pub blocked_found: u64,
    pub fixed: u64,
    pub unchanged: u64,
    pub dry_run_stopped: u64,
    pub failed: u64,
    pub scan_aborted: bool,
    pub outcomes: Vec<RemediationOutcome>,
}

impl RunSummary {
    pub fn from_parts(stats: ScanStats, outcomes: Vec<RemediationOutcome>) -> Self {
        let mut summary = RunSummary {
            repositories_scanned: stats.repositories_scanned,
            repositories_failed: stats.repositories_failed,
            pull_requests_examined: stats.pull_requests_examined,
            blocked_found: stats.blocked_found,
            scan_aborted: stats.aborted,
            ..RunSummary::default()
        };
        for outcome in &outcomes {
            match outcome.termination {
                Termination::Done if outcome.applied.is_empty() => summary.unchanged += 1,
                Termination::Done => summary.fixed += 1,
                Termination::DryRunStopped => summary.dry_run_stopped += 1,
                Termination::Failed(_) => summary.failed += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.scan_aborted
    }
}
