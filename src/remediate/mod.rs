pub mod fixes;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::gateway::Gateway;
use crate::model::{
    ConflictStrategy, FailureKind, FixKind, GitIdentity, PullRequestDescriptor,
    RemediationOutcome, SyncStrategy, Termination,
};
use crate::workspace::{git, Workspace, WorkspaceManager};

use fixes::FileFixRule;

/// What one run is allowed to change on each pull request.
pub struct RemediateOptions {
    pub fix_title: bool,
    pub fix_body: bool,
    pub file_rules: Vec<FileFixRule>,
    pub sync: SyncStrategy,
    pub on_conflict: ConflictStrategy,
    pub dry_run: bool,
}

/// Drives one pull request from discovery to a terminal outcome.
///
/// Every error is absorbed here and mapped to a `Failed` termination, so
/// nothing that goes wrong with one PR can reach its siblings. The
/// workspace directory is removed on every path out, success or failure.
pub struct Remediator {
    gateway: Arc<dyn Gateway>,
    workspaces: WorkspaceManager,
    options: RemediateOptions,
    identity: GitIdentity,
    token: Option<String>,
}

/// Changes computed locally, before anything is published.
#[derive(Debug, Default)]
struct FixPlan {
    title: Option<String>,
    body: Option<String>,
    changed_files: Vec<PathBuf>,
}

impl FixPlan {
    fn kinds(&self) -> BTreeSet<FixKind> {
        let mut kinds = BTreeSet::new();
        if self.title.is_some() {
            kinds.insert(FixKind::Title);
        }
        if self.body.is_some() {
            kinds.insert(FixKind::Body);
        }
        if !self.changed_files.is_empty() {
            kinds.insert(FixKind::File);
        }
        kinds
    }

    fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.changed_files.is_empty()
    }
}

impl Remediator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        workspaces: WorkspaceManager,
        options: RemediateOptions,
        identity: GitIdentity,
        token: Option<String>,
    ) -> Self {
        Self {
            gateway,
            workspaces,
            options,
            identity,
            token,
        }
    }

    pub async fn remediate(&self, pr: &PullRequestDescriptor) -> RemediationOutcome {
        let mut outcome = RemediationOutcome {
            repo: pr.repo.full_name(),
            number: pr.number,
            url: pr.url(),
            applied: BTreeSet::new(),
            pushed: false,
            comment_posted: false,
            termination: Termination::Done,
        };

        tracing::info!(pr = %pr.slug(), "Remediating pull request");

        let workspace = match self
            .workspaces
            .checkout_pull_request(pr, self.token.as_deref())
            .await
        {
            Ok(workspace) => workspace,
            Err(e) => {
                tracing::error!(pr = %pr.slug(), error = %e, "Clone failed");
                outcome.termination = Termination::Failed(FailureKind::CloneFailed);
                return outcome;
            }
        };

        self.run_stages(pr, &workspace, &mut outcome).await;

        if let Err(e) = self.workspaces.cleanup(&workspace).await {
            tracing::warn!(pr = %pr.slug(), error = %e, "Workspace cleanup failed");
        }

        match outcome.termination {
            Termination::Failed(kind) => {
                tracing::error!(pr = %pr.slug(), reason = %kind, "Remediation failed");
            }
            _ => {
                tracing::info!(
                    pr = %pr.slug(),
                    applied = ?outcome.applied,
                    pushed = outcome.pushed,
                    "Remediation finished"
                );
            }
        }
        outcome
    }

    /// Sync and fix locally, then hand over to `publish`. A dry run never
    /// enters the publish path at all.
    async fn run_stages(
        &self,
        pr: &PullRequestDescriptor,
        workspace: &Workspace,
        outcome: &mut RemediationOutcome,
    ) {
        if let Err(e) = git::sync_with_base(
            &workspace.path,
            &pr.base_ref,
            self.options.sync,
            self.options.on_conflict,
            &self.identity,
        )
        .await
        {
            tracing::error!(pr = %pr.slug(), error = %e, "Sync with base failed");
            outcome.termination = Termination::Failed(FailureKind::SyncConflict);
            return;
        }

        let plan = match self.compute_fixes(pr, workspace).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(pr = %pr.slug(), error = %e, "Computing fixes failed");
                outcome.termination = Termination::Failed(FailureKind::FixFailed);
                return;
            }
        };

        if plan.is_empty() {
            tracing::info!(pr = %pr.slug(), "No changes needed");
            return;
        }

        if self.options.dry_run {
            outcome.applied = plan.kinds();
            outcome.termination = Termination::DryRunStopped;
            tracing::info!(
                pr = %pr.slug(),
                would_apply = ?outcome.applied,
                "Dry run, stopping before publish"
            );
            return;
        }

        self.publish(pr, workspace, &plan, outcome).await;
    }

    /// Compute title/body fixes from the first commit message and run the
    /// file rules over the working tree. Local effects only.
    async fn compute_fixes(
        &self,
        pr: &PullRequestDescriptor,
        workspace: &Workspace,
    ) -> Result<FixPlan> {
        let mut plan = FixPlan::default();

        if self.options.fix_title || self.options.fix_body {
            match self
                .gateway
                .fetch_first_commit(&pr.repo.owner, &pr.repo.name, pr.number)
                .await?
            {
                Some(message) => {
                    let (subject, commit_body) = fixes::split_message(&message);
                    if self.options.fix_title {
                        plan.title = fixes::compute_title_fix(&pr.title, &subject);
                    }
                    if self.options.fix_body {
                        plan.body = fixes::compute_body_fix(&pr.body, &commit_body);
                    }
                }
                None => {
                    tracing::warn!(
                        pr = %pr.slug(),
                        "No commit message available, skipping metadata fixes"
                    );
                }
            }
        }

        if !self.options.file_rules.is_empty() {
            let root = workspace.path.clone();
            let rules = self.options.file_rules.clone();
            plan.changed_files =
                tokio::task::spawn_blocking(move || fixes::apply_file_fixes(&root, &rules))
                    .await
                    .map_err(|e| AppError::Internal(format!("File fix task panicked: {e}")))??;
        }

        Ok(plan)
    }

    /// Stage and amend file changes into the head commit. Returns false
    /// when the working tree turned out clean.
    async fn commit_file_changes(&self, workspace: &Workspace) -> Result<bool> {
        git::stage_all(&workspace.path).await?;
        if !git::has_staged_changes(&workspace.path).await? {
            return Ok(false);
        }
        let new_sha = git::amend_last_commit(&workspace.path, &self.identity).await?;
        tracing::debug!(sha = %new_sha, "Amended head commit");
        Ok(true)
    }

    /// Everything that touches the remote: push amended file changes,
    /// update PR metadata, comment, re-request failed checks.
    ///
    /// Metadata goes out only after the push has succeeded, so a rejected
    /// push leaves the PR untouched.
    async fn publish(
        &self,
        pr: &PullRequestDescriptor,
        workspace: &Workspace,
        plan: &FixPlan,
        outcome: &mut RemediationOutcome,
    ) {
        if !plan.changed_files.is_empty() {
            match self.commit_file_changes(workspace).await {
                Ok(true) => {
                    let push = git::force_push_with_lease(
                        &workspace.path,
                        &workspace.branch,
                        &workspace.head_sha,
                        self.token.as_deref(),
                    )
                    .await;
                    match push {
                        Ok(()) => {
                            outcome.pushed = true;
                            outcome.applied.insert(FixKind::File);
                            tracing::info!(
                                pr = %pr.slug(),
                                files = plan.changed_files.len(),
                                "Pushed amended commit"
                            );
                        }
                        Err(e) => {
                            tracing::error!(pr = %pr.slug(), error = %e, "Force push rejected");
                            outcome.termination = Termination::Failed(FailureKind::PushRejected);
                            return;
                        }
                    }
                }
                Ok(false) => {
                    tracing::debug!(pr = %pr.slug(), "Working tree clean, nothing to commit");
                }
                Err(e) => {
                    tracing::error!(pr = %pr.slug(), error = %e, "Commit amend failed");
                    outcome.termination = Termination::Failed(FailureKind::CommitFailed);
                    return;
                }
            }
        }

        if let Some(title) = &plan.title {
            if let Err(e) = self
                .gateway
                .update_title(&pr.repo.owner, &pr.repo.name, pr.number, title)
                .await
            {
                tracing::error!(pr = %pr.slug(), error = %e, "Title update failed");
                outcome.termination = Termination::Failed(FailureKind::RemoteUpdateFailed);
                return;
            }
            outcome.applied.insert(FixKind::Title);
        }

        if let Some(body) = &plan.body {
            if let Err(e) = self
                .gateway
                .update_body(&pr.repo.owner, &pr.repo.name, pr.number, body)
                .await
            {
                tracing::error!(pr = %pr.slug(), error = %e, "Body update failed");
                outcome.termination = Termination::Failed(FailureKind::RemoteUpdateFailed);
                return;
            }
            outcome.applied.insert(FixKind::Body);
        }

        if !outcome.applied.is_empty() {
            match self
                .gateway
                .post_comment(
                    &pr.repo.owner,
                    &pr.repo.name,
                    pr.number,
                    &comment_body(&outcome.applied),
                )
                .await
            {
                Ok(()) => outcome.comment_posted = true,
                Err(e) => {
                    tracing::warn!(pr = %pr.slug(), error = %e, "Comment failed");
                }
            }
        }

        // A push starts fresh checks on its own; only metadata-only
        // changes need the failing runs re-requested.
        if !outcome.pushed
            && (outcome.applied.contains(&FixKind::Title)
                || outcome.applied.contains(&FixKind::Body))
        {
            self.rerun_failed_checks(pr).await;
        }
    }

    /// Best-effort re-request of failed check runs on the head commit.
    async fn rerun_failed_checks(&self, pr: &PullRequestDescriptor) {
        let runs = match self
            .gateway
            .list_check_runs(&pr.repo.owner, &pr.repo.name, &pr.head_sha)
            .await
        {
            Ok(runs) => runs,
            Err(e) => {
                tracing::debug!(pr = %pr.slug(), error = %e, "Could not list check runs");
                return;
            }
        };

        for run in runs.iter().filter(|run| run.is_failed()) {
            match self
                .gateway
                .rerun_check(&pr.repo.owner, &pr.repo.name, run.id)
                .await
            {
                Ok(()) => {
                    tracing::info!(pr = %pr.slug(), check = %run.name, "Re-requested failed check");
                }
                Err(e) => {
                    // Not every check type supports re-runs.
                    tracing::debug!(
                        pr = %pr.slug(),
                        check = %run.name,
                        error = %e,
                        "Check re-run refused"
                    );
                }
            }
        }
    }
}

fn comment_body(applied: &BTreeSet<FixKind>) -> String {
    let mut lines = vec![
        "## 🛠️ pr-mend".to_string(),
        String::new(),
        "Automatically applied fixes:".to_string(),
    ];
    if applied.contains(&FixKind::Title) {
        lines.push("- **Pull request title** updated to match the first commit".to_string());
    }
    if applied.contains(&FixKind::Body) {
        lines.push("- **Pull request body** updated to match the commit message".to_string());
    }
    if applied.contains(&FixKind::File) {
        lines.push("- **Files** fixed and force-pushed onto the head branch".to_string());
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push("*This fix was applied automatically by pr-mend*".to_string());
    lines.join("\n")
}
