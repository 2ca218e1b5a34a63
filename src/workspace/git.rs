use std::path::Path;

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Cred, Direction, FetchOptions, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    ResetType, Signature,
};

use crate::error::{AppError, Result};
use crate::model::{ConflictStrategy, GitIdentity, SyncStrategy};

/// Validate a branch name so it can never be parsed as an option.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    Ok(())
}

/// Build `FetchOptions` that authenticate via credential callback when a
/// token is present. The token is captured by the closure and never
/// written to disk; local-path remotes need no credentials.
fn make_fetch_options(token: Option<&str>) -> FetchOptions<'static> {
    let mut opts = FetchOptions::new();
    if let Some(token) = token {
        let token = token.to_string();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            Cred::userpass_plaintext("x-access-token", &token)
        });
        opts.remote_callbacks(callbacks);
    }
    opts
}

/// Build `PushOptions` that authenticate via credential callback.
fn make_push_options(token: Option<&str>) -> PushOptions<'static> {
    let mut opts = PushOptions::new();
    if let Some(token) = token {
        let token = token.to_string();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            Cred::userpass_plaintext("x-access-token", &token)
        });
        opts.remote_callbacks(callbacks);
    }
    opts
}

fn make_credential_callbacks(token: Option<&str>) -> Option<RemoteCallbacks<'static>> {
    token.map(|token| {
        let token = token.to_string();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            Cred::userpass_plaintext("x-access-token", &token)
        });
        callbacks
    })
}

/// Full clone of one branch into the target directory, returning the
/// observed head commit. That commit is the lease reference for any later
/// force push.
///
/// The remote URL stored in `.git/config` is the **plain** URL (no
/// credentials). HTTPS and local-path URLs are accepted; SSH is not.
pub async fn clone_pull_request(
    url: &str,
    target: &Path,
    branch: &str,
    token: Option<&str>,
) -> Result<String> {
    validate_branch_name(branch)?;
    if url.starts_with("git@") || url.starts_with("ssh://") {
        return Err(AppError::Git(format!(
            "SSH clone URLs are not supported: {url}"
        )));
    }

    let url = url.to_string();
    let target = target.to_path_buf();
    let branch = branch.to_string();
    let token = token.map(|t| t.to_string());

    tokio::task::spawn_blocking(move || {
        let fetch_opts = make_fetch_options(token.as_deref());
        let repo = RepoBuilder::new()
            .branch(&branch)
            .fetch_options(fetch_opts)
            .clone(&url, &target)?;
        let head = repo.head()?.peel_to_commit()?;
        Ok(head.id().to_string())
    })
    .await
    .map_err(|e| AppError::Git(format!("Clone task panicked: {e}")))?
}

/// Fetch a remote branch into `refs/remotes/origin/<branch>`.
pub async fn fetch_branch(dir: &Path, branch: &str, token: Option<&str>) -> Result<()> {
    validate_branch_name(branch)?;

    let dir = dir.to_path_buf();
    let branch = branch.to_string();
    let token = token.map(|t| t.to_string());

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        let mut fetch_opts = make_fetch_options(token.as_deref());
        remote.fetch(&[&refspec], Some(&mut fetch_opts), None)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Fetch task panicked: {e}")))?
}

/// Commit id at HEAD.
pub async fn head_sha(dir: &Path) -> Result<String> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head = repo.head()?.peel_to_commit()?;
        Ok(head.id().to_string())
    })
    .await
    .map_err(|e| AppError::Git(format!("Head task panicked: {e}")))?
}

/// Re-synchronize the checked-out branch with `origin/<base>` according to
/// the strategy. `SyncStrategy::None` leaves the workspace untouched.
/// A conflict under `ConflictStrategy::Fail` restores the pre-sync state
/// and reports the conflicting paths.
pub async fn sync_with_base(
    dir: &Path,
    base_branch: &str,
    strategy: SyncStrategy,
    on_conflict: ConflictStrategy,
    identity: &GitIdentity,
) -> Result<()> {
    if strategy == SyncStrategy::None {
        return Ok(());
    }
    validate_branch_name(base_branch)?;

    let dir = dir.to_path_buf();
    let base_branch = base_branch.to_string();
    let identity = identity.clone();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let sig = Signature::now(&identity.name, &identity.email)?;
        match strategy {
            SyncStrategy::None => Ok(()),
            SyncStrategy::Rebase => rebase_onto_base(&repo, &base_branch, on_conflict, &sig),
            SyncStrategy::Merge => merge_from_base(&repo, &base_branch, on_conflict, &sig),
        }
    })
    .await
    .map_err(|e| AppError::Git(format!("Sync task panicked: {e}")))?
}

fn rebase_onto_base(
    repo: &Repository,
    base_branch: &str,
    on_conflict: ConflictStrategy,
    sig: &Signature<'_>,
) -> Result<()> {
    let base_ref = repo.find_reference(&format!("refs/remotes/origin/{base_branch}"))?;
    let upstream = repo.reference_to_annotated_commit(&base_ref)?;
    let head_ref = repo.head()?;
    let branch = repo.reference_to_annotated_commit(&head_ref)?;

    let mut rebase = repo.rebase(Some(&branch), Some(&upstream), None, None)?;
    while let Some(op) = rebase.next() {
        if let Err(e) = op {
            rebase.abort()?;
            return Err(e.into());
        }

        let mut index = repo.index()?;
        if index.has_conflicts() {
            if on_conflict == ConflictStrategy::Fail {
                let paths = conflict_paths(&index)?;
                rebase.abort()?;
                return Err(AppError::SyncConflict {
                    strategy: SyncStrategy::Rebase,
                    paths,
                });
            }
            // During a rebase the index labels the base as "our" side and
            // the replayed branch commit as "their" side, the opposite of
            // a merge. ConflictStrategy::Ours always means the PR
            // branch's content.
            let prefer_their = on_conflict == ConflictStrategy::Ours;
            resolve_conflicts(repo, &mut index, prefer_their)?;
        }

        match rebase.commit(None, sig, None) {
            Ok(_) => {}
            // Patch already present upstream: nothing to commit, skip it.
            Err(e) if e.code() == git2::ErrorCode::Applied => {}
            Err(e) => {
                rebase.abort()?;
                return Err(e.into());
            }
        }
    }
    rebase.finish(Some(sig))?;
    Ok(())
}

fn merge_from_base(
    repo: &Repository,
    base_branch: &str,
    on_conflict: ConflictStrategy,
    sig: &Signature<'_>,
) -> Result<()> {
    let base_ref = repo.find_reference(&format!("refs/remotes/origin/{base_branch}"))?;
    let annotated = repo.reference_to_annotated_commit(&base_ref)?;
    let (analysis, _) = repo.merge_analysis(&[&annotated])?;

    if analysis.is_up_to_date() {
        return Ok(());
    }

    if analysis.is_fast_forward() {
        let refname = repo
            .head()?
            .name()
            .ok_or_else(|| AppError::Git("HEAD is not a named reference".to_string()))?
            .to_string();
        let mut reference = repo.find_reference(&refname)?;
        reference.set_target(annotated.id(), "fast-forward")?;
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        return Ok(());
    }

    repo.merge(&[&annotated], None, None)?;

    let mut index = repo.index()?;
    if index.has_conflicts() {
        if on_conflict == ConflictStrategy::Fail {
            let paths = conflict_paths(&index)?;
            let head_commit = repo.head()?.peel_to_commit()?;
            repo.reset(head_commit.as_object(), ResetType::Hard, None)?;
            repo.cleanup_state()?;
            return Err(AppError::SyncConflict {
                strategy: SyncStrategy::Merge,
                paths,
            });
        }
        // Merging into the checked-out branch: "our" side is the PR
        // branch, so no side swap here.
        let prefer_their = on_conflict == ConflictStrategy::Theirs;
        resolve_conflicts(repo, &mut index, prefer_their)?;
    }

    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;
    let head_commit = repo.head()?.peel_to_commit()?;
    let base_commit = repo.find_commit(annotated.id())?;
    let message = format!("Merge remote-tracking branch 'origin/{base_branch}'");
    repo.commit(
        Some("HEAD"),
        sig,
        sig,
        &message,
        &tree,
        &[&head_commit, &base_commit],
    )?;
    repo.cleanup_state()?;
    Ok(())
}

/// Resolve every conflicted path by picking one side wholesale: write the
/// chosen blob to the worktree and stage it, or delete the path when the
/// chosen side removed it.
fn resolve_conflicts(repo: &Repository, index: &mut git2::Index, prefer_their: bool) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| AppError::Git("Repository has no worktree".to_string()))?
        .to_path_buf();

    let conflicts: Vec<git2::IndexConflict> = index
        .conflicts()?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for conflict in conflicts {
        let path_entry = conflict
            .our
            .as_ref()
            .or(conflict.their.as_ref())
            .or(conflict.ancestor.as_ref());
        let Some(path_entry) = path_entry else {
            continue;
        };
        let rel = String::from_utf8_lossy(&path_entry.path).into_owned();
        let full = workdir.join(&rel);

        let chosen = if prefer_their {
            conflict.their.as_ref()
        } else {
            conflict.our.as_ref()
        };

        match chosen {
            Some(entry) => {
                let blob = repo.find_blob(entry.id)?;
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&full, blob.content())?;
                // add_path clears the conflict stages for the path
                index.add_path(Path::new(&rel))?;
            }
            None => {
                if full.exists() {
                    std::fs::remove_file(&full)?;
                }
                index.remove_path(Path::new(&rel))?;
            }
        }
    }
    index.write()?;
    Ok(())
}

fn conflict_paths(index: &git2::Index) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entry = conflict
            .our
            .as_ref()
            .or(conflict.their.as_ref())
            .or(conflict.ancestor.as_ref());
        if let Some(entry) = entry {
            paths.push(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Stage all changes.
pub async fn stage_all(dir: &Path) -> Result<()> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Stage task panicked: {e}")))?
}

/// Whether the index differs from the HEAD tree (`git diff --cached
/// --quiet`).
pub async fn has_staged_changes(dir: &Path) -> Result<bool> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head_tree = repo.head()?.peel_to_tree()?;
        let index = repo.index()?;
        let diff = repo.diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        Ok(diff.deltas().len() > 0)
    })
    .await
    .map_err(|e| AppError::Git(format!("Diff task panicked: {e}")))?
}

/// Fold the staged changes into the last commit. The original author is
/// preserved; the committer becomes the given identity. Returns the new
/// commit id.
pub async fn amend_last_commit(dir: &Path, identity: &GitIdentity) -> Result<String> {
    let dir = dir.to_path_buf();
    let identity = identity.clone();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut index = repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let head_commit = repo.head()?.peel_to_commit()?;
        let sig = Signature::now(&identity.name, &identity.email)?;
        let new_oid = head_commit.amend(Some("HEAD"), None, Some(&sig), None, None, Some(&tree))?;
        Ok(new_oid.to_string())
    })
    .await
    .map_err(|e| AppError::Git(format!("Amend task panicked: {e}")))?
}

/// Current tip of `refs/heads/<branch>` on the remote, if the branch
/// still exists there.
pub async fn remote_head_sha(dir: &Path, branch: &str, token: Option<&str>) -> Result<Option<String>> {
    validate_branch_name(branch)?;

    let dir = dir.to_path_buf();
    let branch = branch.to_string();
    let token = token.map(|t| t.to_string());

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;
        let callbacks = make_credential_callbacks(token.as_deref());
        let connection = remote.connect_auth(Direction::Fetch, callbacks, None)?;
        let refname = format!("refs/heads/{branch}");
        let sha = connection
            .list()?
            .iter()
            .find(|head| head.name() == refname)
            .map(|head| head.oid().to_string());
        Ok(sha)
    })
    .await
    .map_err(|e| AppError::Git(format!("Remote-head task panicked: {e}")))?
}

/// Force-push the branch only if the remote tip still equals
/// `expected_sha`, the commit observed at clone time. A moved or deleted
/// remote branch aborts with a stale-lease error and the remote is left
/// untouched.
///
/// The compare and the push are not one atomic server-side operation the
/// way `--force-with-lease` is; the check happens immediately before the
/// push on the same connection state.
pub async fn force_push_with_lease(
    dir: &Path,
    branch: &str,
    expected_sha: &str,
    token: Option<&str>,
) -> Result<()> {
    validate_branch_name(branch)?;

    let dir = dir.to_path_buf();
    let branch = branch.to_string();
    let expected_sha = expected_sha.to_string();
    let token = token.map(|t| t.to_string());

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;

        let actual = {
            let callbacks = make_credential_callbacks(token.as_deref());
            let connection = remote.connect_auth(Direction::Fetch, callbacks, None)?;
            let refname = format!("refs/heads/{branch}");
            connection
                .list()?
                .iter()
                .find(|head| head.name() == refname)
                .map(|head| head.oid().to_string())
        };

        match actual {
            Some(actual) if actual == expected_sha => {}
            Some(actual) => {
                return Err(AppError::StaleLease {
                    branch,
                    expected: expected_sha,
                    actual,
                });
            }
            None => {
                return Err(AppError::StaleLease {
                    branch,
                    expected: expected_sha,
                    actual: "(deleted)".to_string(),
                });
            }
        }

        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        let mut push_opts = make_push_options(token.as_deref());
        remote.push(&[&refspec], Some(&mut push_opts))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Push task panicked: {e}")))?
}
