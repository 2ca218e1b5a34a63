//! Blocking classification: why a pull request cannot merge right now.

use std::collections::BTreeSet;

use crate::model::{BlockedReason, Mergeable, MergeState, PullRequestDescriptor};

/// Compute the full reason set from the descriptor's raw status fields.
/// Always recomputed from scratch; a PR is blocked iff the set is
/// non-empty.
pub fn blocked_reasons(pr: &PullRequestDescriptor) -> BTreeSet<BlockedReason> {
    let mut reasons = BTreeSet::new();
    if pr.mergeable == Mergeable::Conflicting || pr.merge_state == MergeState::Dirty {
        reasons.insert(BlockedReason::MergeConflict);
    }
    if pr.merge_state == MergeState::Behind {
        reasons.insert(BlockedReason::BehindBase);
    }
    if pr.merge_state == MergeState::Blocked {
        reasons.insert(BlockedReason::BranchProtectionBlocked);
    }
    if !pr.failing_checks.is_empty() {
        reasons.insert(BlockedReason::FailingCheck);
    }
    reasons
}

pub fn is_blocked(pr: &PullRequestDescriptor) -> bool {
    !blocked_reasons(pr).is_empty()
}
