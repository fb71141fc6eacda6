//! Applies a [`RewritePlan`] to a snapshot with the chosen strategy.

pub mod batch;
pub mod per_commit;

use crate::filter::HistoryFilter;
use crate::git;
use crate::progress::Progress;
use crate::state::RunState;
use retime_core::{CompressError, RewritePlan, RewriteStrategy};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Rewrite every planned commit inside `repo`.
///
/// `repo` must be a disposable snapshot; its work tree is reset first.
pub async fn rewrite(
    filter: &dyn HistoryFilter,
    repo: &Path,
    plan: &RewritePlan,
    strategy: RewriteStrategy,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<RunState, CompressError> {
    git::discard_working_changes(repo)
        .await
        .map_err(CompressError::snapshot)?;

    tracing::info!(strategy = %strategy, commits = plan.len(), "rewriting history");
    match strategy {
        RewriteStrategy::PerCommit => per_commit::run(filter, repo, plan, progress, cancel).await,
        RewriteStrategy::Batch => batch::run(filter, repo, plan, progress, cancel).await,
    }
}
