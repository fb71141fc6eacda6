//! History filters: the external tools that actually rewrite commits.

pub mod git_filter;
pub mod mock;
pub mod script;
pub mod stream;

pub use git_filter::GitHistoryFilter;
pub use mock::MockHistoryFilter;

use crate::env::Tool;
use async_trait::async_trait;
use retime_core::{CompressError, Identity, PlannedCommit, RewritePlan, RewriteStrategy};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Rewrites commit metadata inside a snapshot repository.
#[async_trait]
pub trait HistoryFilter: Send + Sync {
    /// External tools `strategy` needs from this filter.
    fn required_tools(&self, strategy: RewriteStrategy) -> Vec<Tool>;

    /// Rewrite a single commit. Failure is `CommitRewrite` unless the run
    /// was cancelled.
    async fn rewrite_commit(
        &self,
        repo: &Path,
        commit: &PlannedCommit,
        identity: Option<&Identity>,
        cancel: CancellationToken,
    ) -> Result<(), CompressError>;

    /// Rewrite the whole plan in one pass, sending absolute processed counts
    /// to `progress` as they become known. Failure is `BatchRewrite`.
    async fn rewrite_all(
        &self,
        repo: &Path,
        plan: &RewritePlan,
        progress: mpsc::Sender<u64>,
        cancel: CancellationToken,
    ) -> Result<(), CompressError>;
}
