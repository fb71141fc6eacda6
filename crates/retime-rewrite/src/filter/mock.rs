use crate::env::Tool;
use crate::filter::script::PROGRESS_INTERVAL;
use crate::filter::HistoryFilter;
use async_trait::async_trait;
use retime_core::{CompressError, Identity, PlannedCommit, RewritePlan, RewriteStrategy};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Scripted filter for tests: leaves history alone, fails where told to.
pub struct MockHistoryFilter {
    failing: HashSet<String>,
    batch_failure: Option<String>,
    attempts: Mutex<Vec<String>>,
}

impl MockHistoryFilter {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            batch_failure: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Make `rewrite_commit` fail for this hash.
    pub fn fail_commit(mut self, hash: impl Into<String>) -> Self {
        self.failing.insert(hash.into());
        self
    }

    /// Make `rewrite_all` fail with this message.
    pub fn fail_batch(mut self, message: impl Into<String>) -> Self {
        self.batch_failure = Some(message.into());
        self
    }

    /// Hashes passed to `rewrite_commit`, in call order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Default for MockHistoryFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryFilter for MockHistoryFilter {
    fn required_tools(&self, _strategy: RewriteStrategy) -> Vec<Tool> {
        Vec::new()
    }

    async fn rewrite_commit(
        &self,
        _repo: &Path,
        commit: &PlannedCommit,
        _identity: Option<&Identity>,
        cancel: CancellationToken,
    ) -> Result<(), CompressError> {
        if cancel.is_cancelled() {
            return Err(CompressError::Cancelled);
        }
        let hash = &commit.record.hash;
        self.attempts.lock().unwrap().push(hash.clone());
        if self.failing.contains(hash) {
            return Err(CompressError::CommitRewrite {
                hash: hash.clone(),
                detail: "mock failure".into(),
            });
        }
        Ok(())
    }

    async fn rewrite_all(
        &self,
        _repo: &Path,
        plan: &RewritePlan,
        progress: mpsc::Sender<u64>,
        cancel: CancellationToken,
    ) -> Result<(), CompressError> {
        if cancel.is_cancelled() {
            return Err(CompressError::Cancelled);
        }
        if let Some(msg) = &self.batch_failure {
            return Err(CompressError::BatchRewrite(msg.clone()));
        }
        let total = plan.len() as u64;
        for n in (PROGRESS_INTERVAL..=total).step_by(PROGRESS_INTERVAL as usize) {
            let _ = progress.send(n).await;
        }
        Ok(())
    }
}
