use crate::filter::HistoryFilter;
use crate::progress::Progress;
use crate::state::RunState;
use retime_core::{CompressError, RewritePlan, RewriteStrategy};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// One filter pass per commit, newest first.
///
/// Rewriting a commit only changes the hashes of its descendants, so walking
/// from the tips back to the roots keeps every pending original hash valid.
/// A failed commit is recorded and the loop moves on.
pub async fn run(
    filter: &dyn HistoryFilter,
    repo: &Path,
    plan: &RewritePlan,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<RunState, CompressError> {
    let mut state = RunState::new(RewriteStrategy::PerCommit, plan.len() as u64);
    progress.start("Rewriting commits", state.total);

    for planned in plan.commits.iter().rev() {
        if cancel.is_cancelled() {
            progress.finish();
            return Err(CompressError::Cancelled);
        }
        let result = filter
            .rewrite_commit(repo, planned, plan.identity.as_ref(), cancel.clone())
            .await;
        match result {
            Ok(()) => {
                tracing::debug!(commit = planned.record.short_hash(), "rewritten");
                state.record_success();
            }
            Err(CompressError::CommitRewrite { hash, detail }) => {
                tracing::warn!(
                    commit = planned.record.short_hash(),
                    error = %detail,
                    "commit rewrite failed, continuing"
                );
                state.record_failure(&hash, detail);
            }
            Err(e) => {
                progress.finish();
                return Err(e);
            }
        }
        progress.tick(state.processed, state.total);
    }

    progress.finish();
    if state.error_count > 0 {
        tracing::warn!(
            errors = state.error_count,
            total = state.total,
            "some commits kept their original metadata"
        );
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MockHistoryFilter;
    use crate::progress::{CollectProgress, ProgressEvent};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use retime_core::{CommitRecord, CompressionRatio};

    fn plan(n: usize) -> RewritePlan {
        let commits = (0..n)
            .map(|i| CommitRecord {
                hash: format!("{i:0>40}"),
                timestamp: i as i64 * 86_400,
                author: "a".into(),
                email: "a@b".into(),
                message: format!("c{i}"),
            })
            .collect();
        RewritePlan::build(
            commits,
            CompressionRatio::explicit(0.5, false).unwrap(),
            0,
            None,
            None,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn one_failure_of_five_is_counted() {
        let plan = plan(5);
        let failing = plan.commits[2].record.hash.clone();
        let filter = MockHistoryFilter::new().fail_commit(failing.clone());
        let progress = CollectProgress::new();

        let state = run(&filter, Path::new("."), &plan, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.total, 5);
        assert_eq!(state.processed, 5);
        assert_eq!(state.error_count, 1);
        assert_eq!(state.failures[0].hash, &failing[..8]);
        // One tick per attempt, success or failure.
        let ticks = progress
            .events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Tick { .. }))
            .count();
        assert_eq!(ticks, 5);
        assert_eq!(progress.last_tick(), Some((5, 5)));
    }

    #[tokio::test]
    async fn walks_newest_first() {
        let plan = plan(3);
        let filter = MockHistoryFilter::new();
        run(&filter, Path::new("."), &plan, &CollectProgress::new(), &CancellationToken::new())
            .await
            .unwrap();
        let expected: Vec<String> = plan
            .commits
            .iter()
            .rev()
            .map(|c| c.record.hash.clone())
            .collect();
        assert_eq!(filter.attempts(), expected);
    }

    #[tokio::test]
    async fn cancel_stops_the_loop() {
        let plan = plan(3);
        let filter = MockHistoryFilter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run(&filter, Path::new("."), &plan, &CollectProgress::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::Cancelled));
        assert!(filter.attempts().is_empty());
    }
}
