use crate::filter::HistoryFilter;
use crate::progress::Progress;
use crate::state::RunState;
use retime_core::{CompressError, RewritePlan, RewriteStrategy};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PROGRESS_BUFFER: usize = 64;

/// A single filter pass over the whole history. Any failure aborts the run.
pub async fn run(
    filter: &dyn HistoryFilter,
    repo: &Path,
    plan: &RewritePlan,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<RunState, CompressError> {
    let mut state = RunState::new(RewriteStrategy::Batch, plan.len() as u64);
    progress.start("Rewriting history", state.total);

    let (tx, mut rx) = mpsc::channel::<u64>(PROGRESS_BUFFER);
    let pass = filter.rewrite_all(repo, plan, tx, cancel.clone());
    tokio::pin!(pass);

    let result = loop {
        tokio::select! {
            result = &mut pass => break result,
            Some(count) = rx.recv() => {
                state.advance_to(count);
                progress.tick(state.processed, state.total);
            }
        }
    };

    if let Err(e) = result {
        progress.finish();
        return Err(e);
    }
    state.advance_to(state.total);
    progress.tick(state.processed, state.total);
    progress.finish();
    Ok(state)
}
