use retime_core::commit::short_hash;
use retime_core::date::format_timestamp;
use retime_core::{CompressConfig, RewritePlan, RewriteStrategy};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A commit the per-commit strategy could not rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFailure {
    pub hash: String,
    pub detail: String,
}

/// Counters for one run, owned by the orchestrator and handed back to the
/// driver when the rewrite finishes. Counters only ever go up.
#[derive(Debug)]
pub struct RunState {
    pub strategy: RewriteStrategy,
    pub total: u64,
    /// Attempts, successful or not.
    pub processed: u64,
    pub error_count: u64,
    pub failures: Vec<CommitFailure>,
    started: Instant,
}

impl RunState {
    pub fn new(strategy: RewriteStrategy, total: u64) -> Self {
        Self {
            strategy,
            total,
            processed: 0,
            error_count: 0,
            failures: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
    }

    pub fn record_failure(&mut self, hash: &str, detail: impl Into<String>) {
        self.processed += 1;
        self.error_count += 1;
        self.failures.push(CommitFailure {
            hash: short_hash(hash).to_string(),
            detail: detail.into(),
        });
    }

    /// Batch progress markers report absolute counts. Never moves backwards.
    pub fn advance_to(&mut self, processed: u64) {
        self.processed = self.processed.max(processed.min(self.total));
    }

    pub fn succeeded(&self) -> u64 {
        self.processed - self.error_count
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub strategy: RewriteStrategy,
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub errors: u64,
    pub failures: Vec<CommitFailure>,
    pub ratio: f64,
    pub original_days: f64,
    pub target_days: f64,
    pub duration_secs: f64,
    pub output: Option<PathBuf>,
    pub backup: Option<PathBuf>,
}

impl RunSummary {
    pub fn from_state(state: &RunState, plan: &RewritePlan, duration: Duration) -> Self {
        Self {
            strategy: state.strategy,
            total: state.total,
            processed: state.processed,
            succeeded: state.succeeded(),
            errors: state.error_count,
            failures: state.failures.clone(),
            ratio: plan.mapping.compression_ratio.value(),
            original_days: plan.mapping.original_days(),
            target_days: plan.mapping.target_days(),
            duration_secs: duration.as_secs_f64(),
            output: None,
            backup: None,
        }
    }

    /// Summary for a source with no commits: nothing processed, nothing written.
    pub fn empty(config: &CompressConfig, duration: Duration) -> Self {
        Self {
            strategy: config.strategy,
            total: 0,
            processed: 0,
            succeeded: 0,
            errors: 0,
            failures: Vec::new(),
            ratio: config.compression_ratio.value(),
            original_days: 0.0,
            target_days: 0.0,
            duration_secs: duration.as_secs_f64(),
            output: None,
            backup: None,
        }
    }
}

/// Mapping preview produced without touching the filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub strategy: RewriteStrategy,
    pub commits: usize,
    pub ratio: f64,
    pub original_days: f64,
    pub target_days: f64,
    pub original_first: Option<String>,
    pub original_last: Option<String>,
    pub mapped_first: Option<String>,
    pub mapped_last: Option<String>,
    pub output: PathBuf,
    pub output_exists: bool,
}

impl DryRunReport {
    pub fn new(config: &CompressConfig, plan: Option<&RewritePlan>, output_exists: bool) -> Self {
        let mapping = plan.map(|p| p.mapping);
        Self {
            strategy: config.strategy,
            commits: plan.map_or(0, RewritePlan::len),
            ratio: config.compression_ratio.value(),
            original_days: mapping.map_or(0.0, |m| m.original_days()),
            target_days: mapping.map_or(0.0, |m| m.target_days()),
            original_first: mapping.map(|m| format_timestamp(m.original_start)),
            original_last: mapping.map(|m| format_timestamp(m.original_end)),
            mapped_first: plan
                .and_then(RewritePlan::first_new_timestamp)
                .map(format_timestamp),
            mapped_last: plan
                .and_then(RewritePlan::last_new_timestamp)
                .map(format_timestamp),
            output: config.output.clone(),
            output_exists,
        }
    }
}
