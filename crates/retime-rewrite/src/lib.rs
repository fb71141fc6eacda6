//! History rewriting engine for retime.
//!
//! Takes a validated [`retime_core::CompressConfig`], clones the source into
//! a disposable snapshot, rewrites commit dates there with an external
//! history filter, and materializes the result at the output path.

pub mod env;
pub mod filter;
pub mod finalize;
pub mod git;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod testutil;

pub use filter::{GitHistoryFilter, HistoryFilter, MockHistoryFilter};
pub use progress::{BarProgress, CollectProgress, NullProgress, Progress};
pub use runner::{compress, dry_run};
pub use state::{CommitFailure, DryRunReport, RunState, RunSummary};
