use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop (or dent) a compression run.
///
/// Only [`CompressError::CommitRewrite`] is non-fatal: the per-commit
/// strategy records it and moves on to the next commit.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("required tool not available: {tool} ({detail})")]
    Environment { tool: String, detail: String },

    #[error("'{}' is not a git repository (no recoverable history)", .0.display())]
    NotARepository(PathBuf),

    #[error("output '{}' already exists; use --force to overwrite", .0.display())]
    OutputExists(PathBuf),

    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error("could not rewrite commit {hash}: {detail}")]
    CommitRewrite { hash: String, detail: String },

    #[error("batch rewrite failed: {0}")]
    BatchRewrite(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CompressError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CompressError::CommitRewrite { .. })
    }

    /// Shorthand for a configuration error built from a message.
    pub fn config(msg: impl Into<String>) -> Self {
        CompressError::Configuration(msg.into())
    }

    /// Wrap a snapshot-stage failure, keeping the whole context chain.
    pub fn snapshot(err: impl std::fmt::Display) -> Self {
        CompressError::Snapshot(format!("{err:#}"))
    }
}
