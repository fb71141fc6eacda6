use crate::commit::CommitRecord;
use crate::date::is_representable;
use crate::error::CompressError;
use crate::jitter::{Identity, Jitter};
use crate::timeline::{CompressionRatio, TimelineMapping};
use rand::Rng;

/// A commit paired with the timestamp it will carry after the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommit {
    pub record: CommitRecord,
    pub new_timestamp: i64,
}

/// The full mapping for one run, computed up front from the commit list.
#[derive(Debug, Clone)]
pub struct RewritePlan {
    pub mapping: TimelineMapping,
    /// Ancestry order, oldest first.
    pub commits: Vec<PlannedCommit>,
    pub identity: Option<Identity>,
}

impl RewritePlan {
    /// Map every commit onto the new timeline, then jitter it if asked.
    ///
    /// `None` when there are no commits.
    pub fn build<R: Rng + ?Sized>(
        commits: Vec<CommitRecord>,
        ratio: CompressionRatio,
        start_timestamp: i64,
        jitter: Option<Jitter>,
        identity: Option<Identity>,
        rng: &mut R,
    ) -> Option<Self> {
        let timestamps: Vec<i64> = commits.iter().map(|c| c.timestamp).collect();
        let mapping = TimelineMapping::from_timestamps(&timestamps, ratio, start_timestamp)?;
        let commits = commits
            .into_iter()
            .map(|record| {
                let mapped = mapping.map(record.timestamp);
                let new_timestamp = match jitter {
                    Some(j) => j.apply(mapped, rng),
                    None => mapped,
                };
                PlannedCommit {
                    record,
                    new_timestamp,
                }
            })
            .collect();
        Some(Self {
            mapping,
            commits,
            identity,
        })
    }

    /// Fails when any planned date cannot be written back to git.
    pub fn check_range(&self) -> Result<(), CompressError> {
        self.mapping.check_range()?;
        match self
            .commits
            .iter()
            .find(|c| !is_representable(c.new_timestamp))
        {
            Some(c) => Err(CompressError::Configuration(format!(
                "commit {} maps to unrepresentable timestamp {}",
                c.record.short_hash(),
                c.new_timestamp
            ))),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn first_new_timestamp(&self) -> Option<i64> {
        self.commits.iter().map(|c| c.new_timestamp).min()
    }

    pub fn last_new_timestamp(&self) -> Option<i64> {
        self.commits.iter().map(|c| c.new_timestamp).max()
    }
}
