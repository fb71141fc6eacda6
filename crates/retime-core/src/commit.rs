use serde::{Deserialize, Serialize};

/// One historical commit, as enumerated from the source history.
///
/// Never mutated: remapping a timestamp produces a new commit downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    /// Author time, unix seconds (UTC).
    pub timestamp: i64,
    pub author: String,
    pub email: String,
    pub message: String,
}

impl CommitRecord {
    /// First 8 characters of the hash, for logs and summaries.
    pub fn short_hash(&self) -> &str {
        short_hash(&self.hash)
    }
}

pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}
