pub mod commit;
pub mod config;
pub mod date;
pub mod error;
pub mod jitter;
pub mod plan;
pub mod timeline;

pub use commit::CommitRecord;
pub use config::{CompressConfig, CompressOptions, RatioSource, RewriteStrategy};
pub use error::CompressError;
pub use jitter::{Identity, Jitter};
pub use plan::{PlannedCommit, RewritePlan};
pub use timeline::{CompressionRatio, TimelineMapping};
