use crate::filter::script::PROGRESS_MARKER;
use anyhow::Result;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Lines of stderr kept for the error message of a failed pass.
pub const STDERR_TAIL: usize = 20;

/// Absolute count from a `PROGRESS:<n>` marker.
pub fn parse_progress(fragment: &str) -> Option<u64> {
    fragment
        .trim()
        .strip_prefix(PROGRESS_MARKER)?
        .trim()
        .parse()
        .ok()
}

/// Reads the rewrite tool's stdout line by line and forwards progress
/// markers. Never waits on the receiver so the child's pipe keeps draining.
pub struct ProgressMonitor<R> {
    reader: BufReader<R>,
    tx: mpsc::Sender<u64>,
    last: u64,
}

impl<R: AsyncRead + Unpin> ProgressMonitor<R> {
    pub fn new(stdout: R, tx: mpsc::Sender<u64>) -> Self {
        Self {
            reader: BufReader::new(stdout),
            tx,
            last: 0,
        }
    }

    /// Read until EOF. Returns the highest count seen.
    pub async fn run(mut self) -> Result<u64> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            }
            // filter-repo redraws its own status with \r on the same line.
            for count in line.split('\r').filter_map(parse_progress) {
                self.last = self.last.max(count);
                // Full channel: skip, the next marker supersedes this one.
                let _ = self.tx.try_send(count);
            }
        }
        Ok(self.last)
    }
}

/// Drain a pipe to EOF, keeping the last `keep` non-empty lines.
pub async fn drain_tail<R: AsyncRead + Unpin>(reader: R, keep: usize) -> Vec<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(keep);
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}
