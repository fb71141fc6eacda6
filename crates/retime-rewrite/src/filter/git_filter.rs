use crate::env::{self, Tool};
use crate::filter::script::{commit_callback, date_table, env_filter_script};
use crate::filter::stream::{drain_tail, ProgressMonitor, STDERR_TAIL};
use crate::filter::HistoryFilter;
use crate::git::GIT_BIN;
use async_trait::async_trait;
use retime_core::{CompressError, Identity, PlannedCommit, RewritePlan, RewriteStrategy};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Rewrites history with `git filter-branch` (per commit) or
/// `git filter-repo` (batch).
pub struct GitHistoryFilter {
    git_bin: String,
}

impl GitHistoryFilter {
    pub fn new() -> Self {
        Self {
            git_bin: GIT_BIN.to_string(),
        }
    }

    pub fn with_git_bin(mut self, bin: impl Into<String>) -> Self {
        self.git_bin = bin.into();
        self
    }
}

impl Default for GitHistoryFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryFilter for GitHistoryFilter {
    fn required_tools(&self, strategy: RewriteStrategy) -> Vec<Tool> {
        env::rewrite_tools(strategy)
    }

    async fn rewrite_commit(
        &self,
        repo: &Path,
        commit: &PlannedCommit,
        identity: Option<&Identity>,
        cancel: CancellationToken,
    ) -> Result<(), CompressError> {
        let script = env_filter_script(commit, identity);
        let mut cmd = Command::new(&self.git_bin);
        cmd.args(["filter-branch", "-f", "--tag-name-filter", "cat", "--env-filter"])
            .arg(&script)
            .args(["--", "--branches", "--tags"])
            .current_dir(repo)
            .env("FILTER_BRANCH_SQUELCH_WARNING", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let failed = |detail: String| CompressError::CommitRewrite {
            hash: commit.record.hash.clone(),
            detail,
        };
        let child = cmd
            .spawn()
            .map_err(|e| failed(format!("failed to spawn git filter-branch: {e}")))?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output.map_err(|e| failed(e.to_string()))?;
                if output.status.success() {
                    Ok(())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(failed(format!(
                        "git filter-branch exited with code {}: {}",
                        output.status.code().unwrap_or(-1),
                        last_lines(&stderr, STDERR_TAIL)
                    )))
                }
            }
            // Dropping the wait future drops the child, which kills it.
            _ = cancel.cancelled() => Err(CompressError::Cancelled),
        }
    }

    async fn rewrite_all(
        &self,
        repo: &Path,
        plan: &RewritePlan,
        progress: mpsc::Sender<u64>,
        cancel: CancellationToken,
    ) -> Result<(), CompressError> {
        // The table lives beside the snapshot repository until the child exits.
        let table = write_date_table(repo, plan)?;
        let callback = commit_callback(table.path(), plan.identity.as_ref());
        let mut child = Command::new(&self.git_bin)
            .args(["filter-repo", "--force", "--commit-callback"])
            .arg(&callback)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompressError::BatchRewrite(format!("failed to spawn git filter-repo: {e}"))
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(CompressError::BatchRewrite(
                "git filter-repo output pipes unavailable".into(),
            ));
        };
        // Both pipes drain while the child runs.
        let monitor = tokio::spawn(ProgressMonitor::new(stdout, progress).run());
        let drain = tokio::spawn(drain_tail(stderr, STDERR_TAIL));

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| CompressError::BatchRewrite(format!("waiting for git filter-repo: {e}")))?;
                let tail = drain.await.unwrap_or_default();
                let _ = monitor.await;
                if status.success() {
                    Ok(())
                } else {
                    Err(CompressError::BatchRewrite(format!(
                        "git filter-repo exited with code {}: {}",
                        status.code().unwrap_or(-1),
                        tail.join("\n")
                    )))
                }
            }
            _ = cancel.cancelled() => {
                child.kill().await.ok();
                monitor.abort();
                drain.abort();
                Err(CompressError::Cancelled)
            }
        }
    }
}

fn write_date_table(
    repo: &Path,
    plan: &RewritePlan,
) -> Result<tempfile::NamedTempFile, CompressError> {
    let failed = |e: std::io::Error| {
        CompressError::BatchRewrite(format!("failed to write date table: {e}"))
    };
    let mut builder = tempfile::Builder::new();
    builder.prefix(".retime-dates-").suffix(".txt");
    let mut table = match repo.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => builder.tempfile_in(parent),
        _ => builder.tempfile(),
    }
    .map_err(failed)?;
    table.write_all(date_table(plan).as_bytes()).map_err(failed)?;
    table.flush().map_err(failed)?;
    Ok(table)
}

fn last_lines(text: &str, keep: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(keep)..].join("\n")
}
