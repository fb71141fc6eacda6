//! Thin async wrappers over the `git` binary.
//!
//! Only plumbing the engine needs: clone, enumerate commits, detach a clone
//! from its origin, and scrub a working tree.

use anyhow::{bail, Context, Result};
use retime_core::CommitRecord;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub const GIT_BIN: &str = "git";

/// Field separator for `git log --format`. Never appears in names or subjects.
const FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%H%x1f%at%x1f%an%x1f%ae%x1f%s";

/// Run git and return stdout. Non-zero exit is an error carrying stderr.
pub async fn run_git<I, S>(cwd: Option<&Path>, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    let mut cmd = Command::new(GIT_BIN);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to spawn git {}", display_args(&args)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git {} exited with code {}: {}",
            display_args(&args),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when `path` holds history git can read: a work tree with `.git`,
/// or a bare repository rooted at `path`.
pub async fn is_repository(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    if path.join(".git").exists() {
        return true;
    }
    match run_git(Some(path), ["rev-parse", "--is-bare-repository", "--git-dir"]).await {
        Ok(out) => {
            let mut lines = out.lines();
            lines.next() == Some("true") && lines.next() == Some(".")
        }
        Err(_) => false,
    }
}

/// Every commit reachable from branches and tags, oldest first, parents
/// before children.
pub async fn list_commits(repo: &Path) -> Result<Vec<CommitRecord>> {
    let refs = run_git(
        Some(repo),
        ["for-each-ref", "--count=1", "--format=%(refname)", "refs/heads", "refs/tags"],
    )
    .await?;
    if refs.trim().is_empty() {
        return Ok(Vec::new());
    }
    let out = run_git(
        Some(repo),
        [
            "log",
            "--reverse",
            "--topo-order",
            LOG_FORMAT,
            "--branches",
            "--tags",
        ],
    )
    .await
    .context("listing commits")?;
    parse_commit_log(&out)
}

/// Parse `git log` output produced with [`LOG_FORMAT`].
pub fn parse_commit_log(out: &str) -> Result<Vec<CommitRecord>> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let mut parts = line.splitn(5, FIELD_SEP);
            let hash = parts.next().unwrap_or_default();
            let ts = parts.next().unwrap_or_default();
            let (Some(author), Some(email)) = (parts.next(), parts.next()) else {
                bail!("malformed log line: {line:?}");
            };
            let message = parts.next().unwrap_or_default();
            if hash.len() < 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("malformed commit hash in log line: {line:?}");
            }
            let timestamp: i64 = ts
                .parse()
                .with_context(|| format!("bad timestamp {ts:?} for {hash}"))?;
            Ok(CommitRecord {
                hash: hash.to_string(),
                timestamp,
                author: author.to_string(),
                email: email.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}

/// Full, non-shared clone of `source` into `dest`.
pub async fn clone_full(source: &Path, dest: &Path) -> Result<()> {
    run_git(
        None,
        [
            OsStr::new("clone"),
            OsStr::new("--no-local"),
            OsStr::new("--quiet"),
            source.as_os_str(),
            dest.as_os_str(),
        ],
    )
    .await
    .with_context(|| format!("cloning {} into {}", source.display(), dest.display()))?;
    Ok(())
}

/// Turn every `origin/*` branch into a local branch, then drop `origin`.
///
/// A fresh clone only has the default branch locally; the rewrite scope is
/// `--branches --tags`, so the rest must become real branches first.
pub async fn detach_from_origin(repo: &Path) -> Result<()> {
    let current = run_git(Some(repo), ["symbolic-ref", "--quiet", "--short", "HEAD"])
        .await
        .map(|s| s.trim().to_string())
        .ok();
    let remote_branches = run_git(
        Some(repo),
        ["for-each-ref", "--format=%(refname:lstrip=3)", "refs/remotes/origin"],
    )
    .await?;

    for name in remote_branches.lines().map(str::trim) {
        if name.is_empty() || name == "HEAD" || current.as_deref() == Some(name) {
            continue;
        }
        let start = format!("refs/remotes/origin/{name}");
        run_git(Some(repo), ["branch", "--no-track", name, start.as_str()])
            .await
            .with_context(|| format!("creating local branch {name}"))?;
    }

    let remotes = run_git(Some(repo), ["remote"]).await?;
    if remotes.lines().any(|r| r.trim() == "origin") {
        run_git(Some(repo), ["remote", "remove", "origin"]).await?;
    }
    Ok(())
}

/// Throw away uncommitted changes so history rewriting tools will run.
pub async fn discard_working_changes(repo: &Path) -> Result<()> {
    run_git(Some(repo), ["reset", "--hard", "--quiet"])
        .await
        .context("resetting snapshot work tree")?;
    run_git(Some(repo), ["clean", "-fdq"])
        .await
        .context("cleaning snapshot work tree")?;
    Ok(())
}

/// Short names of all local branches.
pub async fn local_branches(repo: &Path) -> Result<Vec<String>> {
    let out = run_git(
        Some(repo),
        ["for-each-ref", "--format=%(refname:short)", "refs/heads"],
    )
    .await?;
    Ok(out.lines().map(|l| l.trim().to_string()).collect())
}
