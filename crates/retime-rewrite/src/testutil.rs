//! Throwaway git repositories for tests. Dates are pinned through the
//! environment so assertions can name exact timestamps.

use std::path::Path;
use std::process::Command;

pub const DAY: i64 = 86_400;
/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000;

pub fn git_sync(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("git must be installed to run these tests");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git_sync(dir, &["init", "--quiet"]);
    git_sync(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git_sync(dir, &["config", "user.email", "test@test.com"]);
    git_sync(dir, &["config", "user.name", "Test"]);
    git_sync(dir, &["config", "commit.gpgsign", "false"]);
}

/// Commit a new file named after `msg`, authored and committed at `ts`.
pub fn commit_at(dir: &Path, msg: &str, ts: i64) -> String {
    std::fs::write(dir.join(format!("file-{msg}.txt")), msg).unwrap();
    git_sync(dir, &["add", "."]);
    let date = format!("@{ts} +0000");
    let out = Command::new("git")
        .args(["commit", "--quiet", "-m", msg])
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "commit failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    git_sync(dir, &["rev-parse", "HEAD"]).trim().to_string()
}

/// Repository with one commit per offset (in days from [`T0`]).
pub fn repo_with_history(dir: &Path, day_offsets: &[i64]) -> Vec<String> {
    init_repo(dir);
    day_offsets
        .iter()
        .enumerate()
        .map(|(i, d)| commit_at(dir, &format!("c{i}"), T0 + d * DAY))
        .collect()
}

/// `(author unix time, author name, subject)` for every commit on `main`,
/// oldest first.
pub fn author_dates(dir: &Path) -> Vec<(i64, String, String)> {
    git_sync(dir, &["log", "--reverse", "--format=%at|%an|%s", "main"])
        .lines()
        .map(|l| {
            let mut p = l.splitn(3, '|');
            let ts = p.next().unwrap().parse().unwrap();
            let name = p.next().unwrap().to_string();
            let subject = p.next().unwrap().to_string();
            (ts, name, subject)
        })
        .collect()
}
