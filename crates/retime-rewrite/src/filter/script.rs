//! Scripts handed to the rewrite tools: a shell `--env-filter` for
//! `git filter-branch` and a Python `--commit-callback` body for
//! `git filter-repo`.

use retime_core::{Identity, PlannedCommit, RewritePlan};
use std::fmt::Write;
use std::path::Path;

/// Batch progress marker printed by the callback.
pub const PROGRESS_MARKER: &str = "PROGRESS:";
/// Commits between progress markers.
pub const PROGRESS_INTERVAL: u64 = 100;

/// Git's raw date format: `@<unix> +0000` for the shell, `<unix> +0000` in
/// filter-repo's commit objects.
fn raw_date(ts: i64) -> String {
    format!("{ts} +0000")
}

/// Single-quote for POSIX sh.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Env filter that retimes (and optionally re-attributes) one commit.
pub fn env_filter_script(commit: &PlannedCommit, identity: Option<&Identity>) -> String {
    let date = shell_quote(&format!("@{}", raw_date(commit.new_timestamp)));
    let mut script = format!(
        "if [ \"$GIT_COMMIT\" = {} ]; then\n",
        shell_quote(&commit.record.hash)
    );
    let _ = writeln!(script, "    export GIT_AUTHOR_DATE={date}");
    let _ = writeln!(script, "    export GIT_COMMITTER_DATE={date}");
    if let Some(id) = identity {
        let name = shell_quote(&id.name);
        let email = shell_quote(&id.email);
        let _ = writeln!(script, "    export GIT_AUTHOR_NAME={name}");
        let _ = writeln!(script, "    export GIT_AUTHOR_EMAIL={email}");
        let _ = writeln!(script, "    export GIT_COMMITTER_NAME={name}");
        let _ = writeln!(script, "    export GIT_COMMITTER_EMAIL={email}");
    }
    script.push_str("fi\n");
    script
}

/// Python bytes literal with every byte hex-escaped.
pub fn py_bytes(s: impl AsRef<[u8]>) -> String {
    let s = s.as_ref();
    let mut out = String::with_capacity(s.len() * 4 + 3);
    out.push_str("b\"");
    for b in s {
        let _ = write!(out, "\\x{b:02x}");
    }
    out.push('"');
    out
}

/// Hash-to-date table read by the batch callback, one `<hash> <unix>` line
/// per planned commit.
pub fn date_table(plan: &RewritePlan) -> String {
    let mut table = String::with_capacity(plan.len() * 56);
    for planned in &plan.commits {
        let _ = writeln!(table, "{} {}", planned.record.hash, planned.new_timestamp);
    }
    table
}

/// `--commit-callback` body for `git filter-repo`.
///
/// filter-repo calls the body once per commit with `commit` in scope. The
/// first call loads the date table from `table` into the callback's globals,
/// so the body stays the same size however long the history is.
pub fn commit_callback(table: &Path, identity: Option<&Identity>) -> String {
    let mut body = String::new();
    body.push_str("if \"_retime_dates\" not in globals():\n");
    body.push_str("    _dates = {}\n");
    let _ = writeln!(
        body,
        "    with open({}, \"rb\") as _table:",
        py_bytes(table.to_string_lossy().as_bytes())
    );
    body.push_str("        for _line in _table:\n");
    body.push_str("            _fields = _line.split()\n");
    body.push_str("            if len(_fields) == 2:\n");
    body.push_str("                _dates[_fields[0]] = _fields[1] + b\" +0000\"\n");
    body.push_str("    globals()[\"_retime_dates\"] = _dates\n");
    body.push_str("    globals()[\"_retime_seen\"] = 0\n");
    body.push_str("_new = globals()[\"_retime_dates\"].get(commit.original_id)\n");
    body.push_str("if _new is not None:\n");
    body.push_str("    commit.author_date = _new\n");
    body.push_str("    commit.committer_date = _new\n");
    if let Some(id) = identity {
        let name = py_bytes(&id.name);
        let email = py_bytes(&id.email);
        let _ = writeln!(body, "commit.author_name = {name}");
        let _ = writeln!(body, "commit.author_email = {email}");
        let _ = writeln!(body, "commit.committer_name = {name}");
        let _ = writeln!(body, "commit.committer_email = {email}");
    }
    body.push_str("globals()[\"_retime_seen\"] += 1\n");
    let _ = writeln!(
        body,
        "if globals()[\"_retime_seen\"] % {PROGRESS_INTERVAL} == 0:"
    );
    let _ = writeln!(
        body,
        "    print(\"{PROGRESS_MARKER}%d\" % globals()[\"_retime_seen\"], flush=True)"
    );
    body
}
