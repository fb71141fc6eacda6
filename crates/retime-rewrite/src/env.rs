use crate::git::GIT_BIN;
use retime_core::{CompressError, RewriteStrategy};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// How a tool's presence is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// `<program> --version` exits 0.
    Version(&'static str),
    /// `git-<name>` exists in `git --exec-path` or on `PATH`.
    GitSubcommand(&'static str),
}

/// An external executable the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub probe: Probe,
    pub install_hint: &'static str,
}

pub const GIT: Tool = Tool {
    name: "git",
    probe: Probe::Version(GIT_BIN),
    install_hint: "install git from https://git-scm.com",
};

pub const FILTER_BRANCH: Tool = Tool {
    name: "git filter-branch",
    probe: Probe::GitSubcommand("filter-branch"),
    install_hint: "ships with most git distributions",
};

pub const FILTER_REPO: Tool = Tool {
    name: "git filter-repo",
    probe: Probe::GitSubcommand("filter-repo"),
    install_hint: "pip install git-filter-repo",
};

/// Tools a strategy shells out to (git itself excluded).
pub fn rewrite_tools(strategy: RewriteStrategy) -> Vec<Tool> {
    match strategy {
        RewriteStrategy::PerCommit => vec![FILTER_BRANCH],
        RewriteStrategy::Batch => vec![FILTER_REPO],
    }
}

#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub tool: Tool,
    pub found: bool,
    pub detail: String,
}

/// Check one tool without failing.
pub fn probe(tool: Tool) -> ToolStatus {
    let (found, detail) = match tool.probe {
        Probe::Version(program) => match version_of(program) {
            Some(v) => (true, v),
            None => (false, format!("`{program} --version` failed")),
        },
        Probe::GitSubcommand(name) => match find_git_subcommand(name) {
            Some(path) => (true, path.display().to_string()),
            None => (false, format!("git-{name} not found in git exec path or PATH")),
        },
    };
    ToolStatus {
        tool,
        found,
        detail,
    }
}

/// Confirm every tool is reachable before anything destructive happens.
pub fn verify(tools: &[Tool]) -> Result<(), CompressError> {
    for tool in tools {
        let status = probe(*tool);
        if !status.found {
            return Err(CompressError::Environment {
                tool: tool.name.to_string(),
                detail: format!("{}; {}", status.detail, tool.install_hint),
            });
        }
        tracing::debug!(tool = tool.name, detail = %status.detail, "tool available");
    }
    Ok(())
}

fn version_of(program: &str) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn find_git_subcommand(name: &str) -> Option<PathBuf> {
    let file = format!("git-{name}");
    let exec_path = Command::new(GIT_BIN)
        .arg("--exec-path")
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim()));

    let path_dirs = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();

    exec_path
        .into_iter()
        .chain(path_dirs)
        .find_map(|dir| executable_in(&dir, &file))
}

fn executable_in(dir: &Path, file: &str) -> Option<PathBuf> {
    let candidate = dir.join(file);
    if candidate.is_file() {
        return Some(candidate);
    }
    #[cfg(windows)]
    {
        let exe = dir.join(format!("{file}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}
