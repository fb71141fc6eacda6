use anyhow::Result;
use retime_rewrite::env::{self, ToolStatus};

/// Execute `retime doctor`
pub fn execute(json: bool) -> Result<()> {
    let statuses: Vec<ToolStatus> = [env::GIT, env::FILTER_BRANCH, env::FILTER_REPO]
        .into_iter()
        .map(env::probe)
        .collect();

    if json {
        let items: Vec<serde_json::Value> = statuses
            .iter()
            .map(|s| {
                serde_json::json!({
                    "tool": s.tool.name,
                    "found": s.found,
                    "detail": s.detail,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for s in &statuses {
            println!(
                "[{}] {}: {}",
                if s.found { "OK" } else { "MISSING" },
                s.tool.name,
                s.detail
            );
            if !s.found {
                println!("       {}", s.tool.install_hint);
            }
        }
        let has = |name: &str| statuses.iter().any(|s| s.tool.name == name && s.found);
        let git = has(env::GIT.name);
        println!();
        println!(
            "per-commit strategy: {}",
            ready(git && has(env::FILTER_BRANCH.name))
        );
        println!(
            "batch strategy:      {}",
            ready(git && has(env::FILTER_REPO.name))
        );
    }
    Ok(())
}

fn ready(ok: bool) -> &'static str {
    if ok {
        "ready"
    } else {
        "unavailable"
    }
}
