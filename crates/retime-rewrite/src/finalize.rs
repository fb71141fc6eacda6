use crate::git;
use crate::snapshot::check_output;
use anyhow::Context;
use retime_core::CompressError;
use std::fs;
use std::path::Path;

/// Materialize the rewritten snapshot at `output`.
///
/// The new repository is cloned into a staging directory beside `output`
/// and renamed into place, so a failure part way leaves any prior output
/// intact. The snapshot itself is cleaned up by its owner.
pub async fn finalize(snapshot_repo: &Path, output: &Path, force: bool) -> Result<(), CompressError> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    fs::create_dir_all(&parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".retime-staging-")
        .tempdir_in(&parent)?;
    let staged_repo = staging.path().join("repo");

    git::clone_full(snapshot_repo, &staged_repo)
        .await
        .map_err(CompressError::snapshot)?;
    git::detach_from_origin(&staged_repo)
        .await
        .map_err(CompressError::snapshot)?;

    // Output may have appeared while the rewrite ran.
    check_output(output, force)?;
    if output.symlink_metadata().is_ok() {
        remove_path(output)
            .with_context(|| format!("removing previous output {}", output.display()))
            .map_err(CompressError::snapshot)?;
    }
    fs::rename(&staged_repo, output)?;

    let branches = git::local_branches(output).await.unwrap_or_default();
    tracing::info!(
        output = %output.display(),
        branches = %branches.join(", "),
        "output written"
    );
    Ok(())
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = path.symlink_metadata()?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
