//! Disposable working copy of the source history, plus the pre-flight checks
//! and the optional backup of an existing output.
//!
//! The source repository is only ever read. Every rewrite happens inside a
//! [`Snapshot`], whose temp directory is removed when it is dropped.

use crate::git;
use crate::progress::Progress;
use anyhow::{Context, Result};
use retime_core::CompressError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

/// Fail with `NotARepository` unless `source` holds recoverable history.
pub async fn ensure_repository(source: &Path) -> Result<(), CompressError> {
    if git::is_repository(source).await {
        Ok(())
    } else {
        Err(CompressError::NotARepository(source.to_path_buf()))
    }
}

/// Fail with `OutputExists` when `output` is present and `force` is off.
pub fn check_output(output: &Path, force: bool) -> Result<(), CompressError> {
    if !force && output.symlink_metadata().is_ok() {
        return Err(CompressError::OutputExists(output.to_path_buf()));
    }
    Ok(())
}

/// `<output>_backup_<unix-millis>`, next to the output.
pub fn backup_path(output: &Path, millis: u128) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(format!("_backup_{millis}"));
    output.with_file_name(name)
}

/// Copy an existing output aside before anything else happens.
///
/// Returns `None` when there is nothing to back up.
pub fn backup_output(output: &Path, progress: &dyn Progress) -> Result<Option<PathBuf>, CompressError> {
    if !output.exists() {
        return Ok(None);
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let dest = backup_path(output, millis);

    let total = count_files(output).map_err(CompressError::snapshot)?;
    progress.start("Backing up output", total);
    let mut copied = 0u64;
    let result = copy_tree(output, &dest, &mut |_| {
        copied += 1;
        progress.tick(copied, total);
    });
    progress.finish();
    result
        .with_context(|| format!("backing up {} to {}", output.display(), dest.display()))
        .map_err(CompressError::snapshot)?;

    tracing::info!(backup = %dest.display(), files = total, "backed up existing output");
    Ok(Some(dest))
}

/// Number of non-directory entries under `root`.
pub fn count_files(root: &Path) -> Result<u64> {
    let meta = fs::symlink_metadata(root)?;
    if !meta.is_dir() {
        return Ok(1);
    }
    let mut n = 0;
    for entry in fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
        n += count_files(&entry?.path())?;
    }
    Ok(n)
}

/// Recursive copy. `on_file` runs once per file or symlink copied.
pub fn copy_tree(src: &Path, dest: &Path, on_file: &mut dyn FnMut(&Path)) -> Result<()> {
    let meta = fs::symlink_metadata(src).with_context(|| format!("reading {}", src.display()))?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)?;
        on_file(src);
    } else if meta.is_dir() {
        fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()), on_file)?;
        }
    } else {
        fs::copy(src, dest)
            .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
        on_file(src);
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(&target, dest)
        .with_context(|| format!("linking {}", dest.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest).with_context(|| format!("copying {}", src.display()))?;
    Ok(())
}

/// An isolated full clone of the source. Dropping it deletes the clone.
pub struct Snapshot {
    dir: TempDir,
    repo: PathBuf,
}

impl Snapshot {
    /// Clone `source` into a fresh temp directory and make every branch local.
    pub async fn create(source: &Path) -> Result<Self, CompressError> {
        let dir = tempfile::Builder::new()
            .prefix("retime-snapshot-")
            .tempdir()
            .map_err(|e| CompressError::snapshot(format!("creating temp dir: {e}")))?;
        let repo = dir.path().join("snapshot");

        git::clone_full(source, &repo)
            .await
            .map_err(CompressError::snapshot)?;
        git::detach_from_origin(&repo)
            .await
            .map_err(CompressError::snapshot)?;

        tracing::debug!(snapshot = %repo.display(), "snapshot created");
        Ok(Self { dir, repo })
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
