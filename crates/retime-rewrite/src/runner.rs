//! End-to-end run: validate, snapshot, map, rewrite, finalize.

use crate::env;
use crate::filter::HistoryFilter;
use crate::finalize::finalize;
use crate::git;
use crate::orchestrator;
use crate::progress::Progress;
use crate::snapshot::{self, Snapshot};
use crate::state::{DryRunReport, RunSummary};
use rand::rngs::StdRng;
use rand::SeedableRng;
use retime_core::config::path_overlap;
use retime_core::date::format_timestamp;
use retime_core::{CommitRecord, CompressConfig, CompressError, RewritePlan};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Compress the source history into `config.output`.
///
/// The source is only read. All rewriting happens in a snapshot that is
/// deleted when this returns, and the output is only replaced once the
/// rewrite succeeded. `config.dry_run` is not consulted here; see [`dry_run`].
pub async fn compress(
    config: &CompressConfig,
    filter: &dyn HistoryFilter,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<RunSummary, CompressError> {
    let started = Instant::now();
    if config.verbose {
        if let Ok(json) = serde_json::to_string(config) {
            tracing::debug!(config = %json, "resolved configuration");
        }
    }

    check_paths(config)?;
    let mut tools = vec![env::GIT];
    tools.extend(filter.required_tools(config.strategy));
    env::verify(&tools)?;

    snapshot::ensure_repository(&config.source).await?;
    snapshot::check_output(&config.output, config.force)?;

    let backup = if config.backup {
        snapshot::backup_output(&config.output, progress)?
    } else {
        None
    };

    let snapshot = Snapshot::create(&config.source).await?;
    let commits = git::list_commits(snapshot.repo())
        .await
        .map_err(CompressError::snapshot)?;

    let Some(plan) = build_plan(config, commits)? else {
        tracing::warn!(source = %config.source.display(), "no commits found, nothing to compress");
        let mut summary = RunSummary::empty(config, started.elapsed());
        summary.backup = backup;
        return Ok(summary);
    };
    log_plan(&plan);

    let state = orchestrator::rewrite(
        filter,
        snapshot.repo(),
        &plan,
        config.strategy,
        progress,
        cancel,
    )
    .await?;
    if cancel.is_cancelled() {
        return Err(CompressError::Cancelled);
    }

    finalize(snapshot.repo(), &config.output, config.force).await?;
    drop(snapshot);

    let mut summary = RunSummary::from_state(&state, &plan, started.elapsed());
    summary.output = Some(config.output.clone());
    summary.backup = backup;
    tracing::info!(
        processed = summary.processed,
        total = summary.total,
        errors = summary.errors,
        duration_secs = summary.duration_secs,
        "compression complete"
    );
    Ok(summary)
}

/// Preview the mapping from the source history without writing anything.
pub async fn dry_run(config: &CompressConfig) -> Result<DryRunReport, CompressError> {
    check_paths(config)?;
    env::verify(&[env::GIT])?;
    snapshot::ensure_repository(&config.source).await?;
    let commits = git::list_commits(&config.source)
        .await
        .map_err(CompressError::snapshot)?;
    let plan = build_plan(config, commits)?;
    if let Some(plan) = &plan {
        log_plan(plan);
    }
    Ok(DryRunReport::new(
        config,
        plan.as_ref(),
        config.output.symlink_metadata().is_ok(),
    ))
}

/// `resolve` already refuses overlapping paths; a config built by hand
/// still has to pass before anything is deleted.
fn check_paths(config: &CompressConfig) -> Result<(), CompressError> {
    match path_overlap(&config.source, &config.output) {
        Some(problem) => Err(CompressError::config(problem)),
        None => Ok(()),
    }
}

fn build_plan(
    config: &CompressConfig,
    commits: Vec<CommitRecord>,
) -> Result<Option<RewritePlan>, CompressError> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let plan = RewritePlan::build(
        commits,
        config.compression_ratio,
        config.start_timestamp,
        config.jitter,
        config.identity.clone(),
        &mut rng,
    );
    if let Some(plan) = &plan {
        plan.check_range()?;
    }
    Ok(plan)
}

fn log_plan(plan: &RewritePlan) {
    tracing::info!(
        commits = plan.len(),
        ratio = %plan.mapping.compression_ratio,
        original_days = %format!("{:.1}", plan.mapping.original_days()),
        target_days = %format!("{:.1}", plan.mapping.target_days()),
        "timeline mapped"
    );
    for planned in &plan.commits {
        tracing::debug!(
            "{} -> {}",
            planned.record.short_hash(),
            format_timestamp(planned.new_timestamp)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{GitHistoryFilter, MockHistoryFilter};
    use crate::progress::{CollectProgress, NullProgress};
    use crate::testutil::{author_dates, init_repo, repo_with_history, DAY};
    use retime_core::{CompressOptions, RewriteStrategy};
    use std::fs;
    use std::path::Path;

    fn config(source: &Path, output: &Path) -> CompressOptions {
        CompressOptions {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            start_date: Some("2025-06-18T09:00:00Z".into()),
            compression_ratio: Some(0.5),
            ..CompressOptions::default()
        }
    }

    fn resolve(opts: CompressOptions) -> CompressConfig {
        CompressConfig::resolve(opts).unwrap()
    }

    fn snapshot_listing(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(p) = stack.pop() {
            for entry in fs::read_dir(&p).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(dir).unwrap().display().to_string();
                    out.push((rel, fs::read(&path).unwrap()));
                }
            }
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 10, 25]);
        let out = work.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("prior.txt"), "prior").unwrap();

        let before_src = snapshot_listing(&src);
        let before_out = snapshot_listing(&out);

        let mut opts = config(&src, &out);
        opts.dry_run = true;
        let report = dry_run(&resolve(opts)).await.unwrap();

        assert_eq!(report.commits, 3);
        assert!((report.original_days - 25.0).abs() < 1e-9);
        assert!((report.target_days - 12.5).abs() < 1e-9);
        assert_eq!(report.mapped_first.as_deref(), Some("2025-06-18T09:00:00Z"));
        assert!(report.output_exists);
        assert_eq!(snapshot_listing(&src), before_src);
        assert_eq!(snapshot_listing(&out), before_out);
        let entries: Vec<_> = fs::read_dir(work.path()).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn existing_output_is_refused_untouched() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1]);
        let out = work.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("prior.txt"), "prior").unwrap();

        let err = compress(
            &resolve(config(&src, &out)),
            &MockHistoryFilter::new(),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompressError::OutputExists(_)));
        assert_eq!(fs::read_to_string(out.join("prior.txt")).unwrap(), "prior");
    }

    #[tokio::test]
    async fn output_naming_the_source_is_refused() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1]);
        fs::write(src.join("untracked.txt"), "keep me").unwrap();
        let before = author_dates(&src);

        let mut opts = config(&src, &work.path().join("src/../src"));
        opts.force = true;
        let err = CompressConfig::resolve(opts.clone()).unwrap_err();
        assert!(matches!(err, CompressError::Configuration(_)));

        // A config assembled without `resolve` is stopped by the run itself.
        let mut unchecked = resolve(config(&src, &work.path().join("other")));
        unchecked.output = opts.output;
        unchecked.force = true;
        let err = compress(
            &unchecked,
            &MockHistoryFilter::new(),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompressError::Configuration(_)));

        assert_eq!(fs::read_to_string(src.join("untracked.txt")).unwrap(), "keep me");
        assert_eq!(author_dates(&src), before);
    }

    #[tokio::test]
    async fn expansion_past_date_range_is_refused() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1]);
        let out = work.path().join("out");

        let mut opts = config(&src, &out);
        opts.compression_ratio = Some(1e300);
        opts.allow_expansion = true;
        let config = resolve(opts);

        let err = dry_run(&config).await.unwrap_err();
        assert!(matches!(err, CompressError::Configuration(_)));
        let err = compress(
            &config,
            &MockHistoryFilter::new(),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompressError::Configuration(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn per_commit_rewrite_lands_mapped_dates_in_output() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 2, 4]);
        let out = work.path().join("out");
        let before = author_dates(&src);

        let mut opts = config(&src, &out);
        opts.anonymize = true;
        let summary = compress(
            &resolve(opts),
            &GitHistoryFilter::new(),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.errors, 0);
        // 2025-06-18T09:00:00Z, then half of each two-day gap.
        let start = 1_750_237_200;
        assert_eq!(
            author_dates(&out),
            vec![
                (start, "Dev Team".to_string(), "c0".to_string()),
                (start + DAY, "Dev Team".to_string(), "c1".to_string()),
                (start + 2 * DAY, "Dev Team".to_string(), "c2".to_string()),
            ]
        );
        assert_eq!(author_dates(&src), before);
    }

    #[tokio::test]
    async fn non_repository_is_refused() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        fs::create_dir(&src).unwrap();
        let err = compress(
            &resolve(config(&src, &work.path().join("out"))),
            &MockHistoryFilter::new(),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompressError::NotARepository(_)));
    }

    #[tokio::test]
    async fn per_commit_failure_still_succeeds() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        let hashes = repo_with_history(&src, &[0, 1, 2, 3, 4]);
        let out = work.path().join("out");

        let filter = MockHistoryFilter::new().fail_commit(hashes[3].clone());
        let summary = compress(
            &resolve(config(&src, &out)),
            &filter,
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.strategy, RewriteStrategy::PerCommit);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failures[0].hash, &hashes[3][..8]);
        assert_eq!(summary.output.as_deref(), Some(out.as_path()));
        assert_eq!(author_dates(&out).len(), 5);
        // Source is never rewritten.
        assert_eq!(author_dates(&src), author_dates(&out));
    }

    #[tokio::test]
    async fn batch_failure_leaves_no_output() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1, 2, 3, 4]);
        let out = work.path().join("out");
        let before = author_dates(&src);

        let mut opts = config(&src, &out);
        opts.strategy = RewriteStrategy::Batch;
        let err = compress(
            &resolve(opts),
            &MockHistoryFilter::new().fail_batch("exit code 1"),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CompressError::BatchRewrite(_)));
        assert!(!out.exists());
        assert_eq!(author_dates(&src), before);
    }

    #[tokio::test]
    async fn batch_failure_keeps_prior_output() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1]);
        let out = work.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("prior.txt"), "prior").unwrap();

        let mut opts = config(&src, &out);
        opts.strategy = RewriteStrategy::Batch;
        opts.force = true;
        compress(
            &resolve(opts),
            &MockHistoryFilter::new().fail_batch("boom"),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(fs::read_to_string(out.join("prior.txt")).unwrap(), "prior");
    }

    #[tokio::test]
    async fn backup_holds_pre_run_output() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1]);
        let out = work.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("prior.txt"), "prior").unwrap();

        let mut opts = config(&src, &out);
        opts.force = true;
        opts.backup = true;
        let progress = CollectProgress::new();
        let summary = compress(
            &resolve(opts),
            &MockHistoryFilter::new(),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let backup = summary.backup.unwrap();
        assert_ne!(backup, out);
        assert_eq!(fs::read_to_string(backup.join("prior.txt")).unwrap(), "prior");
        assert!(!out.join("prior.txt").exists());
        assert_eq!(author_dates(&out).len(), 2);
        assert_eq!(
            progress.labels(),
            ["Backing up output", "Rewriting commits"]
        );
    }

    #[tokio::test]
    async fn empty_history_writes_nothing() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        init_repo(&src);
        let out = work.path().join("out");

        let summary = compress(
            &resolve(config(&src, &out)),
            &MockHistoryFilter::new(),
            &NullProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.output.is_none());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn cancelled_run_leaves_no_output() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("src");
        repo_with_history(&src, &[0, 1]);
        let out = work.path().join("out");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = compress(
            &resolve(config(&src, &out)),
            &MockHistoryFilter::new(),
            &NullProgress,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompressError::Cancelled));
        assert!(!out.exists());
    }
}
