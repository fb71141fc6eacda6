use anyhow::Result;
use clap::Args;
use retime_core::jitter::{DEFAULT_ANON_EMAIL, DEFAULT_ANON_NAME, DEFAULT_JITTER_MINUTES};
use retime_core::{CompressConfig, CompressOptions, RewriteStrategy};
use retime_rewrite::{
    BarProgress, DryRunReport, GitHistoryFilter, NullProgress, Progress, RunSummary,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Repository whose history is read (never modified)
    #[arg(short, long, env = "SOURCE_DIR", default_value = "./source")]
    pub source: PathBuf,
    /// Where the rewritten repository is written
    #[arg(short, long, env = "OUTPUT_DIR", default_value = "./destination")]
    pub output: PathBuf,
    /// First instant of the new timeline (ISO 8601, default: now)
    #[arg(long, env = "START_DATE")]
    pub start_date: Option<String>,
    /// Last instant of the new timeline; derives the target span with --original-days
    #[arg(long, env = "END_DATE")]
    pub end_date: Option<String>,
    /// New span as a fraction of the original (0 < ratio <= 1)
    #[arg(short = 'r', long, env = "COMPRESSION_RATIO")]
    pub compression_ratio: Option<f64>,
    /// Length of the original history in days
    #[arg(long, env = "ORIGINAL_DAYS")]
    pub original_days: Option<f64>,
    /// Length of the new history in days
    #[arg(long, env = "TARGET_DAYS")]
    pub target_days: Option<f64>,
    /// Permit an explicit ratio above 1 (stretch instead of compress)
    #[arg(long)]
    pub allow_expansion: bool,
    /// Rewrite strategy: per-commit or batch
    #[arg(long, env = "RETIME_STRATEGY", default_value_t = RewriteStrategy::PerCommit)]
    pub strategy: RewriteStrategy,
    /// Add a random offset to every mapped timestamp
    #[arg(long)]
    pub jitter: bool,
    /// Jitter window in minutes, either side of the mapped time
    #[arg(long, env = "RETIME_JITTER_MINUTES", default_value_t = DEFAULT_JITTER_MINUTES)]
    pub jitter_minutes: u32,
    /// Replace author and committer identity on every commit
    #[arg(long)]
    pub anonymize: bool,
    /// Name used by --anonymize
    #[arg(long, env = "RETIME_ANON_NAME", default_value = DEFAULT_ANON_NAME)]
    pub anon_name: String,
    /// Email used by --anonymize
    #[arg(long, env = "RETIME_ANON_EMAIL", default_value = DEFAULT_ANON_EMAIL)]
    pub anon_email: String,
    /// Seed for reproducible jitter
    #[arg(long)]
    pub seed: Option<u64>,
    /// Copy an existing output aside before replacing it
    #[arg(long, env = "BACKUP_ORIGINAL")]
    pub backup: bool,
    /// Replace an existing output
    #[arg(short, long, env = "FORCE")]
    pub force: bool,
    /// Show the mapping without writing anything
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,
    /// Debug logging, including every commit mapping
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,
    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl CompressArgs {
    fn to_options(&self) -> CompressOptions {
        CompressOptions {
            source: self.source.clone(),
            output: self.output.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            compression_ratio: self.compression_ratio,
            original_days: self.original_days,
            target_days: self.target_days,
            allow_expansion: self.allow_expansion,
            strategy: self.strategy,
            jitter: self.jitter,
            jitter_minutes: self.jitter_minutes,
            anonymize: self.anonymize,
            anon_name: self.anon_name.clone(),
            anon_email: self.anon_email.clone(),
            seed: self.seed,
            backup: self.backup,
            force: self.force,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

/// Execute `retime compress`
pub fn execute(args: CompressArgs) -> Result<()> {
    let config = CompressConfig::resolve(args.to_options())?;
    let rt = tokio::runtime::Runtime::new()?;

    if config.dry_run {
        let report = rt.block_on(retime_rewrite::dry_run(&config))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let progress: Box<dyn Progress> = if args.no_progress || args.json {
        Box::new(NullProgress)
    } else {
        Box::new(BarProgress::new())
    };
    let filter = GitHistoryFilter::new();
    let summary = rt.block_on(retime_rewrite::compress(
        &config,
        &filter,
        progress.as_ref(),
        &cancel,
    ))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_report(report: &DryRunReport) {
    println!("[dry-run] {} commits, strategy {}", report.commits, report.strategy);
    println!("  Ratio:    {:.3}", report.ratio);
    println!(
        "  Span:     {:.1} days -> {:.1} days",
        report.original_days, report.target_days
    );
    if let (Some(first), Some(last)) = (&report.original_first, &report.original_last) {
        println!("  Original: {first} .. {last}");
    }
    if let (Some(first), Some(last)) = (&report.mapped_first, &report.mapped_last) {
        println!("  Mapped:   {first} .. {last}");
    }
    println!(
        "  Output:   {}{}",
        report.output.display(),
        if report.output_exists {
            " (exists, needs --force)"
        } else {
            ""
        }
    );
}

fn print_summary(summary: &RunSummary) {
    if summary.total == 0 {
        println!("Nothing to compress: source has no commits.");
        return;
    }
    println!("Compression complete ({})", summary.strategy);
    println!(
        "  Commits:  {}/{} processed, {} failed",
        summary.processed, summary.total, summary.errors
    );
    println!(
        "  Ratio:    {:.3} ({:.1} days -> {:.1} days)",
        summary.ratio, summary.original_days, summary.target_days
    );
    println!("  Duration: {:.1}s", summary.duration_secs);
    if let Some(output) = &summary.output {
        println!("  Output:   {}", output.display());
    }
    if let Some(backup) = &summary.backup {
        println!("  Backup:   {}", backup.display());
    }
    if !summary.failures.is_empty() {
        println!("\n  Kept original metadata:");
        for failure in &summary.failures {
            println!("    {}  {}", failure.hash, failure.detail);
        }
    }
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
