mod cmd_compress;
mod cmd_doctor;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "retime",
    version,
    about = "Compress or stretch the commit timeline of a git repository"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite a copy of the source history onto a new timeline
    Compress(cmd_compress::CompressArgs),
    /// Check that git and the history rewrite tools are installed
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // `.env` fills in variables the environment does not already set.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let verbose = matches!(&cli.cmd, Command::Compress(args) if args.verbose);
    init_tracing(verbose);

    match cli.cmd {
        Command::Compress(args) => cmd_compress::execute(args),
        Command::Doctor { json } => cmd_doctor::execute(json),
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// `RUST_LOG` overrides the level picked by `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "retime=debug,retime_core=debug,retime_rewrite=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
