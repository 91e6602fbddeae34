//! reposync: keep shared files in sync across many repositories.
//!
//! # Usage
//!
//! ```text
//! reposync sync --config sync.yaml --targets targets.yaml --source ./shared [--dry-run [--diff]] [--yes] [--json]
//! reposync snapshot --config sync.yaml --source ./shared [--json]
//! reposync validate --config sync.yaml [--targets targets.yaml]
//! reposync status [--state-dir .reposync] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    snapshot::SnapshotArgs, status::StatusArgs, sync::SyncArgs, validate::ValidateArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "reposync",
    version,
    about = "Propagate a canonical set of files to many repositories through pull requests",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan and apply the source snapshot to every target repository.
    Sync(SyncArgs),

    /// List the files the source snapshot would propagate.
    Snapshot(SnapshotArgs),

    /// Check the config (and optionally the target list) without contacting any repository.
    Validate(ValidateArgs),

    /// Show the last recorded sync per repository.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Snapshot(args) => args.run(),
        Commands::Validate(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
