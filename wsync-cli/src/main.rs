//! wsync keeps a local checkout and a remote workspace in sync.
//!
//! # Usage
//!
//! ```text
//! wsync init [root]
//! wsync pull [root] [--dry-run] [--json-output] [filter flags]
//! wsync push [root] [--dry-run] [--json-output] [filter flags]
//! wsync diff [root] [filter flags]
//! ```
//!
//! The remote is selected with `--base-url` / `--workspace` / `--token`
//! (or `WSYNC_BASE_URL`, `WSYNC_WORKSPACE`, `WSYNC_TOKEN`). A `file://` base
//! URL syncs against a plain directory.

mod commands;
mod remote;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{diff::DiffArgs, init::InitArgs, sync::SyncArgs};
use wsync_sync::Direction;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "wsync",
    version,
    about = "Reconcile a local workspace checkout with a remote workspace",
    long_about = None,
)]
struct Cli {
    /// Emit log lines as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter wsync.yaml.
    Init(InitArgs),

    /// Make the local checkout match the remote workspace.
    Pull(SyncArgs),

    /// Make the remote workspace match the local checkout.
    Push(SyncArgs),

    /// Show unified diffs of what `push` would change remotely.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Pull(args) => args.run(Direction::Pull),
        Commands::Push(args) => args.run(Direction::Push),
        Commands::Diff(args) => args.run(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
