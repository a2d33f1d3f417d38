//! `wsync pull` and `wsync push`: reconcile one side with the other.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use wsync_sync::{pipeline, ApplyReport, Direction, Outcome, SyncOutcome};

use super::{cancel_on_ctrl_c, runtime, FilterArgs, RemoteArgs};
use crate::remote;

/// Arguments for `wsync pull` and `wsync push`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Root of the local checkout.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    #[command(flatten)]
    pub remote: RemoteArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Compute and print the changeset without applying it.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    pub json_output: bool,

    /// Exit 0 even when some entities failed.
    #[arg(long)]
    pub allow_failures: bool,
}

impl SyncArgs {
    pub fn run(self, direction: Direction) -> Result<ExitCode> {
        let remote = remote::connect(&self.remote)?;
        let request = self.filter.request(&self.root, direction, self.dry_run);

        let outcome = runtime()?
            .block_on(async {
                let cancel = cancel_on_ctrl_c();
                pipeline::run(&request, remote, cancel).await
            })
            .with_context(|| {
                format!(
                    "{} failed for '{}'",
                    direction.as_str(),
                    self.root.display()
                )
            })?;

        if self.json_output {
            let json = if self.dry_run {
                outcome.plan.changeset.to_json()
            } else {
                outcome.report.to_json()
            }
            .context("failed to serialize report")?;
            println!("{json}");
        } else {
            print_outcome(&outcome, direction);
        }

        Ok(if succeeded(&outcome.report, self.allow_failures) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

/// A fatal abort or a cancel always fails the run; per-entity failures only
/// without `--allow-failures`.
fn succeeded(report: &ApplyReport, allow_failures: bool) -> bool {
    if report.aborted.is_some() || report.cancelled {
        return false;
    }
    allow_failures || !report.has_failures()
}

// ---------------------------------------------------------------------------
// Human output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "entity")]
    path: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "result")]
    result: String,
}

fn print_outcome(outcome: &SyncOutcome, direction: Direction) {
    let report = &outcome.report;
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    for m in outcome
        .plan
        .local_malformed
        .iter()
        .chain(outcome.plan.remote_malformed.iter())
    {
        println!("{} {} left untouched: {}", "!".yellow().bold(), m.key, m.reason);
    }

    if report.entries.is_empty() {
        println!(
            "{prefix}{} {}: nothing to do",
            "✓".green().bold(),
            direction.as_str()
        );
        return;
    }

    let rows: Vec<ChangeRow> = report
        .entries
        .iter()
        .map(|e| ChangeRow {
            path: e.path.clone(),
            kind: e.kind.to_string(),
            action: e.action.to_string(),
            result: outcome_label(&e.outcome),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let changes = report.changes;
    let counts = report.counts();
    println!(
        "{prefix}{} {} to {}: {} create, {} update, {} delete ({} applied, {} skipped, {} failed)",
        if report.has_failures() {
            "✗".red().bold()
        } else {
            "✓".green().bold()
        },
        direction.as_str(),
        report.destination,
        changes.create,
        changes.update,
        changes.delete,
        counts.applied,
        counts.skipped,
        counts.failed,
    );
    if let Some(reason) = &report.aborted {
        println!("{} aborted: {reason}", "✗".red().bold());
    }
    if report.cancelled {
        println!("{} cancelled before all changes were dispatched", "!".yellow().bold());
    }
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Planned => "planned".bright_black().to_string(),
        Outcome::Applied => "applied".green().to_string(),
        Outcome::Skipped { reason } => format!("{} ({reason})", "skipped".yellow()),
        Outcome::Failed { reason } => format!("{}: {reason}", "failed".red()),
    }
}
