//! `wsync diff`: unified diffs of what `push` would change remotely.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use wsync_sync::{diff::render, pipeline, Direction};

use super::{cancel_on_ctrl_c, runtime, FilterArgs, RemoteArgs};
use crate::remote;

/// Arguments for `wsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Root of the local checkout.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    #[command(flatten)]
    pub remote: RemoteArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<ExitCode> {
        let remote = remote::connect(&self.remote)?;
        let request = self.filter.request(&self.root, Direction::Push, true);

        let plan = runtime()?
            .block_on(async {
                let mut cancel = cancel_on_ctrl_c();
                pipeline::plan_or_cancel(&request, remote.as_ref(), &mut cancel).await
            })
            .with_context(|| format!("diff failed for '{}'", self.root.display()))?;

        let diffs = render(&plan.changeset);
        if diffs.is_empty() {
            println!("No differences for '{}'.", self.root.display());
            return Ok(ExitCode::SUCCESS);
        }

        for op in diffs {
            println!("{} {}", op.action.bold(), op.entity.bold());
            for file in op.files {
                print!("{}", file.unified_diff);
                if !file.unified_diff.ends_with('\n') {
                    println!();
                }
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}
