//! `wsync init [root]`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use wsync_core::config;

/// Write a starter `wsync.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Root of the local checkout. Created when missing.
    #[arg(default_value = ".")]
    pub root: PathBuf,
}

impl InitArgs {
    pub fn run(self) -> Result<ExitCode> {
        let path = config::config_path_at(&self.root);
        let existed = path.exists();
        config::init_at(&self.root)
            .with_context(|| format!("failed to init '{}'", self.root.display()))?;

        if existed {
            println!("✓ {} already exists, left unchanged", path.display());
        } else {
            println!("✓ Wrote {}", path.display());
        }
        Ok(ExitCode::SUCCESS)
    }
}
