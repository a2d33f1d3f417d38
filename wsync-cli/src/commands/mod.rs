//! Subcommands and the flags they share.

pub mod diff;
pub mod init;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use wsync_core::{ForceIncludes, SyncOptions};
use wsync_sync::{Direction, SyncRequest};

// ---------------------------------------------------------------------------
// Remote selection
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Remote base URL. `file://<dir>` syncs against a directory.
    #[arg(long, env = "WSYNC_BASE_URL")]
    pub base_url: Option<String>,

    /// Remote workspace id.
    #[arg(long, env = "WSYNC_WORKSPACE")]
    pub workspace: Option<String>,

    /// Bearer token for the remote.
    #[arg(long, env = "WSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// Filter flags
// ---------------------------------------------------------------------------

/// Flags that become the CLI settings layer. Absent flags leave the
/// configured value alone.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Include users regardless of path globs.
    #[arg(long)]
    pub include_users: bool,
    /// Include groups regardless of path globs.
    #[arg(long)]
    pub include_groups: bool,
    /// Include workspace settings regardless of path globs.
    #[arg(long)]
    pub include_settings: bool,
    /// Include the workspace encryption key regardless of path globs.
    #[arg(long)]
    pub include_key: bool,
    #[arg(long)]
    pub include_schedules: bool,
    #[arg(long)]
    pub include_triggers: bool,

    #[arg(long)]
    pub skip_scripts: bool,
    #[arg(long)]
    pub skip_flows: bool,
    #[arg(long)]
    pub skip_apps: bool,
    #[arg(long)]
    pub skip_variables: bool,
    #[arg(long)]
    pub skip_resources: bool,
    #[arg(long)]
    pub skip_resource_types: bool,
    #[arg(long)]
    pub skip_secrets: bool,
    #[arg(long)]
    pub skip_folders: bool,

    /// Include glob; repeat for several. Replaces configured includes.
    #[arg(long, value_name = "GLOB", action = ArgAction::Append)]
    pub includes: Vec<String>,
    /// Exclude glob; repeat for several. Replaces configured excludes.
    #[arg(long, value_name = "GLOB", action = ArgAction::Append)]
    pub excludes: Vec<String>,

    /// Maximum entity operations in flight.
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Branch whose `overrides` apply. Defaults to the checked-out git branch.
    #[arg(long, value_name = "NAME")]
    pub branch: Option<String>,
    /// Branch whose `promotionOverrides` apply.
    #[arg(long, value_name = "BRANCH")]
    pub promotion: Option<String>,
}

impl FilterArgs {
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            includes: non_empty(&self.includes),
            excludes: non_empty(&self.excludes),
            parallelism: self.parallelism,
            skip_scripts: flag(self.skip_scripts),
            skip_flows: flag(self.skip_flows),
            skip_apps: flag(self.skip_apps),
            skip_variables: flag(self.skip_variables),
            skip_resources: flag(self.skip_resources),
            skip_resource_types: flag(self.skip_resource_types),
            skip_secrets: flag(self.skip_secrets),
            skip_folders: flag(self.skip_folders),
            include_schedules: flag(self.include_schedules),
            include_triggers: flag(self.include_triggers),
            ..Default::default()
        }
    }

    pub fn force(&self) -> ForceIncludes {
        ForceIncludes {
            users: self.include_users,
            groups: self.include_groups,
            settings: self.include_settings,
            key: self.include_key,
        }
    }

    pub fn request(&self, root: &Path, direction: Direction, dry_run: bool) -> SyncRequest {
        SyncRequest {
            branch: self.branch.clone().or_else(|| detect_branch(root)),
            promotion: self.promotion.clone(),
            force: self.force(),
            cli: self.options(),
            dry_run,
            ..SyncRequest::new(root, direction)
        }
    }
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

fn non_empty(globs: &[String]) -> Option<Vec<String>> {
    (!globs.is_empty()).then(|| globs.to_vec())
}

/// Name of the branch checked out in the git repository containing `root`.
///
/// The nearest `.git` wins. A `.git` file (worktree or submodule) points at
/// the real git dir through its `gitdir:` line.
pub fn detect_branch(root: &Path) -> Option<String> {
    let start: PathBuf = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let dot_git = start
        .ancestors()
        .map(|dir| dir.join(".git"))
        .find(|p| p.exists())?;
    let git_dir = if dot_git.is_file() {
        let pointer = std::fs::read_to_string(&dot_git).ok()?;
        let target = pointer.trim().strip_prefix("gitdir:")?.trim();
        dot_git.parent()?.join(target)
    } else {
        dot_git
    };
    let content = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let name = content.trim().strip_prefix("ref: refs/heads/")?;
    tracing::debug!(branch = name, git_dir = %git_dir.display(), "detected git branch");
    Some(name.to_string())
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

/// Cancel signal fired by ctrl-c. Planning is abandoned on it; applying
/// lets in-flight operations finish. Must be called inside the runtime.
pub fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted");
            let _ = tx.send(true);
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unset_flags_leave_layers_alone() {
        let options = FilterArgs::default().options();
        assert_eq!(options, SyncOptions::default());
    }

    #[test]
    fn set_flags_become_explicit_values() {
        let args = FilterArgs {
            skip_variables: true,
            include_triggers: true,
            excludes: vec!["f/tmp/**".to_string()],
            ..Default::default()
        };
        let options = args.options();
        assert_eq!(options.skip_variables, Some(true));
        assert_eq!(options.include_triggers, Some(true));
        assert_eq!(options.skip_secrets, None);
        assert_eq!(options.includes, None);
        assert_eq!(options.excludes, Some(vec!["f/tmp/**".to_string()]));
    }

    #[test]
    fn branch_is_read_from_git_head() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/staging\n")
            .expect("write HEAD");
        std::fs::create_dir_all(dir.path().join("sub")).expect("mkdir");

        assert_eq!(detect_branch(&dir.path().join("sub")).as_deref(), Some("staging"));
    }

    #[test]
    fn detached_head_has_no_branch() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::write(dir.path().join(".git/HEAD"), "3f2c1e0d\n").expect("write file");
        assert_eq!(detect_branch(dir.path()), None);
    }

    #[test]
    fn worktree_follows_its_gitdir_pointer() {
        let dir = TempDir::new().expect("tempdir");
        let admin = dir.path().join("main/.git/worktrees/feat");
        std::fs::create_dir_all(&admin).expect("mkdir");
        std::fs::write(admin.join("HEAD"), "ref: refs/heads/feature/login\n").expect("write HEAD");
        std::fs::create_dir_all(dir.path().join("feat/sub")).expect("mkdir");
        std::fs::write(
            dir.path().join("feat/.git"),
            "gitdir: ../main/.git/worktrees/feat\n",
        )
        .expect("write .git");

        assert_eq!(
            detect_branch(&dir.path().join("feat/sub")).as_deref(),
            Some("feature/login")
        );
    }

    #[test]
    fn absolute_gitdir_pointer_is_followed() {
        let dir = TempDir::new().expect("tempdir");
        let admin = dir.path().join("store/modules/wf");
        std::fs::create_dir_all(&admin).expect("mkdir");
        std::fs::write(admin.join("HEAD"), "ref: refs/heads/release\n").expect("write HEAD");
        std::fs::create_dir_all(dir.path().join("wf")).expect("mkdir");
        std::fs::write(
            dir.path().join("wf/.git"),
            format!("gitdir: {}\n", admin.display()),
        )
        .expect("write .git");

        assert_eq!(detect_branch(&dir.path().join("wf")).as_deref(), Some("release"));
    }

    #[test]
    fn nearest_repository_wins() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").expect("write HEAD");
        // Inner checkout on a detached HEAD.
        std::fs::create_dir_all(dir.path().join("inner/.git")).expect("mkdir");
        std::fs::write(dir.path().join("inner/.git/HEAD"), "3f2c1e0d\n").expect("write HEAD");

        assert_eq!(detect_branch(&dir.path().join("inner")), None);
    }

    #[test]
    fn explicit_branch_wins_over_git() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").expect("write file");
        let args = FilterArgs {
            branch: Some("prod".to_string()),
            ..Default::default()
        };
        let request = args.request(dir.path(), Direction::Pull, false);
        assert_eq!(request.branch.as_deref(), Some("prod"));
    }
}
