//! `reposync validate`: check configuration offline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use reposync_core::config;

/// Arguments for `reposync validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Sync config to check.
    #[arg(long, default_value = "sync.yaml")]
    pub config: PathBuf,

    /// Target list to check as well.
    #[arg(long)]
    pub targets: Option<PathBuf>,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let settings = config::load_settings(&self.config)
            .with_context(|| format!("'{}' is invalid", self.config.display()))?;
        let policy = &settings.policy;
        println!(
            "{} '{}': work branch '{}', {} exclude glob(s), {} protected glob(s), {} concurrent repositories",
            "✓".green().bold(),
            self.config.display(),
            policy.work_branch(),
            policy.excluded().patterns().count(),
            policy.protected().patterns().count(),
            policy.max_concurrent_repos(),
        );
        println!(
            "  api {} (max {} attempts)",
            settings.api.base_url, settings.api.max_attempts
        );

        if let Some(path) = &self.targets {
            let targets = config::load_targets(path)
                .with_context(|| format!("'{}' is invalid", path.display()))?;
            println!(
                "{} '{}': {} target repositories",
                "✓".green().bold(),
                path.display(),
                targets.len()
            );
        }
        Ok(())
    }
}
