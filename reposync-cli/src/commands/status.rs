//! `reposync status`: last recorded sync per repository.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use reposync_sync::ledger;

use super::sync::DEFAULT_STATE_DIR;

/// Arguments for `reposync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Directory holding the sync ledger.
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusRowJson {
    repository: String,
    commit: String,
    synced_at: String,
    last_sync_age: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pr_url: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "pull request")]
    pr_url: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let ledger = ledger::load_at(&self.state_dir).with_context(|| {
            format!("failed to load ledger from '{}'", self.state_dir.display())
        })?;
        let now = Utc::now();

        if self.json {
            let rows: Vec<StatusRowJson> = ledger
                .repositories
                .iter()
                .map(|(repo, entry)| StatusRowJson {
                    repository: repo.clone(),
                    commit: entry.commit.clone(),
                    synced_at: entry.synced_at.to_rfc3339(),
                    last_sync_age: format_age(entry.synced_at, now),
                    pr_url: entry.pr_url.clone(),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        if ledger.repositories.is_empty() {
            println!("No repositories synced yet.");
            return Ok(());
        }

        let rows: Vec<StatusTableRow> = ledger
            .repositories
            .iter()
            .map(|(repo, entry)| StatusTableRow {
                repository: repo.clone(),
                commit: entry.commit.chars().take(12).collect(),
                last_sync: format_age(entry.synced_at, now),
                pr_url: entry.pr_url.clone().unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(timestamp).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s ago"),
        s if s < 60 * 60 => format!("{}m ago", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h ago", s / (60 * 60)),
        s => format!("{}d ago", s / (60 * 60 * 24)),
    }
}
