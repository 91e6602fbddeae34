//! `reposync snapshot`: show what the source tree would propagate.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use reposync_core::config;
use reposync_sync::snapshot;

/// Arguments for `reposync snapshot`.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Sync config; only the exclude globs are used.
    #[arg(long, default_value = "sync.yaml")]
    pub config: PathBuf,

    /// Directory holding the canonical files.
    #[arg(long)]
    pub source: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct SnapshotRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "bytes")]
    bytes: usize,
    #[tabled(rename = "sha256")]
    sha256: String,
}

impl SnapshotArgs {
    pub fn run(self) -> Result<()> {
        let settings = config::load_settings(&self.config).context("failed to load sync config")?;
        let files = snapshot::build(&self.source, &settings.policy)
            .with_context(|| format!("failed to snapshot '{}'", self.source.display()))?;

        let rows: Vec<SnapshotRow> = files
            .iter()
            .map(|f| SnapshotRow {
                path: f.relative_path().to_owned(),
                bytes: f.content().len(),
                sha256: f.content_hash().to_owned(),
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize snapshot JSON")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("No files to propagate under '{}'.", self.source.display());
            return Ok(());
        }
        let count = rows.len();
        let rows: Vec<SnapshotRow> = rows
            .into_iter()
            .map(|mut r| {
                r.sha256.truncate(12);
                r
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{count} file(s)");
        Ok(())
    }
}
