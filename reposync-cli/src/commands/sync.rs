//! `reposync sync`: push the source snapshot to every target repository.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use reposync_core::{config, SourceFile, SyncOutcome, SyncPolicy, SyncResult, TargetRepository};
use reposync_gateway::{GitHubClient, HostingApi};
use reposync_sync::{
    ledger, orchestrator, planner,
    preview::{self, FileDiff},
    snapshot, CancelToken, RunContext,
};

/// Directory holding the sync ledger, relative to the target list.
pub const DEFAULT_STATE_DIR: &str = ".reposync";

/// Arguments for `reposync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync config (globs, work branch, templates, API settings).
    #[arg(long, default_value = "sync.yaml")]
    pub config: PathBuf,

    /// Ordered list of target repositories.
    #[arg(long, default_value = "targets.yaml")]
    pub targets: PathBuf,

    /// Directory holding the canonical files.
    #[arg(long)]
    pub source: PathBuf,

    /// Plan every target without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// With `--dry-run`, print a unified diff of every pending change.
    #[arg(long, requires = "dry_run")]
    pub diff: bool,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// API token for the hosting provider.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Where the sync ledger lives (defaults to `.reposync` beside the target list).
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let settings = config::load_settings(&self.config).context("failed to load sync config")?;
        let mut targets =
            config::load_targets(&self.targets).context("failed to load target list")?;

        let state_dir = self
            .state_dir
            .clone()
            .unwrap_or_else(|| default_state_dir(&self.targets));
        let mut ledger = ledger::load_at(&state_dir).context("failed to load sync ledger")?;
        ledger.apply_to_targets(&mut targets);

        let files = snapshot::build(&self.source, &settings.policy)
            .with_context(|| format!("failed to snapshot '{}'", self.source.display()))?;

        if targets.is_empty() {
            println!("No target repositories listed in '{}'.", self.targets.display());
            return Ok(());
        }

        let token = self
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("no API token: pass --token or set GITHUB_TOKEN")?;

        if !self.dry_run && settings.policy.require_confirmation() && !self.yes {
            let prompt = format!(
                "Sync {} file(s) to {} repositories via branch '{}'? [y/N] ",
                files.len(),
                targets.len(),
                settings.policy.work_branch(),
            );
            if !confirm(&prompt)? {
                println!("Aborted; nothing was written.");
                return Ok(());
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        let api: Arc<dyn HostingApi> = Arc::new(GitHubClient::connect(&settings.api, token));
        let policy = Arc::new(settings.policy);
        let ctx = RunContext {
            api: Arc::clone(&api),
            policy: Arc::clone(&policy),
            source: Arc::from(files),
            dry_run: self.dry_run,
        };
        let want_diff = self.dry_run && self.diff;

        let (results, diffs) = runtime.block_on(async {
            let cancel = CancelToken::new();
            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received; finishing in-flight repositories");
                        cancel.cancel();
                    }
                })
            };

            let results = orchestrator::run(ctx.clone(), targets.clone(), &cancel).await;
            let diffs = if want_diff {
                collect_diffs(api.as_ref(), &policy, &ctx.source, &targets, &results).await
            } else {
                Vec::new()
            };

            watcher.abort();
            (results, diffs)
        });

        if !self.dry_run {
            let recorded = ledger.record(&results, Utc::now());
            if recorded > 0 {
                ledger::save_at(&state_dir, &ledger).context("failed to save sync ledger")?;
            }
        }

        if self.json {
            print_json(&results, &diffs)?;
        } else {
            print_table(&results, self.dry_run);
            print_diffs(&diffs);
        }

        let failed = results.iter().filter(|r| r.outcome.is_failed()).count();
        if failed > 0 {
            bail!("{failed} of {} repositories failed", results.len());
        }
        Ok(())
    }
}

fn default_state_dir(targets: &Path) -> PathBuf {
    targets
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(DEFAULT_STATE_DIR)
}

fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = std::io::stdout();
    stdout
        .write_all(prompt.as_bytes())
        .and_then(|_| stdout.flush())
        .context("failed to write prompt")?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

// ---------------------------------------------------------------------------
// Dry-run diffs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RepoDiff {
    repository: String,
    files: Vec<FileDiffJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileDiffJson {
    path: String,
    action: String,
    diff: String,
}

impl From<FileDiff> for FileDiffJson {
    fn from(d: FileDiff) -> Self {
        Self {
            path: d.path,
            action: d.action.to_string(),
            diff: d.unified_diff,
        }
    }
}

/// Re-plan every target with pending changes and render its diffs, one
/// repository at a time.
async fn collect_diffs(
    api: &dyn HostingApi,
    policy: &SyncPolicy,
    source: &[SourceFile],
    targets: &[TargetRepository],
    results: &[SyncResult],
) -> Vec<RepoDiff> {
    let mut out = Vec::new();
    for (target, result) in targets.iter().zip(results) {
        if !matches!(result.outcome, SyncOutcome::Planned { .. }) {
            continue;
        }
        let rendered = match planner::plan(api, policy, source, target).await {
            Ok(plan) => preview::preview(api, &plan).await,
            Err(err) => Err(err),
        };
        out.push(match rendered {
            Ok(files) => RepoDiff {
                repository: target.id.0.clone(),
                files: files.into_iter().map(FileDiffJson::from).collect(),
                error: None,
            },
            Err(err) => RepoDiff {
                repository: target.id.0.clone(),
                files: Vec::new(),
                error: Some(err.to_string()),
            },
        });
    }
    out
}

fn print_diffs(diffs: &[RepoDiff]) {
    for repo in diffs {
        println!();
        println!("{}", repo.repository.bold());
        if let Some(err) = &repo.error {
            println!("  {} {err}", "diff unavailable:".red());
            continue;
        }
        for file in &repo.files {
            print!("{}", file.diff);
            if !file.diff.ends_with('\n') {
                println!();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SyncReportJson<'a> {
    summary: SummaryJson,
    results: &'a [SyncResult],
    #[serde(skip_serializing_if = "no_diffs")]
    diffs: &'a [RepoDiff],
}

fn no_diffs(diffs: &&[RepoDiff]) -> bool {
    diffs.is_empty()
}

#[derive(Serialize, Default)]
struct SummaryJson {
    total: usize,
    applied: usize,
    planned: usize,
    unchanged: usize,
    skipped: usize,
    failed: usize,
}

fn summarize(results: &[SyncResult]) -> SummaryJson {
    let mut summary = SummaryJson {
        total: results.len(),
        ..SummaryJson::default()
    };
    for result in results {
        match result.outcome {
            SyncOutcome::Applied { .. } => summary.applied += 1,
            SyncOutcome::Planned { .. } => summary.planned += 1,
            SyncOutcome::NoChangesNeeded => summary.unchanged += 1,
            SyncOutcome::Skipped { .. } => summary.skipped += 1,
            SyncOutcome::Failed { .. } => summary.failed += 1,
        }
    }
    summary
}

fn print_json(results: &[SyncResult], diffs: &[RepoDiff]) -> Result<()> {
    let payload = SyncReportJson {
        summary: summarize(results),
        results,
        diffs,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize sync JSON")?
    );
    Ok(())
}

#[derive(Tabled)]
struct SyncTableRow {
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "changes")]
    changes: usize,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "time")]
    time: String,
}

fn print_table(results: &[SyncResult], dry_run: bool) {
    let summary = summarize(results);
    let prefix = if dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}reposync v{} | {} repositories | {} applied | {} planned | {} unchanged | {} skipped | {} failed",
        env!("CARGO_PKG_VERSION"),
        summary.total,
        summary.applied,
        summary.planned,
        summary.unchanged,
        summary.skipped,
        summary.failed,
    );

    let rows: Vec<SyncTableRow> = results
        .iter()
        .map(|r| SyncTableRow {
            repository: r.repository.0.clone(),
            outcome: outcome_label(&r.outcome),
            changes: match r.outcome {
                SyncOutcome::Planned { pending_changes } => pending_changes,
                _ => r.actions_applied,
            },
            detail: outcome_detail(&r.outcome),
            time: format!("{}ms", r.duration_ms),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn outcome_label(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Applied { .. } => "APPLIED".green().bold().to_string(),
        SyncOutcome::NoChangesNeeded => "UP TO DATE".bright_black().bold().to_string(),
        SyncOutcome::Planned { .. } => "PLANNED".cyan().bold().to_string(),
        SyncOutcome::Skipped { .. } => "SKIPPED".yellow().bold().to_string(),
        SyncOutcome::Failed { .. } => "FAILED".red().bold().to_string(),
    }
}

fn outcome_detail(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Applied { pr_url } => pr_url.clone(),
        SyncOutcome::NoChangesNeeded => String::new(),
        SyncOutcome::Planned { pending_changes } => format!("{pending_changes} pending"),
        SyncOutcome::Skipped { reason } => reason.clone(),
        SyncOutcome::Failed { kind, detail } => format!("{kind}: {detail}"),
    }
}
