//! Sync ledger: the last commit each target was synced to.
//!
//! Persists a JSON document at `<state_dir>/ledger.json`. Writes go to a
//! `.tmp` sibling first and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reposync_core::{SyncOutcome, SyncResult, TargetRepository};

use crate::error::{io_err, SyncError};

pub const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub commit: String,
    pub synced_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

/// Repository identifier → last applied sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ledger {
    #[serde(default)]
    pub repositories: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    /// Copy recorded commits onto `targets` as their `last_synced_commit`.
    pub fn apply_to_targets(&self, targets: &mut [TargetRepository]) {
        for target in targets {
            if let Some(entry) = self.repositories.get(&target.id.0) {
                target.last_synced_commit = Some(entry.commit.clone());
            }
        }
    }

    /// Record every `Applied` result that carries a commit. Returns how many
    /// entries were written.
    pub fn record(&mut self, results: &[SyncResult], now: DateTime<Utc>) -> usize {
        let mut recorded = 0;
        for result in results {
            let (SyncOutcome::Applied { pr_url }, Some(commit)) =
                (&result.outcome, &result.synced_commit)
            else {
                continue;
            };
            self.repositories.insert(
                result.repository.0.clone(),
                LedgerEntry {
                    commit: commit.clone(),
                    synced_at: now,
                    pr_url: Some(pr_url.clone()),
                },
            );
            recorded += 1;
        }
        recorded
    }
}

/// `<state_dir>/ledger.json`
pub fn ledger_path_at(state_dir: &Path) -> PathBuf {
    state_dir.join(LEDGER_FILE)
}

/// Load the ledger. Returns an empty ledger if the file does not yet exist.
pub fn load_at(state_dir: &Path) -> Result<Ledger, SyncError> {
    let path = ledger_path_at(state_dir);
    if !path.exists() {
        return Ok(Ledger::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the ledger atomically, creating `state_dir` if needed.
pub fn save_at(state_dir: &Path, ledger: &Ledger) -> Result<(), SyncError> {
    std::fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;
    let path = ledger_path_at(state_dir);
    let json = serde_json::to_string_pretty(ledger)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}
