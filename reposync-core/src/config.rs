//! Loading the sync config and target list from YAML files.
//!
//! # File shapes
//!
//! ```text
//! sync.yaml                          targets.yaml
//! ---------                          ------------
//! exclude: ["drafts/**"]             - acme/widgets
//! protected: [".github/CODEOWNERS"]  - repository: acme/gadgets
//! work_branch: reposync-update         default_branch: trunk
//! max_concurrent_repos: 4              last_synced_commit: 1a2b3c
//! ```
//!
//! Every loader has two forms: `parse_*` over a string (used in tests) and
//! `load_*` over a path, which annotates errors with the file path.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::policy::{RawConfig, Settings};
use crate::types::{RepoId, TargetRepository};

/// Base branch assumed for short-form targets and entries without
/// `default_branch`. The planner reports a missing base branch by name.
pub const DEFAULT_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// 1. Sync config
// ---------------------------------------------------------------------------

/// Parse a raw config from YAML text. An empty document yields the defaults.
pub fn parse_config(yaml: &str, origin: &Path) -> Result<RawConfig, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(RawConfig::default());
    }
    serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}

/// Read and parse the raw config at `path`.
pub fn load_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_config(&contents, path)
}

/// Read, parse and resolve the config at `path`.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    Settings::resolve(&load_config(path)?)
}

// ---------------------------------------------------------------------------
// 2. Target list
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntryCompat {
    Short(String),
    Full(TargetEntry),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetEntry {
    repository: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    last_synced_commit: Option<String>,
}

/// Parse an ordered target list from YAML text.
///
/// Entries are either a bare `owner/name` string or a mapping. Identifiers are
/// validated and must be unique; order is preserved.
pub fn parse_targets(yaml: &str, origin: &Path) -> Result<Vec<TargetRepository>, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(vec![]);
    }
    let entries: Vec<TargetEntryCompat> =
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

    let mut seen = BTreeSet::new();
    let mut targets = Vec::with_capacity(entries.len());
    for entry in entries {
        let target = match entry {
            TargetEntryCompat::Short(raw) => {
                TargetRepository::new(RepoId::parse(&raw)?, DEFAULT_BRANCH)
            }
            TargetEntryCompat::Full(entry) => TargetRepository {
                id: RepoId::parse(&entry.repository)?,
                default_branch: entry
                    .default_branch
                    .map(|b| b.trim().to_owned())
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_owned()),
                last_synced_commit: entry.last_synced_commit,
            },
        };
        if !seen.insert(target.id.0.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateRepository(target.id.0));
        }
        targets.push(target);
    }
    Ok(targets)
}

/// Read and parse the target list at `path`.
pub fn load_targets(path: &Path) -> Result<Vec<TargetRepository>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_targets(&contents, path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
