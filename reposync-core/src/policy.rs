//! Policy resolution: raw configuration → immutable [`SyncPolicy`].
//!
//! Everything that can be wrong with a configuration is detected here, once,
//! before any repository is contacted. The rest of the engine only ever sees a
//! validated policy.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::time::Duration;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::message::{
    MessageTemplates, DEFAULT_COMMIT_MESSAGE, DEFAULT_PR_BODY, DEFAULT_PR_TITLE,
};

// ---------------------------------------------------------------------------
// Raw configuration (as deserialized from YAML)
// ---------------------------------------------------------------------------

/// Unvalidated sync configuration, exactly as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Globs of source paths never propagated.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Globs of target paths never overwritten once they exist.
    #[serde(default)]
    pub protected: Vec<String>,
    #[serde(default = "default_work_branch")]
    pub work_branch: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default)]
    pub pull_request: RawPullRequest,
    #[serde(default = "default_max_concurrent_repos")]
    pub max_concurrent_repos: i64,
    #[serde(default = "default_true")]
    pub require_confirmation: bool,
    #[serde(default)]
    pub api: RawApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPullRequest {
    #[serde(default = "default_pr_title")]
    pub title: String,
    #[serde(default = "default_pr_body")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_work_branch() -> String {
    "reposync-update".to_string()
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_MESSAGE.to_string()
}

fn default_pr_title() -> String {
    DEFAULT_PR_TITLE.to_string()
}

fn default_pr_body() -> String {
    DEFAULT_PR_BODY.to_string()
}

fn default_max_concurrent_repos() -> i64 {
    4
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            protected: Vec::new(),
            work_branch: default_work_branch(),
            commit_message: default_commit_message(),
            pull_request: RawPullRequest::default(),
            max_concurrent_repos: default_max_concurrent_repos(),
            require_confirmation: default_true(),
            api: RawApiConfig::default(),
        }
    }
}

impl Default for RawPullRequest {
    fn default() -> Self {
        Self {
            title: default_pr_title(),
            body: default_pr_body(),
        }
    }
}

impl Default for RawApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Path globs
// ---------------------------------------------------------------------------

/// A compiled, de-duplicated set of path globs.
///
/// Globs match the whole repository-relative path. `*` and `?` never cross a
/// `/`; use `**` to span directories (`docs/**`, `**/*.md`).
#[derive(Debug, Clone, Default)]
pub struct PathGlobs {
    patterns: Vec<Pattern>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl PathGlobs {
    pub fn compile<I, S>(globs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = globs
            .into_iter()
            .map(|g| g.as_ref().trim().to_owned())
            .filter(|g| !g.is_empty())
            .collect();
        let mut patterns = Vec::with_capacity(unique.len());
        for glob in unique {
            let pattern = Pattern::new(&glob).map_err(|source| ConfigError::InvalidGlob {
                pattern: glob.clone(),
                source,
            })?;
            patterns.push(pattern);
        }
        Ok(Self { patterns })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }
}

// ---------------------------------------------------------------------------
// SyncPolicy
// ---------------------------------------------------------------------------

/// Validated, immutable policy shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    excluded: PathGlobs,
    protected: PathGlobs,
    work_branch: String,
    templates: MessageTemplates,
    max_concurrent_repos: NonZeroUsize,
    require_confirmation: bool,
}

impl SyncPolicy {
    /// Validate `raw` into a policy. Pure; never touches the network or disk.
    pub fn resolve(raw: &RawConfig) -> Result<Self, ConfigError> {
        let excluded = PathGlobs::compile(&raw.exclude)?;
        let protected = PathGlobs::compile(&raw.protected)?;
        validate_work_branch(&raw.work_branch)?;

        let max_concurrent_repos = usize::try_from(raw.max_concurrent_repos)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::InvalidConcurrency(raw.max_concurrent_repos))?;

        let templates = MessageTemplates::compile(
            &raw.commit_message,
            &raw.pull_request.title,
            &raw.pull_request.body,
        )?;

        Ok(Self {
            excluded,
            protected,
            work_branch: raw.work_branch.trim().to_owned(),
            templates,
            max_concurrent_repos,
            require_confirmation: raw.require_confirmation,
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.matches(path)
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.matches(path)
    }

    pub fn excluded(&self) -> &PathGlobs {
        &self.excluded
    }

    pub fn protected(&self) -> &PathGlobs {
        &self.protected
    }

    pub fn work_branch(&self) -> &str {
        &self.work_branch
    }

    pub fn commit_message_template(&self) -> &str {
        self.templates.commit_source()
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    pub fn max_concurrent_repos(&self) -> usize {
        self.max_concurrent_repos.get()
    }

    pub fn require_confirmation(&self) -> bool {
        self.require_confirmation
    }
}

fn validate_work_branch(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidWorkBranch {
        name: name.to_owned(),
        reason,
    };
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(invalid("must not contain path separators"));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control())
        || trimmed.contains("..")
        || trimmed.starts_with('-')
    {
        return Err(invalid("not a valid branch name"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// API settings
// ---------------------------------------------------------------------------

/// Validated hosting API settings consumed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl ApiSettings {
    pub fn resolve(raw: &RawApiConfig) -> Result<Self, ConfigError> {
        let base_url = raw.base_url.trim().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::InvalidApi(format!(
                "base_url '{}' must be an http(s) URL",
                raw.base_url
            )));
        }
        if raw.max_attempts == 0 {
            return Err(ConfigError::InvalidApi(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if raw.base_backoff_ms > raw.max_backoff_ms {
            return Err(ConfigError::InvalidApi(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                raw.base_backoff_ms, raw.max_backoff_ms
            )));
        }
        if raw.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidApi(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            base_url,
            max_attempts: raw.max_attempts,
            base_backoff: Duration::from_millis(raw.base_backoff_ms),
            max_backoff: Duration::from_millis(raw.max_backoff_ms),
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
        })
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        // Defaults are valid by construction.
        let raw = RawApiConfig::default();
        Self {
            base_url: raw.base_url,
            max_attempts: raw.max_attempts,
            base_backoff: Duration::from_millis(raw.base_backoff_ms),
            max_backoff: Duration::from_millis(raw.max_backoff_ms),
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
        }
    }
}

/// Everything a run needs from the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub policy: SyncPolicy,
    pub api: ApiSettings,
}

impl Settings {
    pub fn resolve(raw: &RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            policy: SyncPolicy::resolve(raw)?,
            api: ApiSettings::resolve(&raw.api)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
