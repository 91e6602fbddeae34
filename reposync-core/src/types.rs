//! Domain types for a reposync run.
//!
//! Paths inside repositories are always `String`s with `/` separators and no
//! leading `/`; filesystem paths on the local machine use `PathBuf`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hash;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A hosted repository identifier of the form `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId(pub String);

impl RepoId {
    /// Parse and validate an `owner/name` identifier.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        match trimmed.split_once('/') {
            Some((owner, name))
                if !owner.is_empty()
                    && !name.is_empty()
                    && !name.contains('/')
                    && !trimmed.contains(char::is_whitespace) =>
            {
                Ok(Self(trimmed.to_owned()))
            }
            _ => Err(ConfigError::InvalidRepository(raw.to_owned())),
        }
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or(&self.0)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or("")
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RepoId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RepoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Targets and source files
// ---------------------------------------------------------------------------

/// A downstream repository that receives the source snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRepository {
    #[serde(rename = "repository")]
    pub id: RepoId,
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_commit: Option<String>,
}

impl TargetRepository {
    pub fn new(id: impl Into<RepoId>, default_branch: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_branch: default_branch.into(),
            last_synced_commit: None,
        }
    }
}

/// File bytes shared between the snapshot and every plan built from it.
pub type Content = Arc<[u8]>;

/// One canonical file to propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    relative_path: String,
    content: Content,
    content_hash: String,
    blob_id: String,
}

impl SourceFile {
    /// Build a source file, normalising its path and hashing its content.
    ///
    /// Returns `None` when `relative_path` cannot be normalised (empty, or it
    /// escapes the root with `..`).
    pub fn new(relative_path: &str, content: impl Into<Content>) -> Option<Self> {
        let relative_path = normalize_relative_path(relative_path)?;
        let content: Content = content.into();
        Some(Self {
            content_hash: hash::content_hash(&content),
            blob_id: hash::git_blob_id(&content),
            relative_path,
            content,
        })
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// SHA-256 hex digest of the content.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Git blob object id of the content.
    pub fn blob_id(&self) -> &str {
        &self.blob_id
    }
}

/// Normalise a repository-relative path: `/` separators, no leading `/` or
/// `./`, no empty or `.` components. Rejects `..` components.
pub fn normalize_relative_path(raw: &str) -> Option<String> {
    let replaced = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for part in replaced.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// The decision taken for one source path in one target repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileAction {
    Add {
        path: String,
        #[serde(skip)]
        content: Content,
    },
    Update {
        path: String,
        /// Blob id of the file currently on the default branch.
        old_hash: String,
        #[serde(skip)]
        new_content: Content,
    },
    SkipExcluded {
        path: String,
    },
    SkipProtected {
        path: String,
    },
    Unchanged {
        path: String,
    },
}

impl FileAction {
    pub fn path(&self) -> &str {
        match self {
            FileAction::Add { path, .. }
            | FileAction::Update { path, .. }
            | FileAction::SkipExcluded { path }
            | FileAction::SkipProtected { path }
            | FileAction::Unchanged { path } => path,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            FileAction::Add { .. } => ActionKind::Add,
            FileAction::Update { .. } => ActionKind::Update,
            FileAction::SkipExcluded { .. } => ActionKind::SkipExcluded,
            FileAction::SkipProtected { .. } => ActionKind::SkipProtected,
            FileAction::Unchanged { .. } => ActionKind::Unchanged,
        }
    }

    /// `true` for actions that change the target (`Add` / `Update`).
    pub fn is_effective(&self) -> bool {
        matches!(self, FileAction::Add { .. } | FileAction::Update { .. })
    }

    /// Content to write, for effective actions.
    pub fn content(&self) -> Option<&Content> {
        match self {
            FileAction::Add { content, .. } => Some(content),
            FileAction::Update { new_content, .. } => Some(new_content),
            _ => None,
        }
    }
}

/// Payload-free discriminant of [`FileAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Update,
    SkipExcluded,
    SkipProtected,
    Unchanged,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Add => write!(f, "add"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::SkipExcluded => write!(f, "skip-excluded"),
            ActionKind::SkipProtected => write!(f, "skip-protected"),
            ActionKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Which branch the plan's writes will be committed on.
///
/// Actions are always classified against the default branch; this only tells
/// whether the work branch will be cut fresh or reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "branch", rename_all = "snake_case")]
pub enum PlanBase {
    /// The work branch does not exist yet and will be cut from this branch.
    DefaultBranch(String),
    /// The work branch already exists (earlier, possibly partial, run).
    WorkBranch(String),
}

impl PlanBase {
    pub fn branch(&self) -> &str {
        match self {
            PlanBase::DefaultBranch(b) | PlanBase::WorkBranch(b) => b,
        }
    }
}

/// Ordered file actions for one target repository.
///
/// Built fresh per repository per run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    repository: TargetRepository,
    base: PlanBase,
    actions: Vec<FileAction>,
    has_effective_changes: bool,
}

impl SyncPlan {
    pub fn new(repository: TargetRepository, base: PlanBase, actions: Vec<FileAction>) -> Self {
        let has_effective_changes = actions.iter().any(FileAction::is_effective);
        Self {
            repository,
            base,
            actions,
            has_effective_changes,
        }
    }

    pub fn repository(&self) -> &TargetRepository {
        &self.repository
    }

    pub fn base(&self) -> &PlanBase {
        &self.base
    }

    pub fn actions(&self) -> &[FileAction] {
        &self.actions
    }

    /// `true` iff any action is `Add` or `Update`.
    pub fn has_effective_changes(&self) -> bool {
        self.has_effective_changes
    }

    pub fn effective_actions(&self) -> impl Iterator<Item = &FileAction> {
        self.actions.iter().filter(|a| a.is_effective())
    }

    /// Path and kind of every effective action, in plan order.
    pub fn changes(&self) -> Vec<Change> {
        self.effective_actions()
            .map(|a| Change {
                path: a.path().to_owned(),
                action: a.kind(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A path and what happened (or would happen) to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub action: ActionKind,
}

/// Category of a per-repository failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The repository's current state could not be read while planning.
    Fetch,
    /// The hosting API rejected a write outright (403/404/422 and friends).
    Permanent,
    /// Transient failures persisted past the retry cap.
    Transient,
    /// Rate limiting persisted past the retry cap.
    RateLimited,
    /// A bug or panic inside the engine.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Fetch => write!(f, "fetch"),
            FailureKind::Permanent => write!(f, "permanent"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::RateLimited => write!(f, "rate-limited"),
            FailureKind::Internal => write!(f, "internal"),
        }
    }
}

/// Terminal state of one repository in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Changes were committed to the work branch and a pull request is open.
    Applied { pr_url: String },
    /// The target already matches the source snapshot.
    NoChangesNeeded,
    /// Dry run: planning found pending changes and stopped there.
    Planned { pending_changes: usize },
    /// The repository was not processed (for example, the run was cancelled).
    Skipped { reason: String },
    Failed { kind: FailureKind, detail: String },
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }

    /// Short machine-friendly key.
    pub fn key(&self) -> &'static str {
        match self {
            SyncOutcome::Applied { .. } => "applied",
            SyncOutcome::NoChangesNeeded => "no_changes_needed",
            SyncOutcome::Planned { .. } => "planned",
            SyncOutcome::Skipped { .. } => "skipped",
            SyncOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-repository result of a run. Exactly one per requested target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub repository: RepoId,
    pub outcome: SyncOutcome,
    pub actions_applied: usize,
    pub duration_ms: u64,
    /// Effective changes: applied ones after execution, pending ones after a dry run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    /// Work-branch head after the last write; becomes the target's
    /// `last_synced_commit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_commit: Option<String>,
}

impl SyncResult {
    pub fn new(repository: RepoId, outcome: SyncOutcome) -> Self {
        Self {
            repository,
            outcome,
            actions_applied: 0,
            duration_ms: 0,
            changes: Vec::new(),
            synced_commit: None,
        }
    }

    pub fn skipped(repository: RepoId, reason: impl Into<String>) -> Self {
        Self::new(
            repository,
            SyncOutcome::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn failed(repository: RepoId, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::new(
            repository,
            SyncOutcome::Failed {
                kind,
                detail: detail.into(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
