//! Error types for reposync-sync.

use std::path::PathBuf;

use thiserror::Error;

use reposync_core::{ConfigError, RepoId};
use reposync_gateway::GatewayError;

/// Errors that abort a whole run: an unreadable source tree or ledger.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// JSON serialization/deserialization error (sync ledger).
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A source path that cannot be expressed as a repository path.
    #[error("unsupported source path {path}")]
    InvalidPath { path: PathBuf },
}

/// The current state of one target could not be read.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("could not read {repository} at '{reference}': {source}")]
    Fetch {
        repository: RepoId,
        reference: String,
        #[source]
        source: GatewayError,
    },

    /// The base branch does not exist, usually a short-form target whose
    /// repository uses a default branch other than `main`.
    #[error(
        "base branch '{branch}' not found in {repository}; set default_branch for this target"
    )]
    BaseBranchNotFound { repository: RepoId, branch: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
