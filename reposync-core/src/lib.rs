//! reposync core library: domain types, policy and config loading.
//!
//! - [`types`]: repositories, source files, plans and results
//! - [`policy`]: [`SyncPolicy`] resolution and path globs
//! - [`config`]: YAML config and target list loading
//! - [`message`]: commit and pull request templates
//! - [`hash`]: content hashes and Git blob ids
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod hash;
pub mod message;
pub mod policy;
pub mod types;

pub use error::ConfigError;
pub use policy::{ApiSettings, PathGlobs, RawConfig, Settings, SyncPolicy};
pub use types::{
    ActionKind, Change, Content, FailureKind, FileAction, PlanBase, RepoId, SourceFile,
    SyncOutcome, SyncPlan, SyncResult, TargetRepository,
};
