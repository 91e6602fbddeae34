//! # reposync-sync
//!
//! The sync engine: snapshot the source tree, plan each target against it,
//! execute the plans, and orchestrate all targets concurrently.
//!
//! Call [`snapshot::build`] once, then [`orchestrator::run`] with the
//! resulting files and the target list.

pub mod error;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod planner;
pub mod preview;
pub mod snapshot;

pub use error::{PlanError, SyncError};
pub use orchestrator::{run, CancelToken, RunContext};
