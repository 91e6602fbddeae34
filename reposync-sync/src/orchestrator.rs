//! Run orchestration: one sequential pipeline (plan → execute) per target,
//! at most `max_concurrent_repos` at a time, all sharing one hosting client.
//!
//! Every target yields exactly one [`SyncResult`], returned in target order.
//! Failures, panics and cancellation of one repository never affect another.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use reposync_core::{
    FailureKind, RepoId, SourceFile, SyncOutcome, SyncPlan, SyncPolicy, SyncResult,
    TargetRepository,
};
use reposync_gateway::HostingApi;

use crate::{executor, planner};

pub const CANCELLED: &str = "cancelled";

/// Run-wide cancellation signal.
///
/// Once cancelled, no new repository pipeline starts; pipelines already
/// running finish their in-flight calls.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender lives as long as any clone of the token.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, read-only inputs of a run.
#[derive(Clone)]
pub struct RunContext {
    pub api: Arc<dyn HostingApi>,
    pub policy: Arc<SyncPolicy>,
    pub source: Arc<[SourceFile]>,
    pub dry_run: bool,
}

/// Sync every target and return one result per target, in target order.
pub async fn run(
    ctx: RunContext,
    targets: Vec<TargetRepository>,
    cancel: &CancelToken,
) -> Vec<SyncResult> {
    let total = targets.len();
    let pool = Arc::new(Semaphore::new(ctx.policy.max_concurrent_repos()));
    tracing::info!(
        targets = total,
        files = ctx.source.len(),
        concurrency = ctx.policy.max_concurrent_repos(),
        dry_run = ctx.dry_run,
        "sync run started",
    );

    let mut slots: Vec<Slot> = Vec::with_capacity(total);
    for target in targets {
        if cancel.is_cancelled() {
            slots.push(Slot::Done(SyncResult::skipped(target.id, CANCELLED)));
            continue;
        }

        // Wait for a free worker and for room in the shared rate budget.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = async {
                let permit = pool.clone().acquire_owned().await;
                ctx.api.wait_for_capacity().await;
                permit
            } => Some(permit),
        };
        let permit = match permit {
            None => {
                slots.push(Slot::Done(SyncResult::skipped(target.id, CANCELLED)));
                continue;
            }
            Some(Err(err)) => {
                slots.push(Slot::Done(SyncResult::failed(
                    target.id,
                    FailureKind::Internal,
                    format!("worker pool closed: {err}"),
                )));
                continue;
            }
            Some(Ok(permit)) => permit,
        };

        let id = target.id.clone();
        let span = tracing::info_span!("repository", repository = %target.id);
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        let handle = tokio::spawn(
            async move {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return SyncResult::skipped(target.id, CANCELLED);
                }
                process(&ctx, &target).await
            }
            .instrument(span),
        );
        slots.push(Slot::Running(id, handle));
    }

    let mut results = Vec::with_capacity(total);
    for slot in slots {
        let result = match slot {
            Slot::Done(result) => result,
            Slot::Running(id, handle) => match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(repository = %id, error = %err, "repository task aborted");
                    SyncResult::failed(id, FailureKind::Internal, format!("task aborted: {err}"))
                }
            },
        };
        results.push(result);
    }

    let failed = results.iter().filter(|r| r.outcome.is_failed()).count();
    tracing::info!(targets = total, failed, "sync run finished");
    results
}

enum Slot {
    Done(SyncResult),
    Running(RepoId, JoinHandle<SyncResult>),
}

/// Plan one target and, unless this is a dry run, execute the plan.
async fn process(ctx: &RunContext, target: &TargetRepository) -> SyncResult {
    let started = Instant::now();
    let plan = match planner::plan(ctx.api.as_ref(), &ctx.policy, &ctx.source, target).await {
        Ok(plan) => plan,
        Err(err) => {
            tracing::error!(error = %err, "planning failed");
            let mut result =
                SyncResult::failed(target.id.clone(), FailureKind::Fetch, err.to_string());
            result.duration_ms = started.elapsed().as_millis() as u64;
            return result;
        }
    };

    let mut result = if ctx.dry_run {
        dry_run_result(&plan)
    } else {
        executor::execute(ctx.api.as_ref(), &ctx.policy, &plan).await
    };
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

fn dry_run_result(plan: &SyncPlan) -> SyncResult {
    let id = plan.repository().id.clone();
    if !plan.has_effective_changes() {
        return SyncResult::new(id, SyncOutcome::NoChangesNeeded);
    }
    let changes = plan.changes();
    let mut result = SyncResult::new(
        id,
        SyncOutcome::Planned {
            pending_changes: changes.len(),
        },
    );
    result.changes = changes;
    result
}
