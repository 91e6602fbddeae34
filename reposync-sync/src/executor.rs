//! Plan executor.
//!
//! Applies one repository's plan: ensure the work branch, commit each `Add` /
//! `Update` on it, then make sure a pull request into the default branch is
//! open. Every step is create-or-get, so re-executing after a crash reuses the
//! branch and the pull request, and skips files the branch already holds.
//! A failure mid-way is reported with the number of writes already made; the
//! branch is left as is for the next run to resume from.

use std::collections::HashMap;

use reposync_core::{
    hash,
    message::{ChangeLine, CommitContext, PullRequestContext},
    ActionKind, FailureKind, FileAction, RepoId, SyncOutcome, SyncPlan, SyncPolicy, SyncResult,
};
use reposync_gateway::{ErrorClass, FileWrite, GatewayError, HostingApi, PullRequestSpec};
use tokio::time::Instant;

/// Execute `plan`. Never returns an error: failures become the result's outcome.
pub async fn execute(api: &dyn HostingApi, policy: &SyncPolicy, plan: &SyncPlan) -> SyncResult {
    let started = Instant::now();
    let repo = &plan.repository().id;

    let mut result = if !plan.has_effective_changes() {
        tracing::debug!(repository = %repo, "no changes needed");
        SyncResult::new(repo.clone(), SyncOutcome::NoChangesNeeded)
    } else {
        let mut progress = Progress::default();
        let outcome = apply(api, policy, plan, &mut progress).await;
        let mut result = SyncResult::new(repo.clone(), outcome);
        result.actions_applied = progress.applied;
        result.synced_commit = progress.head;
        result.changes = plan.changes();
        result
    };
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

#[derive(Debug, Default)]
struct Progress {
    applied: usize,
    head: Option<String>,
}

async fn apply(
    api: &dyn HostingApi,
    policy: &SyncPolicy,
    plan: &SyncPlan,
    progress: &mut Progress,
) -> SyncOutcome {
    let repo = &plan.repository().id;
    let work = policy.work_branch();
    let default_branch = plan.repository().default_branch.as_str();

    let branch = match api.create_or_get_branch(repo, work, default_branch).await {
        Ok(branch) => branch,
        Err(err) => return gateway_failure(repo, err),
    };
    progress.head = Some(branch.head_sha.clone());
    if branch.created {
        tracing::info!(repository = %repo, branch = work, from = default_branch, "created work branch");
    }

    // A reused branch may already hold some of the writes.
    let on_branch: HashMap<String, String> = if branch.created {
        HashMap::new()
    } else {
        match api.list_tree(repo, work).await {
            Ok(tree) => tree.into_iter().map(|e| (e.path, e.blob_sha)).collect(),
            Err(err) => return gateway_failure(repo, err),
        }
    };

    for action in plan.effective_actions() {
        let Some(content) = action.content() else {
            continue;
        };
        let path = action.path();
        let previous = if branch.created {
            match action {
                FileAction::Update { old_hash, .. } => Some(old_hash.as_str()),
                _ => None,
            }
        } else {
            on_branch.get(path).map(String::as_str)
        };
        if previous == Some(hash::git_blob_id(&content[..]).as_str()) {
            tracing::debug!(repository = %repo, path, "already on work branch");
            continue;
        }

        let kind = action.kind().to_string();
        let message = match policy.templates().commit_message(&CommitContext {
            repository: &repo.0,
            branch: work,
            path,
            action: &kind,
        }) {
            Ok(message) => message,
            Err(err) => return internal_failure(repo, format!("commit message: {err}")),
        };

        let write = FileWrite {
            branch: work,
            path,
            content: &content[..],
            previous_blob: previous,
            message: &message,
        };
        match api.create_or_update_file(repo, &write).await {
            Ok(commit) => {
                progress.applied += 1;
                progress.head = Some(commit);
                tracing::info!(repository = %repo, path, action = %kind, "committed");
            }
            Err(err) => {
                tracing::warn!(
                    repository = %repo,
                    path,
                    applied = progress.applied,
                    error = %err,
                    "write failed, leaving work branch as is",
                );
                return gateway_failure(repo, err);
            }
        }
    }

    let changes: Vec<ChangeLine<'_>> = plan
        .effective_actions()
        .map(|a| ChangeLine {
            path: a.path(),
            action: kind_label(a.kind()),
        })
        .collect();
    let (title, body) = match policy.templates().pull_request(&PullRequestContext {
        repository: &repo.0,
        branch: work,
        base: default_branch,
        changes,
    }) {
        Ok(rendered) => rendered,
        Err(err) => return internal_failure(repo, format!("pull request text: {err}")),
    };

    let spec = PullRequestSpec {
        head: work,
        base: default_branch,
        title: &title,
        body: &body,
    };
    match api.create_or_get_pull_request(repo, &spec).await {
        Ok(pr) => {
            if pr.created {
                tracing::info!(repository = %repo, url = %pr.url, "opened pull request");
            } else {
                tracing::info!(repository = %repo, url = %pr.url, "pull request already open");
            }
            SyncOutcome::Applied { pr_url: pr.url }
        }
        Err(err) => gateway_failure(repo, err),
    }
}

fn kind_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Add => "add",
        _ => "update",
    }
}

/// Map a gateway error onto the failure taxonomy reported to users.
pub fn failure_kind(err: &GatewayError) -> FailureKind {
    match err.class() {
        ErrorClass::Transient => FailureKind::Transient,
        ErrorClass::RateLimited => FailureKind::RateLimited,
        ErrorClass::Permanent => FailureKind::Permanent,
    }
}

fn gateway_failure(repo: &RepoId, err: GatewayError) -> SyncOutcome {
    tracing::error!(repository = %repo, error = %err, "sync failed");
    SyncOutcome::Failed {
        kind: failure_kind(&err),
        detail: err.to_string(),
    }
}

fn internal_failure(repo: &RepoId, detail: String) -> SyncOutcome {
    tracing::error!(repository = %repo, detail = %detail, "sync failed");
    SyncOutcome::Failed {
        kind: FailureKind::Internal,
        detail,
    }
}
