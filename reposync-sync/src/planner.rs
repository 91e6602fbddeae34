//! Repository sync planner.
//!
//! One tree listing of the target's default branch gives the blob id of every
//! path; each source file is then classified in this order:
//!
//! 1. excluded by policy → `SkipExcluded`
//! 2. protected and already present → `SkipProtected`
//! 3. absent → `Add`
//! 4. blob differs → `Update`
//! 5. otherwise → `Unchanged`
//!
//! Files only present in the target are never touched.
//!
//! A leftover work branch never stands in for the default branch: it may have
//! been cut before files landed on the default branch, and a protected file
//! missing from it would otherwise plan as `Add`. The executor compares each
//! write against the work branch itself, which is what lets a rerun resume.

use std::collections::HashMap;

use reposync_core::{FileAction, PlanBase, SourceFile, SyncPlan, SyncPolicy, TargetRepository};
use reposync_gateway::{GatewayError, HostingApi};

use crate::error::PlanError;

/// Plan `source` against the current state of `target`.
///
/// Always diffs against the default branch. The plan base records whether the
/// work branch already exists, so the executor knows it is reusing one.
pub async fn plan(
    api: &dyn HostingApi,
    policy: &SyncPolicy,
    source: &[SourceFile],
    target: &TargetRepository,
) -> Result<SyncPlan, PlanError> {
    let repo = &target.id;
    let work = policy.work_branch();

    let base = match api
        .get_branch(repo, work)
        .await
        .map_err(fetch_error(target, work))?
    {
        Some(_) => PlanBase::WorkBranch(work.to_owned()),
        None => PlanBase::DefaultBranch(target.default_branch.clone()),
    };

    let default_branch = target.default_branch.as_str();
    let tree = api
        .list_tree(repo, default_branch)
        .await
        .map_err(|err| {
            if err.is_not_found() {
                PlanError::BaseBranchNotFound {
                    repository: repo.clone(),
                    branch: default_branch.to_owned(),
                }
            } else {
                fetch_error(target, default_branch)(err)
            }
        })?;
    let remote: HashMap<&str, &str> = tree
        .iter()
        .map(|entry| (entry.path.as_str(), entry.blob_sha.as_str()))
        .collect();

    let actions = plan_against_tree(policy, source, &remote);
    let plan = SyncPlan::new(target.clone(), base, actions);
    tracing::debug!(
        repository = %repo,
        base = default_branch,
        reuse_work_branch = matches!(plan.base(), PlanBase::WorkBranch(_)),
        effective = plan.effective_actions().count(),
        "planned",
    );
    Ok(plan)
}

/// Classify every source file against `remote` (path → blob id).
pub fn plan_against_tree(
    policy: &SyncPolicy,
    source: &[SourceFile],
    remote: &HashMap<&str, &str>,
) -> Vec<FileAction> {
    source
        .iter()
        .map(|file| {
            let path = file.relative_path().to_owned();
            if policy.is_excluded(&path) {
                return FileAction::SkipExcluded { path };
            }
            let existing = remote.get(path.as_str()).copied();
            match existing {
                Some(_) if policy.is_protected(&path) => {
                    tracing::debug!(path = %path, "protected path already present, not overwriting");
                    FileAction::SkipProtected { path }
                }
                None => FileAction::Add {
                    path,
                    content: file.content().clone(),
                },
                Some(blob) if blob != file.blob_id() => FileAction::Update {
                    path,
                    old_hash: blob.to_owned(),
                    new_content: file.content().clone(),
                },
                Some(_) => FileAction::Unchanged { path },
            }
        })
        .collect()
}

fn fetch_error<'a>(
    target: &'a TargetRepository,
    reference: &'a str,
) -> impl FnOnce(GatewayError) -> PlanError + 'a {
    move |source| PlanError::Fetch {
        repository: target.id.clone(),
        reference: reference.to_owned(),
        source,
    }
}
