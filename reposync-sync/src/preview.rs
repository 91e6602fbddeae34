//! Dry-run unified diff support for `reposync sync --dry-run --diff`.

use std::collections::HashMap;

use similar::TextDiff;

use reposync_core::{ActionKind, FileAction, SyncPlan};
use reposync_gateway::HostingApi;

use crate::error::PlanError;

/// A single planned file change, rendered as a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub action: ActionKind,
    pub unified_diff: String,
}

/// Render every effective action of `plan` against the target's current
/// content on its default branch. Nothing is written.
pub async fn preview(api: &dyn HostingApi, plan: &SyncPlan) -> Result<Vec<FileDiff>, PlanError> {
    let repo = &plan.repository().id;
    let reference = plan.repository().default_branch.as_str();
    let updated: Vec<String> = plan
        .effective_actions()
        .filter(|a| a.kind() == ActionKind::Update)
        .map(|a| a.path().to_owned())
        .collect();

    let current: HashMap<String, _> = if updated.is_empty() {
        HashMap::new()
    } else {
        api.get_file_contents(repo, reference, &updated)
            .await
            .map_err(|source| PlanError::Fetch {
                repository: repo.clone(),
                reference: reference.to_owned(),
                source,
            })?
            .into_iter()
            .map(|f| (f.path, f.content))
            .collect()
    };

    let mut diffs = Vec::new();
    for action in plan.effective_actions() {
        let Some(new) = action.content() else {
            continue;
        };
        let unified_diff = match action {
            FileAction::Update { path, .. } => match current.get(path) {
                Some(old) => render_diff(path, Some(&old[..]), new),
                None => unavailable(path),
            },
            _ => render_diff(action.path(), None, new),
        };
        diffs.push(FileDiff {
            path: action.path().to_owned(),
            action: action.kind(),
            unified_diff,
        });
    }
    Ok(diffs)
}

/// Unified diff of `old` → `new`. `None` renders an all-added file.
pub fn render_diff(path: &str, old: Option<&[u8]>, new: &[u8]) -> String {
    let (Ok(old_text), Ok(new_text)) = (
        std::str::from_utf8(old.unwrap_or_default()),
        std::str::from_utf8(new),
    ) else {
        return format!("Binary file {path} differs\n");
    };
    let old_text = normalize_line_endings(old_text);
    let new_text = normalize_line_endings(new_text);

    let old_header = match old {
        Some(_) => format!("a/{path}"),
        None => "/dev/null".to_string(),
    };
    let new_header = format!("b/{path}");
    TextDiff::from_lines(&old_text, &new_text)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

/// Placeholder for an update whose current content vanished after planning.
fn unavailable(path: &str) -> String {
    format!("Current content of {path} unavailable; diff not shown\n")
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
