//! Serialized shapes of results and targets, as consumed by `--json` output
//! and the sync ledger.

use reposync_core::{
    ActionKind, Change, FailureKind, RepoId, SyncOutcome, SyncResult, TargetRepository,
};
use rstest::rstest;

#[rstest]
#[case::applied(SyncOutcome::Applied { pr_url: "https://github.com/acme/widgets/pull/7".into() }, "applied")]
#[case::no_changes(SyncOutcome::NoChangesNeeded, "no_changes_needed")]
#[case::planned(SyncOutcome::Planned { pending_changes: 2 }, "planned")]
#[case::skipped(SyncOutcome::Skipped { reason: "cancelled".into() }, "skipped")]
#[case::failed(SyncOutcome::Failed { kind: FailureKind::RateLimited, detail: "HTTP 429".into() }, "failed")]
fn result_json_round_trips(#[case] outcome: SyncOutcome, #[case] status: &str) {
    let mut result = SyncResult::new(RepoId::from("acme/widgets"), outcome);
    result.actions_applied = 1;
    result.duration_ms = 42;
    result.changes = vec![Change {
        path: "CODE_OF_CONDUCT.md".into(),
        action: ActionKind::Add,
    }];

    let json = serde_json::to_value(&result).expect("serialize");
    assert_eq!(json["outcome"]["status"], status);
    assert_eq!(json["repository"], "acme/widgets");
    assert_eq!(json["changes"][0]["action"], "add");

    let back: SyncResult = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, result);
}

#[test]
fn empty_changes_and_commit_are_omitted() {
    let result = SyncResult::new(RepoId::from("acme/widgets"), SyncOutcome::NoChangesNeeded);
    let json = serde_json::to_value(&result).expect("serialize");
    assert!(json.get("changes").is_none());
    assert!(json.get("synced_commit").is_none());
}

#[test]
fn target_repository_yaml_uses_repository_key() {
    let mut target = TargetRepository::new("acme/gadgets", "trunk");
    target.last_synced_commit = Some("1a2b3c".into());

    let yaml = serde_yaml::to_string(&target).expect("serialize");
    assert!(yaml.contains("repository: acme/gadgets"), "got: {yaml}");

    let back: TargetRepository = serde_yaml::from_str(&yaml).expect("deserialize");
    assert_eq!(back, target);
}
