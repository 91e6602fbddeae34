//! Config and target file loading: error messages carry the file path, and a
//! loaded file resolves to the same policy as the equivalent struct.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use reposync_core::{config, ConfigError};

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn missing_config_reports_io_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("sync.yaml");
    let err = config::load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("sync.yaml"));
}

#[test]
fn corrupt_yaml_reports_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("sync.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("sync.yaml"), "got: {err}");
}

#[test]
fn unknown_config_key_is_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("sync.yaml");
    file.write_str("exclude: []\nexlcude_typo: [x]\n").expect("write");

    let err = config::load_config(file.path()).unwrap_err();
    let source_msg = match &err {
        ConfigError::Parse { source, .. } => source.to_string(),
        other => panic!("expected parse error, got {other}"),
    };
    assert!(source_msg.contains("exlcude_typo"), "got: {source_msg}");
}

#[test]
fn malformed_target_identifier_is_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("targets.yaml");
    file.write_str("- acme/widgets\n- not-a-repo\n").expect("write");

    let err = config::load_targets(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRepository(ref r) if r == "not-a-repo"));
}

// ---------------------------------------------------------------------------
// 2. Successful loads
// ---------------------------------------------------------------------------

#[test]
fn full_config_file_resolves() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("sync.yaml");
    file.write_str(
        r#"
exclude:
  - "drafts/**"
protected:
  - ".github/CODEOWNERS"
work_branch: standards-sync
commit_message: "docs: {{ action }} {{ path }} in {{ repository }}"
pull_request:
  title: "Sync standards into {{ repository }}"
max_concurrent_repos: 2
require_confirmation: false
api:
  base_url: https://ghe.example.com/api/v3
  max_attempts: 3
"#,
    )
    .expect("write");
    file.assert(predicate::path::exists());

    let settings = config::load_settings(file.path()).expect("load");
    assert_eq!(settings.policy.work_branch(), "standards-sync");
    assert_eq!(settings.policy.max_concurrent_repos(), 2);
    assert!(settings.policy.is_excluded("drafts/a.md"));
    assert!(settings.policy.is_protected(".github/CODEOWNERS"));
    assert_eq!(settings.api.base_url, "https://ghe.example.com/api/v3");
    assert_eq!(settings.api.max_attempts, 3);
    assert_eq!(settings.api.base_backoff.as_millis(), 500);
}

#[test]
fn target_order_is_preserved() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("targets.yaml");
    file.write_str("- zeta/one\n- alpha/two\n- repository: mid/three\n  default_branch: develop\n")
        .expect("write");

    let targets = config::load_targets(file.path()).expect("load");
    let ids: Vec<_> = targets.iter().map(|t| t.id.0.as_str()).collect();
    assert_eq!(ids, vec!["zeta/one", "alpha/two", "mid/three"]);
    assert_eq!(targets[2].default_branch, "develop");
}

#[test]
fn empty_targets_file_is_empty_list() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("targets.yaml");
    file.write_str("").expect("write");
    assert!(config::load_targets(file.path()).expect("load").is_empty());
}
