//! Source snapshot builder.
//!
//! Walks the canonical source tree once per run and returns every file to
//! propagate, sorted by repository path. Excluded paths are filtered before
//! the file is opened, so they are never read or hashed. `.git` directories
//! and symlinks are always skipped.

use std::path::{Path, PathBuf};

use reposync_core::{SourceFile, SyncPolicy};

use crate::error::{io_err, SyncError};

const GIT_DIR: &str = ".git";

/// Build the snapshot of `root` under `policy`.
///
/// Two builds over an unchanged tree return identical sequences.
pub fn build(root: &Path, policy: &SyncPolicy) -> Result<Vec<SourceFile>, SyncError> {
    let meta = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
    if !meta.is_dir() {
        return Err(io_err(
            root,
            std::io::Error::other("source root is not a directory"),
        ));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in sorted_entries(&dir)? {
            let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            let path = entry.path();
            if file_type.is_symlink() {
                tracing::debug!(path = %path.display(), "skipping symlink");
                continue;
            }
            if file_type.is_dir() {
                if entry.file_name() != GIT_DIR {
                    pending.push(path);
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let relative = repo_path(root, &path)?;
            if policy.is_excluded(&relative) {
                tracing::debug!(path = %relative, "excluded from snapshot");
                continue;
            }
            let content = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            let file = SourceFile::new(&relative, content)
                .ok_or_else(|| SyncError::InvalidPath { path: path.clone() })?;
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
    tracing::info!(root = %root.display(), files = files.len(), "source snapshot built");
    Ok(files)
}

fn sorted_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>, SyncError> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_err(dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

/// `path` relative to `root`, `/`-separated. Non-UTF-8 names are rejected.
fn repo_path(root: &Path, path: &Path) -> Result<String, SyncError> {
    let invalid = || SyncError::InvalidPath {
        path: PathBuf::from(path),
    };
    let relative = path.strip_prefix(root).map_err(|_| invalid())?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str().ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use reposync_core::RawConfig;
    use tempfile::TempDir;

    use super::*;

    fn policy(exclude: &[&str]) -> SyncPolicy {
        SyncPolicy::resolve(&RawConfig {
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..RawConfig::default()
        })
        .expect("policy")
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().expect("tmp");
        write(tmp.path(), "b.md", "bee\n");
        write(tmp.path(), "a.md", "ay\n");
        write(tmp.path(), ".github/workflows/ci.yml", "on: push\n");
        write(tmp.path(), "drafts/wip.md", "draft\n");
        write(tmp.path(), ".git/HEAD", "ref: refs/heads/main\n");
        tmp
    }

    #[test]
    fn paths_are_sorted_and_slash_separated() {
        let tmp = fixture();
        let files = build(tmp.path(), &policy(&[])).expect("build");
        let paths: Vec<_> = files.iter().map(|f| f.relative_path()).collect();
        assert_eq!(
            paths,
            vec![".github/workflows/ci.yml", "a.md", "b.md", "drafts/wip.md"]
        );
    }

    #[test]
    fn excluded_and_git_paths_are_left_out() {
        let tmp = fixture();
        let files = build(tmp.path(), &policy(&["drafts/**"])).expect("build");
        assert!(files.iter().all(|f| !f.relative_path().starts_with("drafts/")));
        assert!(files.iter().all(|f| !f.relative_path().starts_with(".git/")));
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn repeated_builds_are_identical() {
        let tmp = fixture();
        let first = build(tmp.path(), &policy(&[])).expect("first");
        let second = build(tmp.path(), &policy(&[])).expect("second");
        let pairs = |files: &[SourceFile]| {
            files
                .iter()
                .map(|f| (f.relative_path().to_owned(), f.content_hash().to_owned()))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(&first), pairs(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn missing_root_is_io_error_with_path() {
        let tmp = TempDir::new().expect("tmp");
        let root = tmp.path().join("nope");
        let err = build(&root, &policy(&[])).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let tmp = fixture();
        std::os::unix::fs::symlink(tmp.path().join("a.md"), tmp.path().join("link.md"))
            .expect("symlink");
        let files = build(tmp.path(), &policy(&[])).expect("build");
        assert!(files.iter().all(|f| f.relative_path() != "link.md"));
    }
}
