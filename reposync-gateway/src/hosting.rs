//! The hosting operations the planner and executor need, independent of the
//! provider behind them.

use async_trait::async_trait;
use reposync_core::{Content, RepoId};
use serde::Serialize;

use crate::error::GatewayError;

/// One blob in a tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    /// Git blob object id.
    pub blob_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub name: String,
    pub head_sha: String,
    /// `true` when this call created the branch.
    pub created: bool,
}

/// A single-file commit on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite<'a> {
    pub branch: &'a str,
    pub path: &'a str,
    pub content: &'a [u8],
    /// Blob id being replaced; `None` creates the file.
    pub previous_blob: Option<&'a str>,
    pub message: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSpec<'a> {
    pub head: &'a str,
    pub base: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    /// `true` when this call opened the pull request.
    pub created: bool,
}

#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Every blob reachable from `reference`, recursively, in one call.
    async fn list_tree(&self, repo: &RepoId, reference: &str) -> Result<Vec<TreeEntry>, GatewayError>;

    /// Contents of `paths` at `reference`. Missing paths are left out.
    async fn get_file_contents(
        &self,
        repo: &RepoId,
        reference: &str,
        paths: &[String],
    ) -> Result<Vec<RemoteFile>, GatewayError>;

    /// The branch, or `None` when it does not exist.
    async fn get_branch(&self, repo: &RepoId, name: &str) -> Result<Option<Branch>, GatewayError>;

    /// Create `name` from the head of `from`, or return it if it already exists.
    async fn create_or_get_branch(
        &self,
        repo: &RepoId,
        name: &str,
        from: &str,
    ) -> Result<Branch, GatewayError>;

    /// Commit one file; returns the new commit sha.
    async fn create_or_update_file(
        &self,
        repo: &RepoId,
        write: &FileWrite<'_>,
    ) -> Result<String, GatewayError>;

    /// Return the open pull request from `head` to `base`, opening one if none exists.
    async fn create_or_get_pull_request(
        &self,
        repo: &RepoId,
        spec: &PullRequestSpec<'_>,
    ) -> Result<PullRequest, GatewayError>;

    /// Resolve once the shared rate budget has room for new work.
    async fn wait_for_capacity(&self) {}
}
