//! In-memory hosting provider for engine tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use reposync_core::{hash, RawConfig, RepoId, SourceFile, SyncPolicy, TargetRepository};
use reposync_gateway::{
    Branch, FileWrite, GatewayError, HostingApi, PullRequest, PullRequestSpec, RemoteFile,
    TreeEntry,
};

type Files = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, Default)]
struct FakeBranch {
    head: String,
    files: Files,
}

#[derive(Debug, Clone)]
pub struct FakePull {
    pub number: u64,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct FakeRepo {
    branches: BTreeMap<String, FakeBranch>,
    pulls: Vec<FakePull>,
    /// Operation name → HTTP status returned on every call.
    failures: HashMap<&'static str, u16>,
    /// Successful file writes allowed before writes start failing with 500.
    write_budget: Option<usize>,
}

#[derive(Default)]
pub struct FakeHost {
    repos: Mutex<HashMap<String, FakeRepo>>,
    calls: Mutex<Vec<(String, &'static str)>>,
    commits: AtomicUsize,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// When set, `wait_for_capacity` blocks until the value is `true`.
    capacity: Option<watch::Receiver<bool>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` (on the tokio clock).
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// A host whose rate budget starts exhausted. Send `true` to open it.
    pub fn with_capacity_gate() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let host = Self {
            capacity: Some(rx),
            ..Self::default()
        };
        (host, tx)
    }

    /// Number of calls made against any repository.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }

    /// Add a repository whose default branch holds `files`.
    pub fn add_repo(&self, repo: &str, default_branch: &str, files: &[(&str, &str)]) {
        let mut branch = FakeBranch {
            head: self.next_commit(),
            files: Files::new(),
        };
        for (path, content) in files {
            branch.files.insert(path.to_string(), content.as_bytes().to_vec());
        }
        let mut fake = FakeRepo::default();
        fake.branches.insert(default_branch.to_string(), branch);
        self.repos.lock().expect("lock").insert(repo.to_string(), fake);
    }

    /// Branch `name` off `from`, then overwrite `files` on it.
    pub fn add_branch(&self, repo: &str, name: &str, from: &str, files: &[(&str, &str)]) {
        let head = self.next_commit();
        let mut repos = self.repos.lock().expect("lock");
        let fake = repos.get_mut(repo).expect("repo exists");
        let mut branch = fake.branches.get(from).cloned().expect("base branch exists");
        for (path, content) in files {
            branch.files.insert(path.to_string(), content.as_bytes().to_vec());
        }
        branch.head = head;
        fake.branches.insert(name.to_string(), branch);
    }

    /// Commit `files` directly onto an existing branch.
    pub fn push(&self, repo: &str, branch: &str, files: &[(&str, &str)]) {
        self.add_branch(repo, branch, branch, files);
    }

    pub fn remove_file(&self, repo: &str, branch: &str, path: &str) {
        let mut repos = self.repos.lock().expect("lock");
        if let Some(branch) = repos.get_mut(repo).and_then(|r| r.branches.get_mut(branch)) {
            branch.files.remove(path);
        }
    }

    pub fn fail(&self, repo: &str, operation: &'static str, status: u16) {
        let mut repos = self.repos.lock().expect("lock");
        repos.entry(repo.to_string()).or_default().failures.insert(operation, status);
    }

    pub fn limit_writes(&self, repo: &str, budget: usize) {
        let mut repos = self.repos.lock().expect("lock");
        repos.entry(repo.to_string()).or_default().write_budget = Some(budget);
    }

    pub fn clear_failures(&self, repo: &str) {
        let mut repos = self.repos.lock().expect("lock");
        if let Some(fake) = repos.get_mut(repo) {
            fake.failures.clear();
            fake.write_budget = None;
        }
    }

    pub fn file(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        let repos = self.repos.lock().expect("lock");
        repos
            .get(repo)?
            .branches
            .get(branch)?
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn has_branch(&self, repo: &str, branch: &str) -> bool {
        let repos = self.repos.lock().expect("lock");
        repos.get(repo).is_some_and(|r| r.branches.contains_key(branch))
    }

    pub fn pulls(&self, repo: &str) -> Vec<FakePull> {
        let repos = self.repos.lock().expect("lock");
        repos.get(repo).map(|r| r.pulls.clone()).unwrap_or_default()
    }

    /// Operations called against `repo`, in order.
    pub fn calls(&self, repo: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|(r, _)| r == repo)
            .map(|(_, op)| *op)
            .collect()
    }

    pub fn count(&self, repo: &str, operation: &str) -> usize {
        self.calls(repo).iter().filter(|op| **op == operation).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_commit(&self) -> String {
        format!("commit-{}", self.commits.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn enter(&self, repo: &RepoId, operation: &'static str) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .expect("lock")
            .push((repo.0.clone(), operation));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let repos = self.repos.lock().expect("lock");
        let Some(fake) = repos.get(&repo.0) else {
            return Err(status_error(operation, 404, "Not Found"));
        };
        match fake.failures.get(operation) {
            Some(&status) if (500..600).contains(&status) => Err(GatewayError::Exhausted {
                operation,
                attempts: 3,
                last: Box::new(GatewayError::Transient {
                    operation,
                    status: Some(status),
                    message: "server error".into(),
                }),
            }),
            Some(&status) => Err(status_error(operation, status, "injected failure")),
            None => Ok(()),
        }
    }
}

fn status_error(operation: &'static str, status: u16, message: &str) -> GatewayError {
    GatewayError::Permanent {
        operation,
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl HostingApi for FakeHost {
    async fn list_tree(&self, repo: &RepoId, reference: &str) -> Result<Vec<TreeEntry>, GatewayError> {
        self.enter(repo, "list_tree").await?;
        let repos = self.repos.lock().expect("lock");
        let branch = repos
            .get(&repo.0)
            .and_then(|r| r.branches.get(reference))
            .ok_or_else(|| status_error("list_tree", 404, "Not Found"))?;
        Ok(branch
            .files
            .iter()
            .map(|(path, bytes)| TreeEntry {
                path: path.clone(),
                blob_sha: hash::git_blob_id(bytes),
            })
            .collect())
    }

    async fn get_file_contents(
        &self,
        repo: &RepoId,
        reference: &str,
        paths: &[String],
    ) -> Result<Vec<RemoteFile>, GatewayError> {
        self.enter(repo, "get_file_contents").await?;
        let repos = self.repos.lock().expect("lock");
        let Some(branch) = repos.get(&repo.0).and_then(|r| r.branches.get(reference)) else {
            return Ok(Vec::new());
        };
        Ok(paths
            .iter()
            .filter_map(|path| {
                branch.files.get(path).map(|bytes| RemoteFile {
                    path: path.clone(),
                    content: bytes.clone().into(),
                })
            })
            .collect())
    }

    async fn get_branch(&self, repo: &RepoId, name: &str) -> Result<Option<Branch>, GatewayError> {
        self.enter(repo, "get_branch").await?;
        let repos = self.repos.lock().expect("lock");
        Ok(repos
            .get(&repo.0)
            .and_then(|r| r.branches.get(name))
            .map(|b| Branch {
                name: name.to_string(),
                head_sha: b.head.clone(),
                created: false,
            }))
    }

    async fn create_or_get_branch(
        &self,
        repo: &RepoId,
        name: &str,
        from: &str,
    ) -> Result<Branch, GatewayError> {
        self.enter(repo, "create_or_get_branch").await?;
        let mut repos = self.repos.lock().expect("lock");
        let fake = repos
            .get_mut(&repo.0)
            .ok_or_else(|| status_error("create_or_get_branch", 404, "Not Found"))?;
        if let Some(existing) = fake.branches.get(name) {
            return Ok(Branch {
                name: name.to_string(),
                head_sha: existing.head.clone(),
                created: false,
            });
        }
        let base = fake
            .branches
            .get(from)
            .cloned()
            .ok_or_else(|| status_error("create_or_get_branch", 404, "base branch not found"))?;
        let head = base.head.clone();
        fake.branches.insert(name.to_string(), base);
        Ok(Branch {
            name: name.to_string(),
            head_sha: head,
            created: true,
        })
    }

    async fn create_or_update_file(
        &self,
        repo: &RepoId,
        write: &FileWrite<'_>,
    ) -> Result<String, GatewayError> {
        self.enter(repo, "create_or_update_file").await?;
        let commit = self.next_commit();
        let mut repos = self.repos.lock().expect("lock");
        let fake = repos
            .get_mut(&repo.0)
            .ok_or_else(|| status_error("create_or_update_file", 404, "Not Found"))?;
        if let Some(budget) = fake.write_budget.as_mut() {
            if *budget == 0 {
                return Err(GatewayError::Exhausted {
                    operation: "create_or_update_file",
                    attempts: 3,
                    last: Box::new(GatewayError::Transient {
                        operation: "create_or_update_file",
                        status: Some(502),
                        message: "bad gateway".into(),
                    }),
                });
            }
            *budget -= 1;
        }
        let branch = fake
            .branches
            .get_mut(write.branch)
            .ok_or_else(|| status_error("create_or_update_file", 404, "branch not found"))?;

        // Same preconditions as the real contents API.
        let current = branch.files.get(write.path).map(|b| hash::git_blob_id(b));
        if current.as_deref() != write.previous_blob {
            return Err(status_error("create_or_update_file", 409, "sha does not match"));
        }
        branch.files.insert(write.path.to_string(), write.content.to_vec());
        branch.head = commit.clone();
        Ok(commit)
    }

    async fn create_or_get_pull_request(
        &self,
        repo: &RepoId,
        spec: &PullRequestSpec<'_>,
    ) -> Result<PullRequest, GatewayError> {
        self.enter(repo, "create_or_get_pull_request").await?;
        let mut repos = self.repos.lock().expect("lock");
        let fake = repos
            .get_mut(&repo.0)
            .ok_or_else(|| status_error("create_or_get_pull_request", 404, "Not Found"))?;
        let url = |n: u64| format!("https://github.example/{}/pull/{n}", repo.0);
        if let Some(open) = fake
            .pulls
            .iter()
            .find(|p| p.head == spec.head && p.base == spec.base)
        {
            return Ok(PullRequest {
                number: open.number,
                url: url(open.number),
                created: false,
            });
        }
        let number = fake.pulls.len() as u64 + 1;
        fake.pulls.push(FakePull {
            number,
            head: spec.head.to_string(),
            base: spec.base.to_string(),
            title: spec.title.to_string(),
            body: spec.body.to_string(),
        });
        Ok(PullRequest {
            number,
            url: url(number),
            created: true,
        })
    }

    async fn wait_for_capacity(&self) {
        if let Some(gate) = &self.capacity {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn policy(exclude: &[&str], protected: &[&str]) -> SyncPolicy {
    policy_with(exclude, protected, 4)
}

pub fn policy_with(exclude: &[&str], protected: &[&str], max_concurrent_repos: i64) -> SyncPolicy {
    SyncPolicy::resolve(&RawConfig {
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
        protected: protected.iter().map(|s| s.to_string()).collect(),
        max_concurrent_repos,
        ..RawConfig::default()
    })
    .expect("policy")
}

pub fn source(files: &[(&str, &str)]) -> Vec<SourceFile> {
    files
        .iter()
        .map(|(path, content)| SourceFile::new(path, content.as_bytes().to_vec()).expect("file"))
        .collect()
}

pub fn target(repo: &str) -> TargetRepository {
    TargetRepository::new(repo, "main")
}
