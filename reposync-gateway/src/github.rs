//! [`HostingApi`] over the GitHub REST API (github.com or Enterprise Server).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reposync_core::{ApiSettings, RepoId};
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::hosting::{
    Branch, FileWrite, HostingApi, PullRequest, PullRequestSpec, RemoteFile, TreeEntry,
};
use crate::retry::RetryPolicy;
use crate::transport::{ApiRequest, Method, Transport, UreqTransport};

pub struct GitHubClient<T> {
    gateway: Gateway<T>,
}

impl GitHubClient<UreqTransport> {
    /// Client over the real network with the given bearer token.
    pub fn connect(settings: &ApiSettings, token: impl Into<String>) -> Self {
        let transport = UreqTransport::new(settings, token);
        Self::new(Gateway::new(transport, RetryPolicy::from_settings(settings)))
    }
}

impl<T: Transport> GitHubClient<T> {
    pub fn new(gateway: Gateway<T>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    async fn list_open_pull(
        &self,
        repo: &RepoId,
        spec: &PullRequestSpec<'_>,
    ) -> Result<Option<PullRequest>, GatewayError> {
        let request = ApiRequest::get("list_pull_requests", repo_path(repo, "pulls"))
            .query("state", "open")
            .query("head", format!("{}:{}", repo.owner(), spec.head))
            .query("base", spec.base);
        let response = self.gateway.call(&request).await?;
        let pulls = response
            .body
            .as_array()
            .ok_or_else(|| GatewayError::invalid(request.operation, "expected an array of pulls"))?;
        match pulls.first() {
            Some(pull) => Ok(Some(parse_pull(request.operation, pull, false)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<T: Transport> HostingApi for GitHubClient<T> {
    async fn list_tree(&self, repo: &RepoId, reference: &str) -> Result<Vec<TreeEntry>, GatewayError> {
        let request = ApiRequest::get(
            "list_tree",
            repo_path(repo, &format!("git/trees/{}", encode_path(reference))),
        )
        .query("recursive", "1");
        let response = self.gateway.call(&request).await?;

        // A partial listing would make existing (and protected) files look absent.
        if response.body.get("truncated").and_then(Value::as_bool) == Some(true) {
            tracing::warn!(repository = %repo, reference, "tree listing truncated by provider");
            return Err(GatewayError::invalid(
                request.operation,
                format!("tree listing of '{reference}' was truncated by the provider"),
            ));
        }
        let tree = response
            .body
            .get("tree")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::invalid(request.operation, "missing 'tree' array"))?;

        let mut entries = Vec::with_capacity(tree.len());
        for item in tree {
            if item.get("type").and_then(Value::as_str) != Some("blob") {
                continue;
            }
            let path = str_field(request.operation, item, "path")?;
            let sha = str_field(request.operation, item, "sha")?;
            entries.push(TreeEntry {
                path: path.to_owned(),
                blob_sha: sha.to_owned(),
            });
        }
        Ok(entries)
    }

    async fn get_file_contents(
        &self,
        repo: &RepoId,
        reference: &str,
        paths: &[String],
    ) -> Result<Vec<RemoteFile>, GatewayError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let request = ApiRequest::get(
                "get_file_contents",
                repo_path(repo, &format!("contents/{}", encode_path(path))),
            )
            .query("ref", reference);
            let response = match self.gateway.call(&request).await {
                Ok(response) => response,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            let encoded = str_field(request.operation, &response.body, "content")?;
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| GatewayError::invalid(request.operation, format!("bad base64: {e}")))?;
            files.push(RemoteFile {
                path: path.clone(),
                content: bytes.into(),
            });
        }
        Ok(files)
    }

    async fn get_branch(&self, repo: &RepoId, name: &str) -> Result<Option<Branch>, GatewayError> {
        let request = ApiRequest::get(
            "get_branch",
            repo_path(repo, &format!("git/ref/heads/{}", encode_path(name))),
        );
        let response = match self.gateway.call(&request).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let sha = response
            .body
            .pointer("/object/sha")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::invalid(request.operation, "missing object.sha"))?;
        Ok(Some(Branch {
            name: name.to_owned(),
            head_sha: sha.to_owned(),
            created: false,
        }))
    }

    async fn create_or_get_branch(
        &self,
        repo: &RepoId,
        name: &str,
        from: &str,
    ) -> Result<Branch, GatewayError> {
        if let Some(existing) = self.get_branch(repo, name).await? {
            return Ok(existing);
        }
        let base = self
            .get_branch(repo, from)
            .await?
            .ok_or_else(|| GatewayError::Permanent {
                operation: "create_branch",
                status: 404,
                message: format!("base branch '{from}' not found"),
            })?;

        let request = ApiRequest::with_body(
            "create_branch",
            Method::Post,
            repo_path(repo, "git/refs"),
            json!({ "ref": format!("refs/heads/{name}"), "sha": base.head_sha }),
        );
        match self.gateway.call(&request).await {
            Ok(_) => Ok(Branch {
                name: name.to_owned(),
                head_sha: base.head_sha,
                created: true,
            }),
            // Lost a race with another run creating the same ref.
            Err(err) if err.status() == Some(422) => self
                .get_branch(repo, name)
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    async fn create_or_update_file(
        &self,
        repo: &RepoId,
        write: &FileWrite<'_>,
    ) -> Result<String, GatewayError> {
        let mut body = json!({
            "message": write.message,
            "content": STANDARD.encode(write.content),
            "branch": write.branch,
        });
        if let Some(previous) = write.previous_blob {
            body["sha"] = Value::String(previous.to_owned());
        }
        let request = ApiRequest::with_body(
            "create_or_update_file",
            Method::Put,
            repo_path(repo, &format!("contents/{}", encode_path(write.path))),
            body,
        );
        let response = self.gateway.call(&request).await?;
        response
            .body
            .pointer("/commit/sha")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| GatewayError::invalid(request.operation, "missing commit.sha"))
    }

    async fn create_or_get_pull_request(
        &self,
        repo: &RepoId,
        spec: &PullRequestSpec<'_>,
    ) -> Result<PullRequest, GatewayError> {
        if let Some(existing) = self.list_open_pull(repo, spec).await? {
            return Ok(existing);
        }
        let request = ApiRequest::with_body(
            "create_pull_request",
            Method::Post,
            repo_path(repo, "pulls"),
            json!({
                "title": spec.title,
                "head": spec.head,
                "base": spec.base,
                "body": spec.body,
            }),
        );
        match self.gateway.call(&request).await {
            Ok(response) => parse_pull(request.operation, &response.body, true),
            Err(err) if err.status() == Some(422) => self
                .list_open_pull(repo, spec)
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    async fn wait_for_capacity(&self) {
        self.gateway.wait_for_capacity().await;
    }
}

fn repo_path(repo: &RepoId, rest: &str) -> String {
    format!(
        "/repos/{}/{}/{}",
        urlencoding::encode(repo.owner()),
        urlencoding::encode(repo.name()),
        rest
    )
}

/// Percent-encode each `/`-separated segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn str_field<'a>(
    operation: &'static str,
    value: &'a Value,
    field: &str,
) -> Result<&'a str, GatewayError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::invalid(operation, format!("missing '{field}'")))
}

fn parse_pull(operation: &'static str, value: &Value, created: bool) -> Result<PullRequest, GatewayError> {
    let number = value
        .get("number")
        .and_then(Value::as_u64)
        .ok_or_else(|| GatewayError::invalid(operation, "missing 'number'"))?;
    let url = str_field(operation, value, "html_url")?;
    Ok(PullRequest {
        number,
        url: url.to_owned(),
        created,
    })
}
