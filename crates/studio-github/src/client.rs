// ABOUTME: reqwest-based GitHub REST client implementing RepositoryPublisher.
// ABOUTME: Handles branches, contents API commits, pull requests, labels, issues, and comments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use studio_core::{
    ArtifactComment, ArtifactRef, ArtifactStatus, ArtifactStatusSource, CommentTarget,
    InboundRequest, OpenArtifact, Publication, PublisherError, RepositoryPublisher, RequestKind,
};

use crate::types::{
    ContentFile, DirectoryEntry, GitRef, Issue, IssueComment, PullRequest, Repository,
};

const USER_AGENT: &str = "persona-studio";
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: &str = "100";
/// Upper bound on followed `Link: rel="next"` pages per listing.
const MAX_PAGES: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("github transport error: {0}")]
    Transport(String),

    #[error("github api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode github response: {0}")]
    Decode(String),

    #[error("github resource not found: {0}")]
    NotFound(String),
}

impl From<GitHubError> for PublisherError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Transport(msg) => PublisherError::Transport(msg),
            GitHubError::Api { status, body } => PublisherError::Rejected {
                status,
                message: body,
            },
            GitHubError::Decode(msg) => PublisherError::InvalidResponse(msg),
            GitHubError::NotFound(what) => PublisherError::NotFound(what),
        }
    }
}

/// Where requests come from and where persona packages go.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: String,
    pub issues_owner: String,
    pub issues_repo: String,
    pub personas_owner: String,
    pub personas_repo: String,
    pub create_label: String,
    pub update_label: String,
    /// Only pull requests whose head branch starts with this are the studio's.
    pub branch_prefix: String,
}

pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn issues_url(&self, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{rest}",
            self.config.api_url.trim_end_matches('/'),
            self.config.issues_owner,
            self.config.issues_repo
        )
    }

    fn personas_url(&self, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{rest}",
            self.config.api_url.trim_end_matches('/'),
            self.config.personas_owner,
            self.config.personas_repo
        )
    }

    fn personas_repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.personas_owner,
            self.config.personas_repo
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GitHubError> {
        let response = request
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| GitHubError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GitHubError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitHubError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| GitHubError::Decode(e.to_string()))
    }

    /// Fetch every page of a list endpoint, following `rel="next"` links.
    async fn paginate<T: DeserializeOwned>(
        &self,
        first: RequestBuilder,
    ) -> Result<Vec<T>, GitHubError> {
        let mut items = Vec::new();
        let mut response = self.send(first).await?;
        for page in 1.. {
            let next = next_page(response.headers());
            let batch: Vec<T> = response
                .json()
                .await
                .map_err(|e| GitHubError::Decode(e.to_string()))?;
            items.extend(batch);

            match next {
                Some(url) if page < MAX_PAGES => {
                    response = self.send(self.http.get(url)).await?;
                }
                Some(_) => {
                    tracing::warn!(pages = page, items = items.len(), "page limit reached, listing truncated");
                    break;
                }
                None => break,
            }
        }
        Ok(items)
    }

    pub async fn default_branch(&self) -> Result<String, GitHubError> {
        let repo: Repository = self.json(self.http.get(self.personas_repo_url())).await?;
        Ok(repo.default_branch)
    }

    /// Create `branch` from the tip of `base`. An existing branch is reused.
    pub async fn create_branch(&self, branch: &str, base: &str) -> Result<(), GitHubError> {
        let base_ref: GitRef = self
            .json(self.http.get(self.personas_url(&format!("git/ref/heads/{base}"))))
            .await?;

        let request = self.http.post(self.personas_url("git/refs")).json(&json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": base_ref.object.sha,
        }));
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(GitHubError::Api { status: 422, body }) if body.contains("already exists") => {
                tracing::warn!(branch, "branch already exists, reusing it");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn file_sha(&self, path: &str, branch: &str) -> Result<Option<String>, GitHubError> {
        let request = self
            .http
            .get(self.personas_url(&format!("contents/{path}")))
            .query(&[("ref", branch)]);
        match self.json::<ContentFile>(request).await {
            Ok(file) => Ok(Some(file.sha)),
            Err(GitHubError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create or replace one file on `branch`.
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
    ) -> Result<(), GitHubError> {
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = self.file_sha(path, branch).await? {
            body["sha"] = json!(sha);
        }

        self.send(
            self.http
                .put(self.personas_url(&format!("contents/{path}")))
                .json(&body),
        )
        .await?;
        tracing::debug!(path, branch, "file committed");
        Ok(())
    }

    /// Delete one file from `branch`. Returns false when it was not there.
    pub async fn delete_file(
        &self,
        path: &str,
        branch: &str,
        message: &str,
    ) -> Result<bool, GitHubError> {
        let Some(sha) = self.file_sha(path, branch).await? else {
            return Ok(false);
        };
        self.send(
            self.http
                .delete(self.personas_url(&format!("contents/{path}")))
                .json(&json!({ "message": message, "sha": sha, "branch": branch })),
        )
        .await?;
        tracing::debug!(path, branch, "file deleted");
        Ok(true)
    }

    async fn commit_files(
        &self,
        files: &BTreeMap<String, String>,
        branch: &str,
        message: &str,
    ) -> Result<(), GitHubError> {
        for (path, content) in files {
            self.put_file(path, content, branch, message).await?;
        }
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) {
        if labels.is_empty() {
            return;
        }
        let request = self
            .http
            .post(self.personas_url(&format!("issues/{number}/labels")))
            .json(&json!({ "labels": labels }));
        if let Err(e) = self.send(request).await {
            tracing::warn!(pr = number, error = %e, "failed to label pull request");
        }
    }
}

/// The `rel="next"` target of a GitHub `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

fn decode_content(file: &ContentFile) -> Result<String, GitHubError> {
    let raw = file.content.as_deref().unwrap_or_default();
    if file.encoding.as_deref().is_some_and(|e| e != "base64") {
        return Ok(raw.to_string());
    }
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| GitHubError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GitHubError::Decode(e.to_string()))
}

fn status_of(pr: &PullRequest) -> ArtifactStatus {
    if pr.merged.unwrap_or(false) || pr.merged_at.is_some() {
        ArtifactStatus::Merged
    } else if pr.state == "closed" {
        ArtifactStatus::Closed
    } else {
        ArtifactStatus::Open
    }
}

fn inbound(issue: Issue) -> InboundRequest {
    InboundRequest {
        number: issue.number,
        title: issue.title,
        body: issue.body.unwrap_or_default(),
    }
}

#[async_trait]
impl ArtifactStatusSource for GitHubClient {
    async fn artifact_status(&self, artifact: &ArtifactRef) -> Result<ArtifactStatus, PublisherError> {
        let pr: PullRequest = self
            .json(self.http.get(self.personas_url(&format!("pulls/{}", artifact.number))))
            .await?;
        let status = status_of(&pr);
        tracing::debug!(pr = artifact.number, %status, "artifact status");
        Ok(status)
    }
}

#[async_trait]
impl RepositoryPublisher for GitHubClient {
    async fn list_open_requests(&self, kind: RequestKind) -> Result<Vec<InboundRequest>, PublisherError> {
        let label = match kind {
            RequestKind::Create => &self.config.create_label,
            RequestKind::Update => &self.config.update_label,
        };
        let request = self.http.get(self.issues_url("issues")).query(&[
            ("state", "open"),
            ("labels", label.as_str()),
            ("per_page", PAGE_SIZE),
        ]);
        let issues: Vec<Issue> = self.paginate(request).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(inbound)
            .collect())
    }

    async fn get_request(&self, number: u64) -> Result<Option<InboundRequest>, PublisherError> {
        match self
            .json::<Issue>(self.http.get(self.issues_url(&format!("issues/{number}"))))
            .await
        {
            Ok(issue) => Ok(Some(inbound(issue))),
            Err(GitHubError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, publication: &Publication) -> Result<ArtifactRef, PublisherError> {
        let base = self.default_branch().await?;
        self.create_branch(&publication.branch, &base).await?;
        self.commit_files(&publication.files, &publication.branch, &publication.commit_message)
            .await?;

        let pr: PullRequest = self
            .json(self.http.post(self.personas_url("pulls")).json(&json!({
                "title": publication.title,
                "body": publication.description,
                "head": publication.branch,
                "base": base,
            })))
            .await?;
        self.add_labels(pr.number, &publication.labels).await;

        tracing::info!(
            key = %publication.key,
            pr = pr.number,
            files = publication.files.len(),
            "pull request opened"
        );
        Ok(ArtifactRef {
            number: pr.number,
            url: pr.html_url,
            branch: pr.head.branch,
        })
    }

    async fn update_artifact(
        &self,
        artifact: &ArtifactRef,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<(), PublisherError> {
        self.commit_files(files, &artifact.branch, message).await?;
        tracing::info!(pr = artifact.number, files = files.len(), "pull request updated");
        Ok(())
    }

    async fn remove_files(
        &self,
        artifact: &ArtifactRef,
        paths: &[String],
        message: &str,
    ) -> Result<usize, PublisherError> {
        let mut removed = 0;
        for path in paths {
            if self.delete_file(path, &artifact.branch, message).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(pr = artifact.number, removed, "stale files removed from pull request");
        }
        Ok(removed)
    }

    async fn comment(&self, target: CommentTarget, text: &str) -> Result<(), PublisherError> {
        let url = match target {
            CommentTarget::Request(n) => self.issues_url(&format!("issues/{n}/comments")),
            CommentTarget::Artifact(n) => self.personas_url(&format!("issues/{n}/comments")),
        };
        self.send(self.http.post(url).json(&json!({ "body": text })))
            .await?;
        Ok(())
    }

    async fn list_open_artifacts(&self) -> Result<Vec<OpenArtifact>, PublisherError> {
        let request = self
            .http
            .get(self.personas_url("pulls"))
            .query(&[("state", "open"), ("per_page", PAGE_SIZE)]);
        let pulls: Vec<PullRequest> = self.paginate(request).await?;
        let prefix = format!("{}/", self.config.branch_prefix);
        Ok(pulls
            .into_iter()
            .filter(|pr| pr.head.branch.starts_with(&prefix))
            .map(|pr| OpenArtifact {
                artifact: ArtifactRef {
                    number: pr.number,
                    url: pr.html_url,
                    branch: pr.head.branch,
                },
                title: pr.title,
                body: pr.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_artifact_comments(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Vec<ArtifactComment>, PublisherError> {
        let request = self
            .http
            .get(self.personas_url(&format!("issues/{}/comments", artifact.number)))
            .query(&[("per_page", PAGE_SIZE)]);
        let comments: Vec<IssueComment> = self.paginate(request).await?;
        Ok(comments
            .into_iter()
            .map(|c| ArtifactComment {
                id: c.id,
                author: c.user.map(|u| u.login).unwrap_or_default(),
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn read_file(&self, path: &str, git_ref: Option<&str>) -> Result<Option<String>, PublisherError> {
        let mut request = self.http.get(self.personas_url(&format!("contents/{path}")));
        if let Some(git_ref) = git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        match self.json::<ContentFile>(request).await {
            Ok(file) => Ok(Some(decode_content(&file)?)),
            Err(GitHubError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<String>, PublisherError> {
        let request = self.http.get(self.personas_url(&format!("contents/{path}")));
        match self.json::<Vec<DirectoryEntry>>(request).await {
            Ok(entries) => Ok(entries.into_iter().map(|e| e.name).collect()),
            Err(GitHubError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
