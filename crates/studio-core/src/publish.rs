// ABOUTME: Capability traits for the repository that receives persona packages.
// ABOUTME: The GitHub client implements these; tests use in-memory fakes.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External state of a published artifact (a pull request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Open,
    Closed,
    Merged,
}

impl ArtifactStatus {
    /// Closed and merged artifacts no longer block a new publish.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Merged)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        })
    }
}

/// Locator of a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub number: u64,
    pub url: String,
    pub branch: String,
}

/// An inbound request issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
}

/// An open artifact that may receive feedback comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenArtifact {
    pub artifact: ArtifactRef,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactComment {
    pub id: u64,
    pub author: String,
    pub body: String,
}

/// Which inbound queue to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTarget {
    Request(u64),
    Artifact(u64),
}

/// Everything needed to open a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub key: String,
    pub branch: String,
    pub title: String,
    pub description: String,
    pub commit_message: String,
    pub files: BTreeMap<String, String>,
    pub labels: Vec<String>,
}

/// Failures reported by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublisherError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("repository rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Status lookups, the only repository capability the ledger needs.
#[async_trait]
pub trait ArtifactStatusSource: Send + Sync {
    async fn artifact_status(&self, artifact: &ArtifactRef) -> Result<ArtifactStatus, PublisherError>;
}

/// The repository receiving persona packages and hosting request issues.
#[async_trait]
pub trait RepositoryPublisher: ArtifactStatusSource {
    /// Open request issues of the given kind.
    async fn list_open_requests(&self, kind: RequestKind) -> Result<Vec<InboundRequest>, PublisherError>;

    /// Fetch one request issue by number.
    async fn get_request(&self, number: u64) -> Result<Option<InboundRequest>, PublisherError>;

    /// Create a branch, commit `files`, and open an artifact.
    async fn publish(&self, publication: &Publication) -> Result<ArtifactRef, PublisherError>;

    /// Commit `files` to an existing artifact's branch.
    async fn update_artifact(
        &self,
        artifact: &ArtifactRef,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<(), PublisherError>;

    /// Delete `paths` from an existing artifact's branch. Paths that are not
    /// there are ignored; returns how many were removed.
    async fn remove_files(
        &self,
        artifact: &ArtifactRef,
        paths: &[String],
        message: &str,
    ) -> Result<usize, PublisherError>;

    async fn comment(&self, target: CommentTarget, text: &str) -> Result<(), PublisherError>;

    /// Open artifacts created by the studio.
    async fn list_open_artifacts(&self) -> Result<Vec<OpenArtifact>, PublisherError>;

    async fn list_artifact_comments(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Vec<ArtifactComment>, PublisherError>;

    /// Read a file from the package repository. `git_ref` defaults to the
    /// default branch. Missing files are `Ok(None)`.
    async fn read_file(&self, path: &str, git_ref: Option<&str>) -> Result<Option<String>, PublisherError>;

    /// Names of the entries directly under `path` on the default branch.
    async fn list_directory(&self, path: &str) -> Result<Vec<String>, PublisherError>;
}
