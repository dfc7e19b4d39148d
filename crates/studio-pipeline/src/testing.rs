// ABOUTME: In-memory RepositoryPublisher for pipeline and end-to-end tests.
// ABOUTME: Records publications, updates, and comments; status and failures are scriptable.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use studio_core::{
    ArtifactComment, ArtifactRef, ArtifactStatus, ArtifactStatusSource, CommentTarget,
    InboundRequest, OpenArtifact, Publication, PublisherError, RepositoryPublisher, RequestKind,
};

struct PublishedArtifact {
    artifact: ArtifactRef,
    publication: Publication,
    status: ArtifactStatus,
}

#[derive(Default)]
struct State {
    create_requests: Vec<InboundRequest>,
    update_requests: Vec<InboundRequest>,
    files: BTreeMap<String, String>,
    branch_files: BTreeMap<(String, String), String>,
    artifacts: Vec<PublishedArtifact>,
    artifact_comments: BTreeMap<u64, Vec<ArtifactComment>>,
    comments: Vec<(CommentTarget, String)>,
    updates: Vec<(u64, BTreeMap<String, String>)>,
    publish_failure: Option<PublisherError>,
    status_failure: Option<PublisherError>,
}

/// A repository that lives in memory. Artifact numbers start at 100.
#[derive(Default)]
pub struct MemoryPublisher {
    state: Mutex<State>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_request(&self, kind: RequestKind, number: u64, title: &str, body: &str) {
        let request = InboundRequest {
            number,
            title: title.to_string(),
            body: body.to_string(),
        };
        let mut state = self.state();
        match kind {
            RequestKind::Create => state.create_requests.push(request),
            RequestKind::Update => state.update_requests.push(request),
        }
    }

    /// Place a file on the default branch.
    pub fn put_file(&self, path: &str, content: &str) {
        self.state()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn set_status(&self, number: u64, status: ArtifactStatus) {
        if let Some(entry) = self
            .state()
            .artifacts
            .iter_mut()
            .find(|a| a.artifact.number == number)
        {
            entry.status = status;
        }
    }

    pub fn add_artifact_comment(&self, number: u64, id: u64, author: &str, body: &str) {
        self.state()
            .artifact_comments
            .entry(number)
            .or_default()
            .push(ArtifactComment {
                id,
                author: author.to_string(),
                body: body.to_string(),
            });
    }

    /// Make every subsequent publish fail with `error`; `None` clears it.
    pub fn fail_publish(&self, error: Option<PublisherError>) {
        self.state().publish_failure = error;
    }

    /// Make every subsequent status query fail with `error`; `None` clears it.
    pub fn fail_status(&self, error: Option<PublisherError>) {
        self.state().status_failure = error;
    }

    pub fn publications(&self) -> Vec<Publication> {
        self.state()
            .artifacts
            .iter()
            .map(|a| a.publication.clone())
            .collect()
    }

    pub fn artifacts(&self) -> Vec<ArtifactRef> {
        self.state()
            .artifacts
            .iter()
            .map(|a| a.artifact.clone())
            .collect()
    }

    pub fn comments(&self) -> Vec<(CommentTarget, String)> {
        self.state().comments.clone()
    }

    pub fn updates(&self) -> Vec<(u64, BTreeMap<String, String>)> {
        self.state().updates.clone()
    }

    /// Read a file as committed to `branch`.
    pub fn branch_file(&self, branch: &str, path: &str) -> Option<String> {
        self.state()
            .branch_files
            .get(&(branch.to_string(), path.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ArtifactStatusSource for MemoryPublisher {
    async fn artifact_status(&self, artifact: &ArtifactRef) -> Result<ArtifactStatus, PublisherError> {
        let state = self.state();
        if let Some(error) = &state.status_failure {
            return Err(error.clone());
        }
        state
            .artifacts
            .iter()
            .find(|a| a.artifact.number == artifact.number)
            .map(|a| a.status)
            .ok_or_else(|| PublisherError::NotFound(format!("pull request {}", artifact.number)))
    }
}

#[async_trait]
impl RepositoryPublisher for MemoryPublisher {
    async fn list_open_requests(&self, kind: RequestKind) -> Result<Vec<InboundRequest>, PublisherError> {
        let state = self.state();
        Ok(match kind {
            RequestKind::Create => state.create_requests.clone(),
            RequestKind::Update => state.update_requests.clone(),
        })
    }

    async fn get_request(&self, number: u64) -> Result<Option<InboundRequest>, PublisherError> {
        let state = self.state();
        Ok(state
            .create_requests
            .iter()
            .chain(state.update_requests.iter())
            .find(|r| r.number == number)
            .cloned())
    }

    async fn publish(&self, publication: &Publication) -> Result<ArtifactRef, PublisherError> {
        let mut state = self.state();
        if let Some(error) = &state.publish_failure {
            return Err(error.clone());
        }

        let number = 100 + state.artifacts.len() as u64;
        let artifact = ArtifactRef {
            number,
            url: format!("https://github.com/twin2ai/personas/pull/{number}"),
            branch: publication.branch.clone(),
        };
        for (path, content) in &publication.files {
            state
                .branch_files
                .insert((publication.branch.clone(), path.clone()), content.clone());
        }
        state.artifacts.push(PublishedArtifact {
            artifact: artifact.clone(),
            publication: publication.clone(),
            status: ArtifactStatus::Open,
        });
        Ok(artifact)
    }

    async fn update_artifact(
        &self,
        artifact: &ArtifactRef,
        files: &BTreeMap<String, String>,
        _message: &str,
    ) -> Result<(), PublisherError> {
        let mut state = self.state();
        if let Some(error) = &state.publish_failure {
            return Err(error.clone());
        }
        for (path, content) in files {
            state
                .branch_files
                .insert((artifact.branch.clone(), path.clone()), content.clone());
        }
        state.updates.push((artifact.number, files.clone()));
        Ok(())
    }

    async fn remove_files(
        &self,
        artifact: &ArtifactRef,
        paths: &[String],
        _message: &str,
    ) -> Result<usize, PublisherError> {
        let mut state = self.state();
        let removed = paths
            .iter()
            .filter(|path| {
                state
                    .branch_files
                    .remove(&(artifact.branch.clone(), (*path).clone()))
                    .is_some()
            })
            .count();
        Ok(removed)
    }

    async fn comment(&self, target: CommentTarget, text: &str) -> Result<(), PublisherError> {
        self.state().comments.push((target, text.to_string()));
        Ok(())
    }

    async fn list_open_artifacts(&self) -> Result<Vec<OpenArtifact>, PublisherError> {
        Ok(self
            .state()
            .artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::Open)
            .map(|a| OpenArtifact {
                artifact: a.artifact.clone(),
                title: a.publication.title.clone(),
                body: a.publication.description.clone(),
            })
            .collect())
    }

    async fn list_artifact_comments(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Vec<ArtifactComment>, PublisherError> {
        Ok(self
            .state()
            .artifact_comments
            .get(&artifact.number)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_file(&self, path: &str, git_ref: Option<&str>) -> Result<Option<String>, PublisherError> {
        let state = self.state();
        if let Some(branch) = git_ref
            && let Some(content) = state.branch_files.get(&(branch.to_string(), path.to_string()))
        {
            return Ok(Some(content.clone()));
        }
        Ok(state.files.get(path).cloned())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<String>, PublisherError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let names: BTreeSet<String> = self
            .state()
            .files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }
}
