// ABOUTME: Feedback-driven regeneration of an open persona pull request.
// ABOUTME: Reviewer comments seed a revision request whose result is committed to the existing branch.

use studio_core::feedback::{comment_key, is_bot_comment, is_feedback, sign};
use studio_core::layout::{parse_issue_reference, raw_path, synthesized_path};
use studio_core::{
    ArtifactComment, CommentTarget, OpenArtifact, PersonaIssue, PersonaName, Request, RequestId,
    Revision,
};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::studio::Studio;

impl Studio {
    /// Reviewer comments on `open` that ask for changes and were not handled yet.
    pub async fn pending_feedback(
        &self,
        open: &OpenArtifact,
    ) -> Result<Vec<ArtifactComment>, PipelineError> {
        let comments = self
            .publisher
            .list_artifact_comments(&open.artifact)
            .await?;

        let mut pending = Vec::new();
        for comment in comments {
            if is_bot_comment(&comment.body) || !is_feedback(&comment.body) {
                continue;
            }
            if self
                .tracker
                .is_comment_processed(&comment_key(open.artifact.number, comment.id))?
            {
                continue;
            }
            pending.push(comment);
        }
        Ok(pending)
    }

    pub fn mark_feedback_processed(
        &self,
        open: &OpenArtifact,
        comments: &[ArtifactComment],
    ) -> Result<(), PipelineError> {
        for comment in comments {
            self.tracker
                .mark_comment_processed(&comment_key(open.artifact.number, comment.id))?;
        }
        Ok(())
    }

    /// Regenerate the persona on `open` so it addresses `comments`. The new
    /// package replaces the files on the artifact's branch; the ledger is
    /// left alone because no new artifact is created.
    pub async fn revise_artifact(
        &self,
        cancel: &CancellationToken,
        open: &OpenArtifact,
        comments: &[ArtifactComment],
    ) -> Result<(), PipelineError> {
        let number = parse_issue_reference(&open.body).ok_or_else(|| {
            PipelineError::Parse(format!(
                "pull request #{} does not reference its request issue",
                open.artifact.number
            ))
        })?;
        let inbound = self
            .publisher
            .get_request(number)
            .await?
            .ok_or_else(|| PipelineError::Parse(format!("request issue #{number} not found")))?;
        let issue = PersonaIssue::parse(&inbound.title, &inbound.body)
            .map_err(|e| PipelineError::Parse(e.to_string()))?;
        let name = PersonaName::parse(&issue.persona_name)
            .map_err(|e| PipelineError::Parse(e.to_string()))?;

        let path = synthesized_path(&name.directory_name());
        let prior_text = self
            .publisher
            .read_file(&path, Some(&open.artifact.branch))
            .await?
            .ok_or_else(|| PipelineError::MissingPersona(name.primary().to_string()))?;

        let feedback: Vec<String> = comments.iter().map(|c| c.body.trim().to_string()).collect();
        let request = Request::new(RequestId::Issue(number), name, issue.format_for_prompt())
            .with_supplemental(issue.user_persona)
            .with_revision(Revision {
                prior_text,
                feedback: feedback.clone(),
            });

        tracing::info!(
            pr = open.artifact.number,
            issue = number,
            comments = comments.len(),
            "regenerating persona from feedback"
        );
        let result = self.generate(cancel, &request).await?;
        let document = self
            .synthesizer
            .synthesize_revision(
                cancel,
                &result,
                request.supplemental_text.as_deref(),
                &feedback,
            )
            .await?;

        let message = format!("Regenerate persona from feedback: {}", request.subject.primary());
        let files = self.package_files(&request, &result, &document);
        self.publisher
            .update_artifact(&open.artifact, &files, &message)
            .await?;

        // Raw files of providers that failed this round describe the old
        // persona, not the one now in synthesized.md.
        let dir = request.subject.directory_name();
        let stale: Vec<String> = result
            .failures()
            .map(|o| raw_path(&dir, &o.provider_id))
            .collect();
        if !stale.is_empty() {
            self.publisher
                .remove_files(&open.artifact, &stale, &message)
                .await?;
        }

        let quoted: String = feedback
            .iter()
            .map(|f| format!("> {}\n\n", f.replace('\n', "\n> ")))
            .collect();
        let reply = sign(&format!(
            "**Feedback addressed**\n\nThe persona was regenerated with this feedback in mind:\n\n{quoted}\
             {} sources were merged into the new `synthesized.md`.",
            document.source_count
        ));
        if let Err(e) = self
            .publisher
            .comment(CommentTarget::Artifact(open.artifact.number), &reply)
            .await
        {
            tracing::warn!(pr = open.artifact.number, error = %e, "failed to reply to feedback");
        }

        self.mark_feedback_processed(open, comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::tests::{default_providers, studio_with};
    use crate::testing::MemoryPublisher;
    use std::sync::Arc;
    use studio_agent::testing::StubProvider;
    use studio_core::feedback::BOT_MARKER;
    use studio_core::{ArtifactRef, Publication, RepositoryPublisher, RequestKind};
    use tempfile::TempDir;

    /// An open PR created from request issue #12.
    fn open_pr(publisher: &MemoryPublisher) -> OpenArtifact {
        publisher.add_request(RequestKind::Create, 12, "Create Persona: Marie Curie", "Physicist");
        OpenArtifact {
            artifact: ArtifactRef {
                number: 100,
                url: String::new(),
                branch: "persona/marie-curie-12".to_string(),
            },
            title: "Add persona package: Marie Curie".to_string(),
            body: "Created from issue: twin2ai/studio#12".to_string(),
        }
    }

    #[tokio::test]
    async fn pending_feedback_skips_bot_and_processed_comments() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let open = open_pr(&publisher);
        publisher.add_artifact_comment(100, 1, "reviewer", "This is too short, please expand");
        publisher.add_artifact_comment(100, 2, "reviewer", "Looks great!");
        publisher.add_artifact_comment(100, 3, "bot", &format!("Please regenerate {BOT_MARKER}"));
        publisher.add_artifact_comment(100, 4, "reviewer", "Missing her Nobel prizes");
        studio.tracker.mark_comment_processed("100-4").unwrap();

        let pending = studio.pending_feedback(&open).await.unwrap();
        let ids: Vec<u64> = pending.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn revision_updates_branch_and_marks_comments() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let claude = Arc::new(StubProvider::new("claude", "Revised by claude"));
        let studio = studio_with(
            &dir,
            publisher.clone(),
            vec![claude.clone(), Arc::new(StubProvider::new("gpt", "Revised by gpt"))],
            Arc::new(StubProvider::new("gemini", "Revised merged")),
        );
        // The PR branch carries the previous synthesized document.
        let open = open_pr(&publisher);
        publisher
            .publish(&Publication {
                key: "marie_curie".to_string(),
                branch: open.artifact.branch.clone(),
                title: open.title.clone(),
                description: open.body.clone(),
                commit_message: "seed".to_string(),
                files: [(
                    "personas/marie_curie/synthesized.md".to_string(),
                    "Original Marie".to_string(),
                )]
                .into(),
                labels: vec![],
            })
            .await
            .unwrap();
        publisher.add_artifact_comment(100, 7, "reviewer", "Needs more on radium");

        let pending = studio.pending_feedback(&open).await.unwrap();
        studio
            .revise_artifact(&CancellationToken::new(), &open, &pending)
            .await
            .unwrap();

        let prompt = claude.last_prompt().unwrap();
        assert!(prompt.contains("1. Needs more on radium"));
        assert!(prompt.contains("Original Marie"));
        assert_eq!(
            publisher
                .branch_file("persona/marie-curie-12", "personas/marie_curie/synthesized.md")
                .as_deref(),
            Some("Revised merged")
        );
        assert_eq!(publisher.updates().len(), 1);
        assert!(studio.tracker.is_comment_processed("100-7").unwrap());
        assert!(studio.ledger.entries().unwrap().is_empty());

        let (target, reply) = publisher.comments().pop().unwrap();
        assert_eq!(target, CommentTarget::Artifact(100));
        assert!(reply.contains(BOT_MARKER));
        assert!(studio.pending_feedback(&open).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revision_drops_raw_files_of_providers_that_failed() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            vec![
                Arc::new(StubProvider::new("claude", "Revised by claude")),
                Arc::new(StubProvider::failing("grok", "timed out")),
            ],
            Arc::new(StubProvider::new("gemini", "Revised merged")),
        );
        let open = open_pr(&publisher);
        publisher
            .publish(&Publication {
                key: "marie_curie".to_string(),
                branch: open.artifact.branch.clone(),
                title: open.title.clone(),
                description: open.body.clone(),
                commit_message: "seed".to_string(),
                files: [
                    ("personas/marie_curie/synthesized.md", "Original Marie"),
                    ("personas/marie_curie/raw/claude.md", "Original claude"),
                    ("personas/marie_curie/raw/grok.md", "Original grok"),
                ]
                .into_iter()
                .map(|(path, text)| (path.to_string(), text.to_string()))
                .collect(),
                labels: vec![],
            })
            .await
            .unwrap();
        publisher.add_artifact_comment(100, 8, "reviewer", "Please add her Nobel prizes");

        let pending = studio.pending_feedback(&open).await.unwrap();
        studio
            .revise_artifact(&CancellationToken::new(), &open, &pending)
            .await
            .unwrap();

        let branch = "persona/marie-curie-12";
        assert_eq!(
            publisher.branch_file(branch, "personas/marie_curie/raw/claude.md").as_deref(),
            Some("Revised by claude")
        );
        assert_eq!(publisher.branch_file(branch, "personas/marie_curie/raw/grok.md"), None);
        assert_eq!(
            publisher.branch_file(branch, "personas/marie_curie/synthesized.md").as_deref(),
            Some("Revised merged")
        );
    }

    #[tokio::test]
    async fn artifact_without_issue_reference_is_a_user_error() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let open = OpenArtifact {
            artifact: ArtifactRef {
                number: 5,
                url: String::new(),
                branch: "persona/someone-batch".to_string(),
            },
            title: "Add persona package: Someone".to_string(),
            body: "Created via batch processing".to_string(),
        };

        let err = studio
            .revise_artifact(&CancellationToken::new(), &open, &[])
            .await
            .unwrap_err();
        assert!(err.is_user_error());
    }
}
