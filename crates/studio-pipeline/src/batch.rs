// ABOUTME: Batch mode: create persona packages for a list of names read from a file.
// ABOUTME: Names already processed or already published are skipped unless forced.

use std::time::Duration;

use studio_core::layout::PERSONAS_ROOT;
use studio_core::{PersonaIssue, PersonaName, Request, RequestId};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::studio::{PublishOutcome, Studio};

/// Pause between two names so provider rate limits are respected.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Regenerate names that were processed or published before.
    pub force: bool,
    pub delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            force: false,
            delay: DEFAULT_BATCH_DELAY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub published: usize,
    /// Held back by the ledger.
    pub held: usize,
    /// Already processed or already present in the personas repository.
    pub existing: usize,
    pub invalid: usize,
    pub failed: usize,
}

/// One name per line; blank lines and `#` comments are ignored.
pub fn parse_batch_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// True when one of the name's folders is already in the personas repository.
fn already_published(name: &PersonaName, published: &[String]) -> bool {
    name.directory_candidates()
        .iter()
        .any(|dir| published.contains(dir))
}

/// Tracker key for a batch name; spelling case does not matter.
fn batch_key(name: &PersonaName) -> String {
    name.key().to_lowercase()
}

impl Studio {
    pub async fn run_batch(
        &self,
        cancel: &CancellationToken,
        names: &[String],
        options: &BatchOptions,
    ) -> Result<BatchSummary, PipelineError> {
        let published = self.publisher.list_directory(PERSONAS_ROOT).await?;
        let mut summary = BatchSummary::default();

        tracing::info!(names = names.len(), force = options.force, "starting batch");
        for (index, raw) in names.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let name = match PersonaName::parse(raw) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(name = %raw, error = %e, "skipping invalid batch name");
                    summary.invalid += 1;
                    continue;
                }
            };

            if !options.force
                && (self.tracker.is_batch_processed(&batch_key(&name))?
                    || already_published(&name, &published))
            {
                tracing::info!(name = %name.primary(), "persona already exists, skipping");
                summary.existing += 1;
                continue;
            }

            if index > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(options.delay) => {}
                }
            }

            let body = PersonaIssue {
                persona_name: raw.clone(),
                detailed_content: String::new(),
                user_persona: None,
            }
            .format_for_prompt();
            let request = Request::new(RequestId::new_batch(), name, body);

            match self.create_persona(cancel, &request).await {
                Ok(PublishOutcome::Published(artifact)) => {
                    tracing::info!(name = %request.subject.primary(), pr = artifact.number, "batch persona published");
                    self.tracker.mark_batch_processed(&batch_key(&request.subject))?;
                    summary.published += 1;
                }
                Ok(PublishOutcome::Skipped(reason)) => {
                    tracing::info!(name = %request.subject.primary(), reason = %reason, "batch persona held by ledger");
                    summary.held += 1;
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    tracing::warn!(name = %request.subject.primary(), error = %e, "batch persona failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(?summary, "batch finished");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::tests::{default_providers, studio_with};
    use crate::testing::MemoryPublisher;
    use std::sync::Arc;
    use studio_agent::testing::StubProvider;
    use tempfile::TempDir;

    fn fast() -> BatchOptions {
        BatchOptions {
            force: false,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn batch_file_ignores_comments_and_blanks() {
        let names = parse_batch_file("# famous scientists\nMarie Curie\n\n  Ada Lovelace  \n#skip\n");
        assert_eq!(names, vec!["Marie Curie", "Ada Lovelace"]);
    }

    #[tokio::test]
    async fn batch_publishes_new_names_and_skips_existing() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.put_file("personas/ada_lovelace/synthesized.md", "Ada");
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let names = parse_batch_file("Marie Curie\nAda Lovelace\n \nX\n");

        let summary = studio
            .run_batch(&CancellationToken::new(), &names, &fast())
            .await
            .unwrap();

        assert_eq!(summary.published, 1);
        assert_eq!(summary.existing, 1);
        assert_eq!(summary.invalid, 1);
        let publication = &publisher.publications()[0];
        assert!(publication.branch.starts_with("persona/marie-curie-batch-"));
        assert!(publication.description.contains("Created via batch processing"));
        assert!(studio.tracker.is_batch_processed("marie curie").unwrap());
    }

    #[tokio::test]
    async fn processed_names_are_skipped_unless_forced() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        studio.tracker.mark_batch_processed("marie curie").unwrap();
        let names = vec!["Marie Curie".to_string()];

        let skipped = studio
            .run_batch(&CancellationToken::new(), &names, &fast())
            .await
            .unwrap();
        assert_eq!(skipped.existing, 1);
        assert!(publisher.publications().is_empty());

        let forced = BatchOptions { force: true, ..fast() };
        let summary = studio
            .run_batch(&CancellationToken::new(), &names, &forced)
            .await
            .unwrap();
        assert_eq!(summary.published, 1);
    }

    #[tokio::test]
    async fn cancelled_batch_stops() {
        let dir = TempDir::new().unwrap();
        let studio = studio_with(
            &dir,
            Arc::new(MemoryPublisher::new()),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = studio
            .run_batch(&cancel, &["Marie Curie".to_string()], &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
