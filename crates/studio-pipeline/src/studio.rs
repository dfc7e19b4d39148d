// ABOUTME: The assembled studio: publisher, providers, synthesizer, ledger, tracker, and archive.
// ABOUTME: Owns the shared aggregate -> synthesize -> ledger -> publish flow used by every entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use studio_agent::{Aggregator, PromptGenerator, Synthesizer};
use studio_core::layout::{
    self, USER_SUPPLIED_FILE, package_readme, raw_path, readme_path, synthesized_path,
};
use studio_core::template::TemplateName;
use studio_core::{
    AggregationResult, ArtifactRef, Fingerprint, Publication, RepositoryPublisher, Request,
    SynthesizedDocument, TemplateStore,
};
use studio_store::{DecisionReason, RawArchive, SqliteLedger, SqliteTracker};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Title prefix of a persona package PR; feedback is only read on these.
pub const PACKAGE_TITLE_PREFIX: &str = "Add persona package: ";

/// Where request issues live and how persona artifacts are named.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub issues_owner: String,
    pub issues_repo: String,
    pub branch_prefix: String,
    pub labels: Vec<String>,
}

impl PublishSettings {
    pub fn new(issues_owner: impl Into<String>, issues_repo: impl Into<String>) -> Self {
        Self {
            issues_owner: issues_owner.into(),
            issues_repo: issues_repo.into(),
            branch_prefix: "persona".to_string(),
            labels: vec![
                "persona".to_string(),
                "automated".to_string(),
                "structured".to_string(),
            ],
        }
    }

    /// "Created from issue: ..." or the batch marker.
    pub fn source_line(&self, request: &Request) -> String {
        match request.id.issue_number() {
            Some(n) => layout::issue_reference(&self.issues_owner, &self.issues_repo, n),
            None => "Created via batch processing".to_string(),
        }
    }
}

/// Result of a guarded publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(ArtifactRef),
    /// The ledger held the publish back; nothing was created.
    Skipped(DecisionReason),
}

pub struct Studio {
    pub publisher: Arc<dyn RepositoryPublisher>,
    pub aggregator: Aggregator,
    pub synthesizer: Synthesizer,
    pub prompts: PromptGenerator,
    pub ledger: SqliteLedger,
    pub tracker: SqliteTracker,
    pub archive: RawArchive,
    pub templates: TemplateStore,
    pub settings: PublishSettings,
}

impl Studio {
    /// Run every provider for `request`, keep all outcomes, and archive them.
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<AggregationResult, PipelineError> {
        let guide = self.templates.load(TemplateName::PersonaGuide);
        let prompt = request.generation_prompt(&guide);
        let result = self.aggregator.aggregate(cancel, &prompt).await?;

        if let Err(e) = self.archive.store(&request.ledger_key(), &result) {
            tracing::warn!(key = %request.ledger_key(), error = %e, "failed to archive raw outputs");
        }

        if result.success_count() == 0 {
            return Err(PipelineError::AggregationFailure {
                providers: result.len(),
            });
        }
        Ok(result)
    }

    /// The full create flow for one accepted request.
    pub async fn create_persona(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<PublishOutcome, PipelineError> {
        let key = request.ledger_key();
        let fingerprint = request.content_fingerprint();
        if let Some(reason) = self.ledger_hold(&key, &fingerprint).await? {
            return Ok(PublishOutcome::Skipped(reason));
        }
        tracing::info!(request = %request.id, key = %key, "generating persona");

        let result = self.generate(cancel, request).await?;
        let document = self
            .synthesizer
            .synthesize(cancel, &result, request.supplemental_text.as_deref())
            .await?;

        let publication = self.package_publication(request, &result, &document);
        self.publish_guarded(&key, &fingerprint, &publication).await
    }

    /// The reason the ledger would hold a publish of `fingerprint` under
    /// `key` right now, if any. Checked before generation so a held request
    /// costs one status query instead of a full provider round.
    pub async fn ledger_hold(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Option<DecisionReason>, PipelineError> {
        let decision = self
            .ledger
            .should_publish(key, fingerprint, self.publisher.as_ref())
            .await?;
        Ok((!decision.publish).then_some(decision.reason))
    }

    /// Consult the ledger, publish if allowed, and record the new artifact
    /// immediately after the publisher confirms it.
    pub async fn publish_guarded(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        publication: &Publication,
    ) -> Result<PublishOutcome, PipelineError> {
        if let Some(reason) = self.ledger_hold(key, fingerprint).await? {
            return Ok(PublishOutcome::Skipped(reason));
        }

        let artifact = self.publisher.publish(publication).await?;
        self.ledger.record(key, &artifact, fingerprint)?;
        Ok(PublishOutcome::Published(artifact))
    }

    /// Every file of a persona package: raw outputs, the optional
    /// user-supplied persona, the synthesized document, and a README.
    pub fn package_files(
        &self,
        request: &Request,
        result: &AggregationResult,
        document: &SynthesizedDocument,
    ) -> BTreeMap<String, String> {
        let dir = request.subject.directory_name();
        let mut files = BTreeMap::new();

        let mut sources = Vec::new();
        for outcome in result.successes() {
            files.insert(raw_path(&dir, &outcome.provider_id), outcome.text.clone());
            sources.push(outcome.provider_id.clone());
        }
        if let Some(user) = &request.supplemental_text {
            files.insert(raw_path(&dir, USER_SUPPLIED_FILE), user.clone());
        }
        files.insert(synthesized_path(&dir), document.text.clone());
        files.insert(
            readme_path(&dir),
            package_readme(&request.subject, &sources, request.supplemental_text.is_some()),
        );
        files
    }

    fn package_publication(
        &self,
        request: &Request,
        result: &AggregationResult,
        document: &SynthesizedDocument,
    ) -> Publication {
        let name = request.subject.primary();
        let dir = request.subject.directory_name();
        let providers: Vec<&str> = result
            .successes()
            .map(|o| o.provider_id.as_str())
            .collect();

        let mut description = format!(
            "This PR adds a persona package for: **{name}**\n\n\
             - Raw outputs from {} of {} providers: {}\n",
            result.success_count(),
            result.len(),
            providers.join(", ")
        );
        if request.supplemental_text.is_some() {
            description.push_str("- User-supplied persona included in synthesis\n");
        }
        if document.used_fallback {
            description.push_str("- Synthesis failed; `synthesized.md` is the longest single output\n");
        } else {
            description.push_str(&format!(
                "- `synthesized.md` merges {} sources\n",
                document.source_count
            ));
        }
        description.push_str(&format!(
            "\nFiles are under `{}/`.\n\n{}\n",
            layout::persona_dir(&dir),
            self.settings.source_line(request)
        ));

        Publication {
            key: request.ledger_key(),
            branch: layout::branch_name(
                &self.settings.branch_prefix,
                &request.subject,
                &request.id.branch_suffix(),
            ),
            title: format!("{PACKAGE_TITLE_PREFIX}{name}"),
            description,
            commit_message: format!("Add persona package: {name}"),
            files: self.package_files(request, result, document),
            labels: self.settings.labels.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::MemoryPublisher;
    use std::time::Duration;
    use studio_agent::ProviderClient;
    use studio_agent::testing::StubProvider;
    use studio_core::{ArtifactStatus, PersonaName, PublisherError, RequestId};
    use tempfile::TempDir;

    pub(crate) fn long_text(seed: &str, len: usize) -> String {
        seed.repeat(len / seed.len().max(1) + 1)[..len].to_string()
    }

    /// A studio wired to stub providers and an in-memory publisher.
    pub(crate) fn studio_with(
        dir: &TempDir,
        publisher: Arc<MemoryPublisher>,
        providers: Vec<Arc<dyn ProviderClient>>,
        synthesis: Arc<dyn ProviderClient>,
    ) -> Studio {
        let templates = TemplateStore::builtin();
        Studio {
            publisher,
            aggregator: Aggregator::new(providers).with_timeout(Duration::from_secs(5)),
            synthesizer: Synthesizer::new(synthesis.clone(), templates.clone()),
            prompts: PromptGenerator::new(synthesis, templates.clone()),
            ledger: SqliteLedger::open(&dir.path().join("ledger.db")).unwrap(),
            tracker: SqliteTracker::open(&dir.path().join("tracker.db")).unwrap(),
            archive: RawArchive::new(dir.path().join("raw")),
            templates,
            settings: PublishSettings::new("twin2ai", "studio"),
        }
    }

    pub(crate) fn default_providers() -> Vec<Arc<dyn ProviderClient>> {
        vec![
            Arc::new(StubProvider::new("claude", long_text("c", 120))),
            Arc::new(StubProvider::new("gemini", long_text("g", 340))),
            Arc::new(StubProvider::failing("grok", "timed out")),
            Arc::new(StubProvider::new("gpt", long_text("o", 210))),
        ]
    }

    fn marie(issue: u64) -> Request {
        Request::new(
            RequestId::Issue(issue),
            PersonaName::parse("Marie Curie").unwrap(),
            "Physicist and chemist.",
        )
    }

    #[tokio::test]
    async fn create_publishes_package_and_records_ledger() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "# Marie Curie\nMerged")),
        );

        let outcome = studio
            .create_persona(&CancellationToken::new(), &marie(12))
            .await
            .unwrap();

        let artifact = match outcome {
            PublishOutcome::Published(artifact) => artifact,
            other => panic!("expected a publish, got {other:?}"),
        };
        let publication = &publisher.publications()[0];
        assert_eq!(publication.branch, "persona/marie-curie-12");
        assert!(publication.description.contains("Created from issue: twin2ai/studio#12"));
        assert!(publication.files.contains_key("personas/marie_curie/raw/claude.md"));
        assert!(!publication.files.contains_key("personas/marie_curie/raw/grok.md"));
        assert_eq!(
            publication.files["personas/marie_curie/synthesized.md"],
            "# Marie Curie\nMerged"
        );

        let entry = studio.ledger.get("marie_curie").unwrap().unwrap();
        assert_eq!(entry.artifact, artifact);
        assert_eq!(std::fs::read_dir(dir.path().join("raw").join("marie_curie")).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn second_identical_request_is_held_while_first_is_open() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let cancel = CancellationToken::new();

        studio.create_persona(&cancel, &marie(12)).await.unwrap();
        let second = studio.create_persona(&cancel, &marie(13)).await.unwrap();

        assert_eq!(
            second,
            PublishOutcome::Skipped(DecisionReason::DuplicateContentPending)
        );
        assert_eq!(publisher.publications().len(), 1);

        publisher.set_status(100, ArtifactStatus::Merged);
        let third = studio.create_persona(&cancel, &marie(14)).await.unwrap();
        assert!(matches!(third, PublishOutcome::Published(_)));
    }

    #[tokio::test]
    async fn held_request_makes_no_provider_calls() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let claude = Arc::new(StubProvider::new("claude", long_text("c", 120)));
        let providers: Vec<Arc<dyn ProviderClient>> = vec![claude.clone()];
        let studio = studio_with(
            &dir,
            publisher.clone(),
            providers,
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let cancel = CancellationToken::new();

        studio.create_persona(&cancel, &marie(12)).await.unwrap();
        assert_eq!(claude.call_count(), 1);

        let held = studio.create_persona(&cancel, &marie(13)).await.unwrap();
        assert_eq!(
            held,
            PublishOutcome::Skipped(DecisionReason::DuplicateContentPending)
        );
        assert_eq!(claude.call_count(), 1);
    }

    #[tokio::test]
    async fn total_provider_failure_publishes_nothing() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            vec![
                Arc::new(StubProvider::failing("claude", "down")),
                Arc::new(StubProvider::failing("gpt", "down")),
            ],
            Arc::new(StubProvider::new("gemini", "unused")),
        );

        let err = studio
            .create_persona(&CancellationToken::new(), &marie(12))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::AggregationFailure { providers: 2 }));
        assert!(publisher.publications().is_empty());
        assert!(studio.ledger.get("marie_curie").unwrap().is_none());
    }

    #[tokio::test]
    async fn publisher_rejection_leaves_ledger_untouched() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.fail_publish(Some(PublisherError::Rejected {
            status: 422,
            message: "Validation Failed".to_string(),
        }));
        let studio = studio_with(
            &dir,
            publisher.clone(),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );

        let err = studio
            .create_persona(&CancellationToken::new(), &marie(12))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Publisher(_)));
        assert!(studio.ledger.get("marie_curie").unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_round_never_records() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let studio = studio_with(
            &dir,
            publisher.clone(),
            vec![Arc::new(
                StubProvider::new("claude", "late").with_delay(Duration::from_secs(30)),
            )],
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = studio.create_persona(&cancel, &marie(12)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(publisher.publications().is_empty());
        assert!(studio.ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn package_files_include_user_supplied_persona() {
        let dir = TempDir::new().unwrap();
        let studio = studio_with(
            &dir,
            Arc::new(MemoryPublisher::new()),
            default_providers(),
            Arc::new(StubProvider::new("gemini", "Merged")),
        );
        let request = marie(1).with_supplemental(Some("My own take".to_string()));
        let result = AggregationResult::new(vec![studio_core::ProviderOutcome::success("gpt", "x")]);
        let document = SynthesizedDocument {
            text: "Merged".to_string(),
            source_count: 2,
            used_fallback: false,
        };

        let files = studio.package_files(&request, &result, &document);
        assert_eq!(files["personas/marie_curie/raw/user_supplied.md"], "My own take");
        assert!(files["personas/marie_curie/README.md"].contains("raw/user_supplied.md"));
    }
}
