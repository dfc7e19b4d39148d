// ABOUTME: End-to-end tests driving the polling orchestrator against stub providers.
// ABOUTME: Covers create, dedup, release after merge, feedback revision, update, and derivative prompts.

use std::sync::Arc;
use std::time::Duration;

use studio_agent::testing::StubProvider;
use studio_agent::{Aggregator, ProviderClient, PromptGenerator, Synthesizer};
use studio_core::{ArtifactStatus, CommentTarget, PersonaName, PromptKind, RequestKind, TemplateStore};
use studio_pipeline::testing::MemoryPublisher;
use studio_pipeline::{Orchestrator, PublishOutcome, PublishSettings, Studio};
use studio_store::{DecisionReason, RawArchive, SqliteLedger, SqliteTracker};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn text(seed: &str, len: usize) -> String {
    seed.repeat(len / seed.len() + 1)[..len].to_string()
}

fn build_studio(
    dir: &TempDir,
    publisher: Arc<MemoryPublisher>,
    synthesis: Arc<dyn ProviderClient>,
) -> Studio {
    // Provider 3 answers too late and is cut off by the aggregator timeout.
    let providers: Vec<Arc<dyn ProviderClient>> = vec![
        Arc::new(StubProvider::new("claude", text("c", 120))),
        Arc::new(StubProvider::new("gemini", text("g", 340))),
        Arc::new(StubProvider::new("grok", "late").with_delay(Duration::from_secs(30))),
        Arc::new(StubProvider::new("gpt", text("o", 210))),
    ];
    let templates = TemplateStore::builtin();

    Studio {
        publisher,
        aggregator: Aggregator::new(providers).with_timeout(Duration::from_millis(200)),
        synthesizer: Synthesizer::new(synthesis.clone(), templates.clone()),
        prompts: PromptGenerator::new(synthesis, templates.clone()),
        ledger: SqliteLedger::open(&dir.path().join("ledger.db")).unwrap(),
        tracker: SqliteTracker::open(&dir.path().join("tracker.db")).unwrap(),
        archive: RawArchive::new(dir.path().join("raw")),
        templates,
        settings: PublishSettings::new("twin2ai", "persona-requests"),
    }
}

#[tokio::test]
async fn create_dedup_and_release_lifecycle() {
    // 1. Synthesis is down, so the longest raw output is published.
    let dir = TempDir::new().unwrap();
    let publisher = Arc::new(MemoryPublisher::new());
    publisher.add_request(RequestKind::Create, 12, "Create Persona: Marie Curie", "Physicist");
    let orchestrator = Orchestrator::new(
        build_studio(
            &dir,
            publisher.clone(),
            Arc::new(StubProvider::failing("gemini", "overloaded")),
        ),
        Duration::from_secs(60),
    );
    let cancel = CancellationToken::new();

    let first = orchestrator.tick(&cancel).await.unwrap();
    assert_eq!(first.published, 1);

    let publication = &publisher.publications()[0];
    assert_eq!(publication.branch, "persona/marie-curie-12");
    assert_eq!(
        publication.files["personas/marie_curie/synthesized.md"],
        text("g", 340)
    );
    assert!(!publication.files.contains_key("personas/marie_curie/raw/grok.md"));
    assert!(publication.description.contains("3 of 4 providers"));
    assert!(publication.description.contains("longest single output"));
    assert!(
        publication
            .description
            .contains("Created from issue: twin2ai/persona-requests#12")
    );

    // 2. The next poll does not touch the handled request again.
    let second = orchestrator.tick(&cancel).await.unwrap();
    assert_eq!(second.published, 0);
    assert_eq!(publisher.publications().len(), 1);

    // 3. An identical request while the PR is open is held, not dropped.
    publisher.add_request(RequestKind::Create, 13, "Create Persona: Marie Curie", "Physicist");
    let third = orchestrator.tick(&cancel).await.unwrap();
    assert_eq!(third.deferred, 1);
    assert_eq!(publisher.publications().len(), 1);

    // 4. Once merged, the held request publishes the same content again.
    publisher.set_status(100, ArtifactStatus::Merged);
    let fourth = orchestrator.tick(&cancel).await.unwrap();
    assert_eq!(fourth.published, 1);
    assert_eq!(publisher.publications().len(), 2);
    assert_eq!(publisher.publications()[1].branch, "persona/marie-curie-13");

    let entry = orchestrator
        .studio()
        .ledger
        .get("marie_curie")
        .unwrap()
        .unwrap();
    assert_eq!(entry.artifact.number, 101);

    // Every round archived all four outcomes locally.
    let archived = std::fs::read_dir(dir.path().join("raw").join("marie_curie"))
        .unwrap()
        .count();
    assert!(archived >= 4);
}

#[tokio::test]
async fn feedback_update_and_prompts() {
    let dir = TempDir::new().unwrap();
    let publisher = Arc::new(MemoryPublisher::new());
    let synthesis = Arc::new(StubProvider::new("gemini", text("Merged persona. ", 400)));
    let orchestrator = Orchestrator::new(
        build_studio(&dir, publisher.clone(), synthesis.clone()),
        Duration::from_secs(60),
    );
    let cancel = CancellationToken::new();

    // 1. Create, then review with a request for changes.
    publisher.add_request(
        RequestKind::Create,
        21,
        "Create Persona: Ada Lovelace",
        "<<<\n**Field:** mathematics\n>>>",
    );
    orchestrator.tick(&cancel).await.unwrap();
    publisher.add_artifact_comment(100, 5, "reviewer", "The section on Babbage is incomplete");
    publisher.add_artifact_comment(100, 6, "reviewer", "Nice work");

    let revised = orchestrator.tick(&cancel).await.unwrap();
    assert_eq!(revised.revised, 1);
    let (number, files) = publisher.updates().pop().unwrap();
    assert_eq!(number, 100);
    assert!(files.contains_key("personas/ada_lovelace/synthesized.md"));
    assert!(
        synthesis
            .last_prompt()
            .unwrap()
            .contains("The section on Babbage is incomplete")
    );
    assert!(
        publisher
            .comments()
            .iter()
            .any(|(target, _)| *target == CommentTarget::Artifact(100))
    );

    // 2. After merge, an update request merges new material into the published persona.
    publisher.set_status(100, ArtifactStatus::Merged);
    publisher.put_file("personas/ada_lovelace/synthesized.md", "Ada as merged");
    publisher.add_request(
        RequestKind::Update,
        22,
        "Update Persona: Ada Lovelace",
        "[[[\nAda also wrote poetry.\n]]]",
    );
    let updated = orchestrator.tick(&cancel).await.unwrap();
    assert_eq!(updated.published, 1);
    let update = publisher.publications().pop().unwrap();
    assert_eq!(update.title, "Update persona: Ada Lovelace");
    assert_eq!(
        update.files["personas/ada_lovelace/raw/user_update.md"],
        "Ada also wrote poetry."
    );

    // 3. Derivative prompts are generated from the published persona, once.
    let studio = orchestrator.studio();
    let name = PersonaName::parse("Ada Lovelace").unwrap();
    let kinds = [PromptKind::Discord, PromptKind::Alternative];
    let outcome = studio.publish_prompts(&cancel, &name, &kinds).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Published(_)));
    let repeat = studio.publish_prompts(&cancel, &name, &kinds).await.unwrap();
    assert_eq!(
        repeat,
        PublishOutcome::Skipped(DecisionReason::DuplicateContentPending)
    );
}
