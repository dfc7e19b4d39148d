// ABOUTME: Publication of derivative prompts generated from published synthesized personas.
// ABOUTME: One-shot per persona, or a scan of every persona folder driven by README markers and content changes.

use std::collections::BTreeMap;
use std::time::Duration;

use studio_agent::PromptError;
use studio_core::layout::{
    self, PERSONAS_ROOT, prompt_path, prompts_dir, readme_path, readme_prompt_triggers,
    strip_prompt_triggers, synthesized_path,
};
use studio_core::name::display_from_directory;
use studio_core::{Fingerprint, PersonaName, PromptKind, Publication};
use studio_store::LedgerEntry;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::studio::{PublishOutcome, Studio};

/// Why a persona folder needs a prompt round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptNeed {
    /// No `prompts/` folder on the default branch yet.
    Missing,
    /// `synthesized.md` differs from the text the last prompts were built from.
    SynthesizedChanged,
    /// The README asks for these kinds.
    Triggered(Vec<PromptKind>),
    Forced,
}

impl PromptNeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::SynthesizedChanged => "synthesized_changed",
            Self::Triggered(_) => "readme_trigger",
            Self::Forced => "forced",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptScanOptions {
    /// Kinds generated for missing, changed, or forced folders. README
    /// markers pick their own kinds.
    pub kinds: Vec<PromptKind>,
    /// Regenerate even where prompts look current.
    pub force: bool,
}

impl Default for PromptScanOptions {
    fn default() -> Self {
        Self {
            kinds: PromptKind::ALL.to_vec(),
            force: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptScanSummary {
    pub published: usize,
    pub held: usize,
    /// Folders needing nothing: prompts up to date, or no persona at all.
    pub current: usize,
    pub failed: usize,
}

/// What is known about one persona folder's derivative prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptStats {
    pub dir: String,
    /// File names under `prompts/` on the default branch.
    pub files: Vec<String>,
    pub platform_count: usize,
    pub variation_count: usize,
    /// Kinds requested by README markers.
    pub triggers: Vec<PromptKind>,
    /// The last prompts PR recorded in the ledger.
    pub last_published: Option<LedgerEntry>,
}

impl PromptStats {
    pub fn prompts_exist(&self) -> bool {
        !self.files.is_empty()
    }
}

fn ledger_key(dir: &str) -> String {
    format!("prompts:{dir}")
}

impl Studio {
    /// Generate the requested prompt kinds for `name` and publish them in one PR.
    /// Kinds that fail validation are left out; the PR is opened when at
    /// least one prompt was generated.
    pub async fn publish_prompts(
        &self,
        cancel: &CancellationToken,
        name: &PersonaName,
        kinds: &[PromptKind],
    ) -> Result<PublishOutcome, PipelineError> {
        let (dir, synthesized) = self
            .find_existing_persona(name)
            .await?
            .ok_or_else(|| PipelineError::MissingPersona(name.primary().to_string()))?;
        self.publish_prompts_in(cancel, &dir, name, &synthesized, kinds, BTreeMap::new())
            .await
    }

    /// The shared publish path. `extra_files` are committed alongside the prompts.
    async fn publish_prompts_in(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        name: &PersonaName,
        synthesized: &str,
        kinds: &[PromptKind],
        extra_files: BTreeMap<String, String>,
    ) -> Result<PublishOutcome, PipelineError> {
        let key = ledger_key(dir);
        let fingerprint = Fingerprint::of(synthesized);
        if let Some(reason) = self.ledger_hold(&key, &fingerprint).await? {
            return Ok(PublishOutcome::Skipped(reason));
        }

        let (generated, failed) = match self.prompts.generate_all(cancel, synthesized, kinds).await {
            Ok(outcome) => outcome,
            Err(PromptError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                tracing::warn!(dir = %dir, error = %e, "derivative prompt generation aborted");
                return Err(PipelineError::NoPrompts {
                    failed: kinds.len(),
                });
            }
        };
        if generated.is_empty() {
            return Err(PipelineError::NoPrompts {
                failed: failed.len(),
            });
        }

        let mut files = extra_files;
        let mut listing = String::new();
        for prompt in &generated {
            files.insert(prompt_path(dir, prompt.kind), prompt.content.clone());
            listing.push_str(&format!(
                "- `prompts/{}`: {}\n",
                prompt.kind.output_file(),
                prompt.kind.display_name()
            ));
        }
        let mut description = format!(
            "This PR adds derivative prompts for **{}**.\n\n{listing}",
            name.primary()
        );
        if !failed.is_empty() {
            description.push_str(&format!("\n{} kinds could not be generated.\n", failed.len()));
        }

        let publication = Publication {
            key: key.clone(),
            branch: layout::branch_name(
                &self.settings.branch_prefix,
                name,
                &format!("prompts-{}", ulid::Ulid::new().to_string().to_lowercase()),
            ),
            title: format!("Add derivative prompts: {}", name.primary()),
            description,
            commit_message: format!("Add derivative prompts: {}", name.primary()),
            files,
            labels: vec![
                "persona".to_string(),
                "automated".to_string(),
                "prompts".to_string(),
            ],
        };

        let artifact = self.publisher.publish(&publication).await?;
        self.ledger.record(&key, &artifact, &fingerprint)?;
        tracing::info!(dir = %dir, pr = artifact.number, prompts = generated.len(), "derivative prompts published");
        Ok(PublishOutcome::Published(artifact))
    }

    /// Decide whether folder `dir`, whose synthesized text is `synthesized`,
    /// needs prompts. README markers win over the other checks so their
    /// kinds are honoured.
    pub async fn prompt_need(
        &self,
        dir: &str,
        synthesized: &str,
        readme: Option<&str>,
        force: bool,
    ) -> Result<Option<PromptNeed>, PipelineError> {
        let triggers = readme.map(readme_prompt_triggers).unwrap_or_default();
        if !triggers.is_empty() {
            return Ok(Some(PromptNeed::Triggered(triggers)));
        }
        if force {
            return Ok(Some(PromptNeed::Forced));
        }
        if self.publisher.list_directory(&prompts_dir(dir)).await?.is_empty() {
            return Ok(Some(PromptNeed::Missing));
        }
        let changed = self
            .ledger
            .get(&ledger_key(dir))?
            .is_some_and(|entry| entry.fingerprint != Fingerprint::of(synthesized));
        Ok(changed.then_some(PromptNeed::SynthesizedChanged))
    }

    /// Check every persona folder once and publish prompts where needed.
    pub async fn scan_prompts(
        &self,
        cancel: &CancellationToken,
        options: &PromptScanOptions,
    ) -> Result<PromptScanSummary, PipelineError> {
        let dirs = self.publisher.list_directory(PERSONAS_ROOT).await?;
        let mut summary = PromptScanSummary::default();

        for dir in dirs {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match self.scan_prompt_folder(cancel, &dir, options).await {
                Ok(None) => summary.current += 1,
                Ok(Some(PublishOutcome::Published(artifact))) => {
                    tracing::info!(dir = %dir, pr = artifact.number, "prompts published");
                    summary.published += 1;
                }
                Ok(Some(PublishOutcome::Skipped(reason))) => {
                    tracing::info!(dir = %dir, reason = %reason, "prompts held by ledger");
                    summary.held += 1;
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    tracing::warn!(dir = %dir, error = %e, "prompt generation failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// `None` when the folder has no persona or its prompts are current.
    async fn scan_prompt_folder(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        options: &PromptScanOptions,
    ) -> Result<Option<PublishOutcome>, PipelineError> {
        let Some(synthesized) = self.publisher.read_file(&synthesized_path(dir), None).await? else {
            return Ok(None);
        };
        let readme = self.publisher.read_file(&readme_path(dir), None).await?;
        let Some(need) = self
            .prompt_need(dir, &synthesized, readme.as_deref(), options.force)
            .await?
        else {
            return Ok(None);
        };

        let name = PersonaName::parse(&display_from_directory(dir))
            .map_err(|e| PipelineError::Parse(e.to_string()))?;
        tracing::info!(dir = %dir, reason = need.as_str(), "persona needs prompts");

        let (kinds, extra_files) = match (&need, readme) {
            (PromptNeed::Triggered(kinds), Some(readme)) => (
                kinds.clone(),
                BTreeMap::from([(readme_path(dir), strip_prompt_triggers(&readme))]),
            ),
            _ => (options.kinds.clone(), BTreeMap::new()),
        };
        self.publish_prompts_in(cancel, dir, &name, &synthesized, &kinds, extra_files)
            .await
            .map(Some)
    }

    /// Scan immediately, then once per `interval` until `cancel` fires.
    pub async fn watch_prompts(
        &self,
        cancel: CancellationToken,
        interval: Duration,
        options: &PromptScanOptions,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), force = options.force, "prompt monitoring started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.scan_prompts(&cancel, options).await {
                Ok(summary) => tracing::info!(
                    published = summary.published,
                    held = summary.held,
                    current = summary.current,
                    failed = summary.failed,
                    "prompt scan complete"
                ),
                Err(PipelineError::Cancelled) => break,
                Err(e) => tracing::error!(error = %e, "prompt scan failed"),
            }
        }
        tracing::info!("prompt monitoring stopped");
    }

    /// Prompt statistics for one folder, `None` when it holds no persona.
    pub async fn prompt_stats(&self, dir: &str) -> Result<Option<PromptStats>, PipelineError> {
        if self.publisher.read_file(&synthesized_path(dir), None).await?.is_none() {
            return Ok(None);
        }
        let files = self.publisher.list_directory(&prompts_dir(dir)).await?;
        let kinds: Vec<PromptKind> = files
            .iter()
            .filter_map(|file| PromptKind::ALL.into_iter().find(|k| k.output_file() == *file))
            .collect();
        let triggers = self
            .publisher
            .read_file(&readme_path(dir), None)
            .await?
            .map(|readme| readme_prompt_triggers(&readme))
            .unwrap_or_default();

        Ok(Some(PromptStats {
            dir: dir.to_string(),
            platform_count: kinds.iter().filter(|k| k.is_platform()).count(),
            variation_count: kinds.iter().filter(|k| !k.is_platform()).count(),
            files,
            triggers,
            last_published: self.ledger.get(&ledger_key(dir))?,
        }))
    }

    /// Statistics for every persona folder.
    pub async fn prompt_stats_all(&self) -> Result<Vec<PromptStats>, PipelineError> {
        let mut all = Vec::new();
        for dir in self.publisher.list_directory(PERSONAS_ROOT).await? {
            if let Some(stats) = self.prompt_stats(&dir).await? {
                all.push(stats);
            }
        }
        Ok(all)
    }
}
