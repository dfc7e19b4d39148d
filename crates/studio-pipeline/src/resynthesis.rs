// ABOUTME: Re-synthesis of published personas from the raw provider outputs stored beside them.
// ABOUTME: Rebuilds an aggregation result from raw files and publishes a fresh synthesized.md.

use std::collections::BTreeMap;

use studio_core::layout::{self, PERSONAS_ROOT, USER_SUPPLIED_FILE, raw_path, synthesized_path};
use studio_core::name::display_from_directory;
use studio_core::{AggregationResult, Fingerprint, PersonaName, ProviderOutcome, Publication};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::studio::{PublishOutcome, Studio};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResynthesisSummary {
    pub published: usize,
    pub held: usize,
    pub failed: usize,
}

impl Studio {
    /// Load the stored raw outputs of persona folder `dir`, one outcome per
    /// registered provider. A missing file becomes a failed outcome.
    pub async fn load_raw_outputs(
        &self,
        dir: &str,
    ) -> Result<(AggregationResult, Option<String>), PipelineError> {
        let mut outcomes = Vec::new();
        for id in self.aggregator.provider_ids() {
            let outcome = match self.publisher.read_file(&raw_path(dir, &id), None).await? {
                Some(text) if !text.trim().is_empty() => ProviderOutcome::success(&id, text),
                _ => ProviderOutcome::failure(&id, "no stored raw output"),
            };
            outcomes.push(outcome);
        }
        let supplemental = self
            .publisher
            .read_file(&raw_path(dir, USER_SUPPLIED_FILE), None)
            .await?
            .filter(|text| !text.trim().is_empty());
        Ok((AggregationResult::new(outcomes), supplemental))
    }

    pub async fn resynthesize(
        &self,
        cancel: &CancellationToken,
        dir: &str,
    ) -> Result<PublishOutcome, PipelineError> {
        let (result, supplemental) = self.load_raw_outputs(dir).await?;
        let display = display_from_directory(dir);
        if result.success_count() == 0 && supplemental.is_none() {
            return Err(PipelineError::MissingPersona(display));
        }
        if result.success_count() == 0 {
            return Err(PipelineError::AggregationFailure {
                providers: result.len(),
            });
        }

        tracing::info!(dir = %dir, sources = result.success_count(), "re-synthesizing persona");
        let document = self
            .synthesizer
            .synthesize(cancel, &result, supplemental.as_deref())
            .await?;

        let name =
            PersonaName::parse(&display).map_err(|e| PipelineError::Parse(e.to_string()))?;
        let suffix = format!("synthesis-{}", ulid::Ulid::new().to_string().to_lowercase());
        let sources: Vec<&str> = result
            .successes()
            .map(|o| o.provider_id.as_str())
            .collect();

        let publication = Publication {
            key: format!("synthesis:{dir}"),
            branch: layout::branch_name(&self.settings.branch_prefix, &name, &suffix),
            title: format!("Re-synthesize persona: {display}"),
            description: format!(
                "This PR regenerates `synthesized.md` for **{display}** from the stored raw outputs.\n\n\
                 - Sources: {}{}\n",
                sources.join(", "),
                if supplemental.is_some() { ", user-supplied" } else { "" }
            ),
            commit_message: format!("Re-synthesize persona: {display}"),
            files: BTreeMap::from([(synthesized_path(dir), document.text)]),
            labels: vec![
                "persona".to_string(),
                "automated".to_string(),
                "synthesis".to_string(),
            ],
        };

        let fingerprint = raw_fingerprint(&result, supplemental.as_deref());
        self.publish_guarded(&publication.key, &fingerprint, &publication)
            .await
    }

    /// Re-synthesize every persona folder in the repository.
    pub async fn resynthesize_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ResynthesisSummary, PipelineError> {
        let dirs = self.publisher.list_directory(PERSONAS_ROOT).await?;
        let mut summary = ResynthesisSummary::default();

        for dir in dirs {
            match self.resynthesize(cancel, &dir).await {
                Ok(PublishOutcome::Published(artifact)) => {
                    tracing::info!(dir = %dir, pr = artifact.number, "re-synthesis published");
                    summary.published += 1;
                }
                Ok(PublishOutcome::Skipped(reason)) => {
                    tracing::info!(dir = %dir, reason = %reason, "re-synthesis held by ledger");
                    summary.held += 1;
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    tracing::warn!(dir = %dir, error = %e, "re-synthesis failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Fingerprint of the stored inputs; unchanged raw files mean nothing new to publish.
fn raw_fingerprint(result: &AggregationResult, supplemental: Option<&str>) -> Fingerprint {
    let mut content = String::new();
    for outcome in result.successes() {
        content.push_str(&outcome.provider_id);
        content.push('\n');
        content.push_str(&outcome.text);
        content.push('\n');
    }
    if let Some(text) = supplemental {
        content.push_str(USER_SUPPLIED_FILE);
        content.push('\n');
        content.push_str(text);
    }
    Fingerprint::of(&content)
}
