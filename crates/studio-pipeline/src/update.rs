// ABOUTME: Update flow: merge a user-provided persona revision into the published persona.
// ABOUTME: Reads the existing synthesized document, merges through the synthesis provider, and opens a PR.

use std::collections::BTreeMap;

use studio_core::layout::{self, USER_UPDATE_FILE, raw_path, synthesized_path};
use studio_core::{Fingerprint, PersonaName, Publication, UpdateIssue};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::studio::{PublishOutcome, Studio};

impl Studio {
    /// The published synthesized document for `name`, with the folder it was
    /// found in. Every directory candidate is tried in order.
    pub async fn find_existing_persona(
        &self,
        name: &PersonaName,
    ) -> Result<Option<(String, String)>, PipelineError> {
        for dir in name.directory_candidates() {
            if let Some(text) = self.publisher.read_file(&synthesized_path(&dir), None).await? {
                return Ok(Some((dir, text)));
            }
        }
        Ok(None)
    }

    pub async fn update_persona(
        &self,
        cancel: &CancellationToken,
        number: u64,
        issue: &UpdateIssue,
    ) -> Result<PublishOutcome, PipelineError> {
        let name = PersonaName::parse(&issue.persona_name)
            .map_err(|e| PipelineError::Parse(e.to_string()))?;
        let (dir, existing) = self
            .find_existing_persona(&name)
            .await?
            .ok_or_else(|| PipelineError::MissingPersona(name.primary().to_string()))?;

        let key = format!("update:{dir}");
        let fingerprint = Fingerprint::of(&issue.user_persona);
        if let Some(reason) = self.ledger_hold(&key, &fingerprint).await? {
            return Ok(PublishOutcome::Skipped(reason));
        }

        tracing::info!(issue = number, dir = %dir, "merging persona update");
        let merged = self
            .synthesizer
            .merge_update(cancel, &existing, &issue.user_persona)
            .await?;

        let files = BTreeMap::from([
            (synthesized_path(&dir), merged),
            (raw_path(&dir, USER_UPDATE_FILE), issue.user_persona.clone()),
        ]);
        let source = layout::issue_reference(
            &self.settings.issues_owner,
            &self.settings.issues_repo,
            number,
        );
        let publication = Publication {
            key: key.clone(),
            branch: layout::branch_name(
                &self.settings.branch_prefix,
                &name,
                &format!("update-{number}"),
            ),
            title: format!("Update persona: {}", name.primary()),
            description: format!(
                "This PR updates the persona **{}** with a user-provided revision.\n\n\
                 - `synthesized.md` merges the existing persona with the update\n\
                 - `raw/{USER_UPDATE_FILE}.md` keeps the update as submitted\n\n{source}\n",
                name.primary()
            ),
            commit_message: format!("Update persona: {}", name.primary()),
            files,
            labels: vec![
                "persona".to_string(),
                "automated".to_string(),
                "update".to_string(),
            ],
        };

        self.publish_guarded(&key, &fingerprint, &publication).await
    }
}
