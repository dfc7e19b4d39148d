// ABOUTME: Polling orchestrator: each tick handles update requests, create requests, then PR feedback.
// ABOUTME: Requests are marked handled only after a confirmed publish or a reported user error; ledger holds are retried.

use std::fmt::Display;
use std::time::Duration;

use studio_core::feedback::sign;
use studio_core::issue::parsing_error_comment;
use studio_core::{
    CommentTarget, InboundRequest, PersonaIssue, PersonaName, Request, RequestId, RequestKind,
    UpdateIssue,
};
use studio_store::DecisionReason;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::studio::{PACKAGE_TITLE_PREFIX, PublishOutcome, Studio};

/// Counts for one polling tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub published: usize,
    /// Left open for the next tick: transient failures and ledger holds.
    pub deferred: usize,
    /// Requests answered with an explanation instead of a PR.
    pub rejected: usize,
    /// Open PRs regenerated from reviewer feedback.
    pub revised: usize,
}

pub struct Orchestrator {
    studio: Studio,
    interval: Duration,
}

impl Orchestrator {
    pub fn new(studio: Studio, interval: Duration) -> Self {
        Self { studio, interval }
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    /// Tick immediately, then once per interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "polling started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(&cancel).await {
                Ok(summary) => tracing::info!(
                    published = summary.published,
                    deferred = summary.deferred,
                    rejected = summary.rejected,
                    revised = summary.revised,
                    "tick complete"
                ),
                Err(PipelineError::Cancelled) => break,
                Err(e) => tracing::error!(error = %e, "tick failed"),
            }
        }
        tracing::info!("polling stopped");
    }

    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickSummary, PipelineError> {
        let mut summary = TickSummary::default();

        match self.studio.publisher.list_open_requests(RequestKind::Update).await {
            Ok(requests) => {
                for request in requests {
                    self.handle_update(cancel, &request, &mut summary).await?;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list update requests"),
        }

        match self.studio.publisher.list_open_requests(RequestKind::Create).await {
            Ok(requests) => {
                for request in requests {
                    self.handle_create(cancel, &request, &mut summary).await?;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list persona requests"),
        }

        self.handle_feedback(cancel, &mut summary).await?;
        Ok(summary)
    }

    async fn handle_create(
        &self,
        cancel: &CancellationToken,
        inbound: &InboundRequest,
        summary: &mut TickSummary,
    ) -> Result<(), PipelineError> {
        let number = inbound.number;
        if self.studio.tracker.is_handled(RequestKind::Create, number)? {
            return Ok(());
        }

        let issue = match PersonaIssue::parse(&inbound.title, &inbound.body) {
            Ok(issue) => issue,
            Err(e) => return self.reject(RequestKind::Create, number, &e, summary).await,
        };
        let name = match PersonaName::parse(&issue.persona_name) {
            Ok(name) => name,
            Err(e) => return self.reject(RequestKind::Create, number, &e, summary).await,
        };
        let request = Request::new(RequestId::Issue(number), name, issue.format_for_prompt())
            .with_supplemental(issue.user_persona);

        let outcome = self.studio.create_persona(cancel, &request).await;
        self.settle(RequestKind::Create, number, &request.ledger_key(), outcome, summary)
            .await
    }

    async fn handle_update(
        &self,
        cancel: &CancellationToken,
        inbound: &InboundRequest,
        summary: &mut TickSummary,
    ) -> Result<(), PipelineError> {
        let number = inbound.number;
        if self.studio.tracker.is_handled(RequestKind::Update, number)? {
            return Ok(());
        }

        let issue = match UpdateIssue::parse(&inbound.title, &inbound.body) {
            Ok(issue) => issue,
            Err(e) => return self.reject(RequestKind::Update, number, &e, summary).await,
        };
        let key = PersonaName::parse(&issue.persona_name)
            .map(|name| format!("update:{}", name.directory_name()))
            .unwrap_or_default();

        let outcome = self.studio.update_persona(cancel, number, &issue).await;
        self.settle(RequestKind::Update, number, &key, outcome, summary)
            .await
    }

    /// Report the outcome of a create or update flow and decide whether the
    /// request is finished.
    async fn settle(
        &self,
        kind: RequestKind,
        number: u64,
        key: &str,
        outcome: Result<PublishOutcome, PipelineError>,
        summary: &mut TickSummary,
    ) -> Result<(), PipelineError> {
        match outcome {
            Ok(PublishOutcome::Published(artifact)) => {
                self.notify(
                    number,
                    &format!("**Pull request opened**\n\n{}", artifact.url),
                )
                .await;
                self.studio.tracker.mark_handled(kind, number, "published")?;
                tracing::info!(issue = number, pr = artifact.number, "request published");
                summary.published += 1;
            }
            Ok(PublishOutcome::Skipped(reason)) => {
                // Held, not handled: the pending PR may still close unmerged.
                tracing::info!(issue = number, key = %key, reason = %reason, "publish held by ledger");
                if reason == DecisionReason::DuplicateContentPending {
                    self.notify_duplicate(kind, number, key).await?;
                }
                summary.deferred += 1;
            }
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(PipelineError::MissingPersona(name)) => {
                let text = sign(&format!(
                    "**No existing persona found**\n\n\
                     There is no published persona for **{name}** to update. \
                     Open a `Create Persona: {name}` request first."
                ));
                if self.try_comment(number, &text).await {
                    self.studio.tracker.mark_handled(kind, number, "missing_persona")?;
                    summary.rejected += 1;
                } else {
                    summary.deferred += 1;
                }
            }
            Err(e) if e.is_user_error() => return self.reject(kind, number, &e, summary).await,
            Err(e) => {
                tracing::warn!(issue = number, error = %e, "deferring request to the next tick");
                summary.deferred += 1;
            }
        }
        Ok(())
    }

    /// Explain a malformed request to its author and stop polling it. If
    /// the explanation cannot be posted the request is tried again later.
    async fn reject(
        &self,
        kind: RequestKind,
        number: u64,
        error: &(dyn Display + Sync),
        summary: &mut TickSummary,
    ) -> Result<(), PipelineError> {
        tracing::info!(issue = number, error = %error, "rejecting malformed request");
        if self.try_comment(number, &parsing_error_comment(error)).await {
            self.studio.tracker.mark_handled(kind, number, "parse_error")?;
            summary.rejected += 1;
        } else {
            summary.deferred += 1;
        }
        Ok(())
    }

    async fn try_comment(&self, number: u64, text: &str) -> bool {
        match self
            .studio
            .publisher
            .comment(CommentTarget::Request(number), text)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(issue = number, error = %e, "failed to comment on request");
                false
            }
        }
    }

    async fn notify(&self, number: u64, text: &str) {
        self.try_comment(number, &sign(text)).await;
    }

    /// Point the author at the open PR carrying identical content, once.
    async fn notify_duplicate(
        &self,
        kind: RequestKind,
        number: u64,
        key: &str,
    ) -> Result<(), PipelineError> {
        let notice = DecisionReason::DuplicateContentPending.as_str();
        if self.studio.tracker.has_notice(kind, number, notice)? {
            return Ok(());
        }
        let Some(entry) = self.studio.ledger.get(key)? else {
            return Ok(());
        };
        let text = sign(&format!(
            "**Already in review**\n\nIdentical content is pending in {}. \
             This request will be picked up again if that pull request is closed without merging.",
            entry.artifact.url
        ));
        if self.try_comment(number, &text).await {
            self.studio.tracker.record_notice(kind, number, notice)?;
        }
        Ok(())
    }

    async fn handle_feedback(
        &self,
        cancel: &CancellationToken,
        summary: &mut TickSummary,
    ) -> Result<(), PipelineError> {
        let open = match self.studio.publisher.list_open_artifacts().await {
            Ok(open) => open,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list open pull requests");
                return Ok(());
            }
        };

        for artifact in open
            .iter()
            .filter(|a| a.title.starts_with(PACKAGE_TITLE_PREFIX))
        {
            let pending = match self.studio.pending_feedback(artifact).await {
                Ok(pending) if pending.is_empty() => continue,
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(pr = artifact.artifact.number, error = %e, "failed to read comments");
                    continue;
                }
            };

            match self.studio.revise_artifact(cancel, artifact, &pending).await {
                Ok(()) => summary.revised += 1,
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) if e.is_user_error() => {
                    tracing::warn!(pr = artifact.artifact.number, error = %e, "feedback cannot be applied");
                    self.studio.mark_feedback_processed(artifact, &pending)?;
                }
                Err(e) => {
                    tracing::warn!(pr = artifact.artifact.number, error = %e, "deferring feedback to the next tick");
                    summary.deferred += 1;
                }
            }
        }
        Ok(())
    }
}
