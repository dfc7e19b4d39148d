// ABOUTME: The Request unit of work and the generation prompt built from it.
// ABOUTME: A request may be a feedback revision that carries the prior synthesized text forward.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::feedback::format_feedback;
use crate::fingerprint::Fingerprint;
use crate::name::PersonaName;

/// Externally supplied identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestId {
    /// A request issue in the watched repository.
    Issue(u64),
    /// A synthetic key for names read from a batch file.
    Batch(Ulid),
}

impl RequestId {
    pub fn new_batch() -> Self {
        Self::Batch(Ulid::new())
    }

    /// Issue number, when the request came from an issue.
    pub fn issue_number(&self) -> Option<u64> {
        match self {
            Self::Issue(n) => Some(*n),
            Self::Batch(_) => None,
        }
    }

    /// Suffix used in branch names.
    pub fn branch_suffix(&self) -> String {
        match self {
            Self::Issue(n) => n.to_string(),
            Self::Batch(id) => format!("batch-{}", id.to_string().to_lowercase()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue(n) => write!(f, "issue-{n}"),
            Self::Batch(id) => write!(f, "batch-{id}"),
        }
    }
}

/// Prior synthesized text plus reviewer feedback for a regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub prior_text: String,
    pub feedback: Vec<String>,
}

/// One unit of work. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub subject: PersonaName,
    pub body_text: String,
    pub supplemental_text: Option<String>,
    pub revision: Option<Revision>,
}

impl Request {
    pub fn new(id: RequestId, subject: PersonaName, body_text: impl Into<String>) -> Self {
        Self {
            id,
            subject,
            body_text: body_text.into(),
            supplemental_text: None,
            revision: None,
        }
    }

    /// Attach a user-authored reference document. Blank text is ignored.
    pub fn with_supplemental(mut self, text: Option<String>) -> Self {
        self.supplemental_text = text.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Ledger key for creating this subject's persona package.
    pub fn ledger_key(&self) -> String {
        self.subject.directory_name()
    }

    /// Fingerprint of the inputs that produce this request's package. Two
    /// requests for the same subject with the same details collide, whatever
    /// the providers answer.
    pub fn content_fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&format!(
            "{}\n{}\n{}",
            self.subject.key(),
            self.body_text.trim(),
            self.supplemental_text.as_deref().unwrap_or_default().trim()
        ))
    }

    /// Build the per-provider generation prompt. `guide` is the persona
    /// template; an empty guide is omitted.
    pub fn generation_prompt(&self, guide: &str) -> String {
        let mut prompt = format!(
            "Title: Create Persona: {}\n\nDescription:\n{}",
            self.subject.prompt_description(),
            self.body_text.trim()
        );

        if !guide.trim().is_empty() {
            prompt.push_str("\n\nUse this template as a guide:\n");
            prompt.push_str(guide);
        }

        if let Some(revision) = &self.revision {
            prompt.push_str(
                "\n\nIMPORTANT: Please address the following feedback from reviewers:\n",
            );
            prompt.push_str(&format_feedback(&revision.feedback));
            prompt.push_str("\nPrevious persona version:\n<<<\n");
            prompt.push_str(&revision.prior_text);
            prompt.push_str("\n>>>\n\nGenerate an improved persona that addresses every feedback point.");
        }

        prompt
    }
}
