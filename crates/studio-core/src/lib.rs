// ABOUTME: Core library for the persona studio, containing domain types shared by every crate.
// ABOUTME: Covers name normalization, issue parsing, fingerprints, templates, and the publisher capability.

pub mod feedback;
pub mod fingerprint;
pub mod issue;
pub mod layout;
pub mod name;
pub mod outcome;
pub mod prompt_kind;
pub mod publish;
pub mod request;
pub mod template;

pub use fingerprint::Fingerprint;
pub use issue::{IssueParseError, PersonaIssue, UpdateIssue};
pub use name::{ParseError, PersonaName};
pub use outcome::{AggregationResult, ProviderOutcome, SynthesizedDocument};
pub use prompt_kind::PromptKind;
pub use publish::{
    ArtifactComment, ArtifactRef, ArtifactStatus, ArtifactStatusSource, CommentTarget,
    InboundRequest, OpenArtifact, Publication, PublisherError, RepositoryPublisher, RequestKind,
};
pub use request::{Request, RequestId, Revision};
pub use template::{TemplateName, TemplateStore};
