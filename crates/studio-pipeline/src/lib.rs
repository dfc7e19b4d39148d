// ABOUTME: Coordination layer for the persona studio: configuration, polling loop, and every publish flow.
// ABOUTME: Drives normalize -> aggregate -> synthesize -> ledger -> publish for issues, updates, feedback, and batches.

pub mod batch;
pub mod config;
pub mod error;
pub mod feedback;
pub mod orchestrator;
pub mod prompts;
pub mod resynthesis;
pub mod studio;
pub mod testing;
pub mod update;

pub use batch::{BatchOptions, BatchSummary, parse_batch_file};
pub use config::{ConfigError, StudioConfig, parse_interval};
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, TickSummary};
pub use prompts::{PromptNeed, PromptScanOptions, PromptScanSummary, PromptStats};
pub use resynthesis::ResynthesisSummary;
pub use studio::{PACKAGE_TITLE_PREFIX, PublishOutcome, PublishSettings, Studio};
