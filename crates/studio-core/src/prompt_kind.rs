// ABOUTME: Derivative prompt kinds generated from a synthesized persona.
// ABOUTME: Platform-specific adaptations plus length-constrained variations, with output validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum length of a usable derivative prompt, in characters.
pub const MIN_PROMPT_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    ChatGpt,
    Claude,
    Gemini,
    Discord,
    CharacterAi,
    Condensed,
    Alternative,
}

/// Problems found in a generated derivative prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptValidationError {
    #[error("{kind} prompt is empty")]
    Empty { kind: PromptKind },

    #[error("{kind} prompt is too short ({len} < {min} characters)")]
    TooShort { kind: PromptKind, len: usize, min: usize },

    #[error("{kind} prompt still contains template placeholders")]
    UnresolvedPlaceholder { kind: PromptKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown prompt kind: {0}")]
pub struct UnknownPromptKind(pub String);

impl PromptKind {
    pub const ALL: [PromptKind; 7] = [
        PromptKind::ChatGpt,
        PromptKind::Claude,
        PromptKind::Gemini,
        PromptKind::Discord,
        PromptKind::CharacterAi,
        PromptKind::Condensed,
        PromptKind::Alternative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Discord => "discord",
            Self::CharacterAi => "characterai",
            Self::Condensed => "condensed",
            Self::Alternative => "alternative",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
            Self::Discord => "Discord Bot",
            Self::CharacterAi => "Character.AI",
            Self::Condensed => "Condensed",
            Self::Alternative => "Alternative",
        }
    }

    /// Platform adaptations, as opposed to length-constrained variations.
    pub fn is_platform(&self) -> bool {
        !matches!(self, Self::Condensed | Self::Alternative)
    }

    /// Template file consulted in the template directory.
    pub fn template_file(&self) -> String {
        if self.is_platform() {
            format!("platform_{}.txt", self.as_str())
        } else {
            format!("variation_{}.txt", self.as_str())
        }
    }

    /// File name of the generated prompt inside the persona's `prompts/` folder.
    pub fn output_file(&self) -> String {
        format!("{}.md", self.as_str())
    }

    /// Check a generated prompt before it is published.
    pub fn validate(&self, content: &str) -> Result<(), PromptValidationError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(PromptValidationError::Empty { kind: *self });
        }
        let len = trimmed.chars().count();
        if len < MIN_PROMPT_LEN {
            return Err(PromptValidationError::TooShort {
                kind: *self,
                len,
                min: MIN_PROMPT_LEN,
            });
        }
        if trimmed.contains("{{") || trimmed.contains("}}") {
            return Err(PromptValidationError::UnresolvedPlaceholder { kind: *self });
        }
        Ok(())
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = UnknownPromptKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or(UnknownPromptKind(s.to_string()))
    }
}
