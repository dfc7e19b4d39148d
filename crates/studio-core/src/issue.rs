// ABOUTME: Parses persona request issues ("Create Persona: X") and update issues ("Update Persona: X").
// ABOUTME: Extracts the <<< >>> detail block and the optional [[[ ]]] user-supplied persona.

use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::feedback::sign;

const DETAIL_OPEN: &str = "<<<";
const DETAIL_CLOSE: &str = ">>>";
const USER_OPEN: &str = "[[[";
const USER_CLOSE: &str = "]]]";
const USER_PLACEHOLDER: &str = "[Paste your complete persona here]";

static CREATE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)create\s+persona:\s*(.+)").expect("create title pattern compiles")
});

static UPDATE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*update\s+persona:\s*(.*)$").expect("update title pattern compiles")
});

/// Reasons an issue cannot be turned into a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueParseError {
    #[error("title must follow format '{expected}'")]
    InvalidTitle { expected: &'static str },

    #[error("persona name cannot be empty")]
    EmptyName,

    #[error("issue body must contain the updated persona")]
    MissingUpdateContent,
}

/// A parsed "Create Persona" issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaIssue {
    pub persona_name: String,
    pub detailed_content: String,
    pub user_persona: Option<String>,
}

impl PersonaIssue {
    /// Parse an issue title and body.
    pub fn parse(title: &str, body: &str) -> Result<Self, IssueParseError> {
        let caps = CREATE_TITLE
            .captures(title)
            .ok_or(IssueParseError::InvalidTitle {
                expected: "Create Persona: [Full Name]",
            })?;
        let persona_name = caps[1].trim().to_string();
        if persona_name.is_empty() {
            return Err(IssueParseError::EmptyName);
        }

        let body = body.trim();
        let detailed_content = extract_details(body).unwrap_or_else(|| body.to_string());
        let user_persona = extract_user_persona(body);

        Ok(Self {
            persona_name,
            detailed_content,
            user_persona,
        })
    }

    /// Render the issue as the description section of a generation prompt.
    pub fn format_for_prompt(&self) -> String {
        if self.detailed_content.trim().is_empty() {
            return format!(
                "Create a comprehensive persona for: {}\n\n\
                 No additional details were provided. Please create a detailed persona profile \
                 based on your knowledge of this person or character, including their background, \
                 personality traits, speaking style, areas of expertise, values, beliefs and goals.",
                self.persona_name
            );
        }

        format!(
            "Create a comprehensive persona for: {}\n\n\
             Details provided:\n{}\n\n\
             Please create a detailed persona profile that captures all the provided information \
             and expands upon it into a complete, nuanced character.",
            self.persona_name, self.detailed_content
        )
    }
}

/// A parsed "Update Persona" issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateIssue {
    pub persona_name: String,
    pub user_persona: String,
}

impl UpdateIssue {
    pub fn parse(title: &str, body: &str) -> Result<Self, IssueParseError> {
        let caps = UPDATE_TITLE
            .captures(title)
            .ok_or(IssueParseError::InvalidTitle {
                expected: "Update Persona: [Full Name]",
            })?;
        let persona_name = caps[1].trim().to_string();
        if persona_name.is_empty() {
            return Err(IssueParseError::EmptyName);
        }

        let body = body.trim();
        let user_persona = match extract_user_persona(body) {
            Some(persona) => persona,
            None if !body.is_empty() && !body.contains(USER_OPEN) => body.to_string(),
            None => return Err(IssueParseError::MissingUpdateContent),
        };

        Ok(Self {
            persona_name,
            user_persona,
        })
    }
}

/// Comment posted back to a request that could not be parsed.
pub fn parsing_error_comment(error: &dyn Display) -> String {
    sign(&format!(
        "**Unable to process this persona request**\n\n\
         Error: {error}\n\n\
         Please use this format:\n\n\
         **Title:** `Create Persona: [Full Name]`\n\n\
         **Body (optional):**\n\
         ```markdown\n\
         <<<\n\
         **Background:** ...\n\
         **Personality:** ...\n\
         >>>\n\n\
         [[[\n\
         [Paste your complete persona here]\n\
         ]]]\n\
         ```\n\n\
         Please open a new issue using the format above."
    ))
}

/// Content between the first `<<<` and the last `>>>`, if it looks structured.
fn extract_details(body: &str) -> Option<String> {
    let start = body.find(DETAIL_OPEN)? + DETAIL_OPEN.len();
    let end = body.rfind(DETAIL_CLOSE)?;
    if end <= start {
        return None;
    }
    let content = body[start..end].trim();
    if content.is_empty() || !(content.contains("**") || content.contains(':')) {
        return None;
    }
    Some(content.to_string())
}

/// Content between `[[[` and the following `]]]`, ignoring the template placeholder.
fn extract_user_persona(body: &str) -> Option<String> {
    let start = body.find(USER_OPEN)? + USER_OPEN.len();
    let rel_end = body[start..].find(USER_CLOSE)?;
    let content = body[start..start + rel_end].trim();
    if content.is_empty() || content == USER_PLACEHOLDER {
        return None;
    }
    Some(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::is_bot_comment;

    #[test]
    fn parses_structured_issue() {
        let body = "Intro text\n<<<\n**Background:** Physicist\n**Era:** 1900s\n>>>\ntrailing";
        let issue = PersonaIssue::parse("Create Persona: Marie Curie", body).unwrap();

        assert_eq!(issue.persona_name, "Marie Curie");
        assert_eq!(
            issue.detailed_content,
            "**Background:** Physicist\n**Era:** 1900s"
        );
        assert!(issue.user_persona.is_none());
    }

    #[test]
    fn title_is_case_insensitive() {
        let issue = PersonaIssue::parse("create PERSONA:   Ada Lovelace ", "").unwrap();
        assert_eq!(issue.persona_name, "Ada Lovelace");
    }

    #[test]
    fn rejects_bad_title() {
        let err = PersonaIssue::parse("Please make Ada", "").unwrap_err();
        assert!(err.to_string().contains("Create Persona: [Full Name]"));
    }

    #[test]
    fn unstructured_markers_fall_back_to_whole_body() {
        let body = "<<< just some words >>>";
        let issue = PersonaIssue::parse("Create Persona: Ada Lovelace", body).unwrap();
        assert_eq!(issue.detailed_content, body);
    }

    #[test]
    fn user_persona_placeholder_is_ignored() {
        let body = "[[[\n[Paste your complete persona here]\n]]]";
        let issue = PersonaIssue::parse("Create Persona: Ada Lovelace", body).unwrap();
        assert!(issue.user_persona.is_none());

        let body = "[[[\nAda was a mathematician.\n]]]";
        let issue = PersonaIssue::parse("Create Persona: Ada Lovelace", body).unwrap();
        assert_eq!(issue.user_persona.as_deref(), Some("Ada was a mathematician."));
    }

    #[test]
    fn prompt_format_depends_on_details() {
        let bare = PersonaIssue::parse("Create Persona: Ada Lovelace", "").unwrap();
        assert!(bare.format_for_prompt().contains("No additional details"));

        let rich = PersonaIssue::parse(
            "Create Persona: Ada Lovelace",
            "<<<\n**Field:** Mathematics\n>>>",
        )
        .unwrap();
        let prompt = rich.format_for_prompt();
        assert!(prompt.contains("Details provided:\n**Field:** Mathematics"));
    }

    #[test]
    fn update_issue_prefers_marked_block() {
        let update = UpdateIssue::parse(
            "Update Persona: Ada Lovelace",
            "notes\n[[[\nNew persona text\n]]]",
        )
        .unwrap();
        assert_eq!(update.persona_name, "Ada Lovelace");
        assert_eq!(update.user_persona, "New persona text");

        let whole = UpdateIssue::parse("update persona: Ada Lovelace", "Entire body").unwrap();
        assert_eq!(whole.user_persona, "Entire body");
    }

    #[test]
    fn update_issue_requires_content() {
        assert_eq!(
            UpdateIssue::parse("Update Persona: Ada Lovelace", "  "),
            Err(IssueParseError::MissingUpdateContent)
        );
        assert_eq!(
            UpdateIssue::parse("Update Persona: Ada Lovelace", "[[[\n]]]"),
            Err(IssueParseError::MissingUpdateContent)
        );
        assert_eq!(
            UpdateIssue::parse("Update Persona:   ", "text"),
            Err(IssueParseError::EmptyName)
        );
    }

    #[test]
    fn error_comment_is_signed_and_explains() {
        let comment = parsing_error_comment(&IssueParseError::EmptyName);
        assert!(comment.contains("persona name cannot be empty"));
        assert!(is_bot_comment(&comment));
    }
}
