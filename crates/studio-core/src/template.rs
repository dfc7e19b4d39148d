// ABOUTME: Template store loading prompt templates from disk with built-in fallbacks.
// ABOUTME: Templates are plain text with {{PLACEHOLDER}} markers substituted by render().

use std::path::{Path, PathBuf};

use crate::prompt_kind::PromptKind;

/// Named templates the studio uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateName {
    /// Structure guide appended to every generation prompt.
    PersonaGuide,
    /// Merge prompt for the synthesizer. Placeholder: `{{PERSONAS}}`.
    Combination,
    /// Merge prompt for feedback revisions. Placeholders: `{{PERSONAS}}`, `{{FEEDBACK}}`.
    FeedbackCombination,
    /// Merge of an existing persona with a user update.
    /// Placeholders: `{{EXISTING_PERSONA}}`, `{{USER_UPDATE}}`.
    UpdateMerge,
    /// Derivative prompt. Placeholder: `{{SYNTHESIZED_PERSONA}}`.
    Derivative(PromptKind),
}

impl TemplateName {
    pub fn file_name(&self) -> String {
        match self {
            Self::PersonaGuide => "persona_template.md".to_string(),
            Self::Combination => "persona_combination.txt".to_string(),
            Self::FeedbackCombination => "persona_combination_feedback.txt".to_string(),
            Self::UpdateMerge => "persona_update.txt".to_string(),
            Self::Derivative(kind) => kind.template_file(),
        }
    }
}

/// Loads templates from a directory. A missing directory or file is never an
/// error: the built-in default is returned instead.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A store that only serves built-in defaults.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn load(&self, name: TemplateName) -> String {
        if let Some(dir) = &self.dir {
            let path = dir.join(name.file_name());
            match std::fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "template file is empty, using default");
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "template not loaded, using default");
                }
            }
        }
        default_template(name)
    }
}

/// Substitute every `{{KEY}}` occurrence for each `(KEY, value)` pair.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Built-in fallback for each template.
pub fn default_template(name: TemplateName) -> String {
    match name {
        TemplateName::PersonaGuide => String::new(),
        TemplateName::Combination => format!(
            "{COMBINATION_PREAMBLE}\n\nINPUT PERSONAS TO COMBINE:\n\n{{{{PERSONAS}}}}\n\n{OUTPUT_RULES}"
        ),
        TemplateName::FeedbackCombination => format!(
            "{COMBINATION_PREAMBLE}\n\nReviewers left the following feedback on the previous \
             version. The combined persona must address every point:\n{{{{FEEDBACK}}}}\n\n\
             INPUT PERSONAS TO COMBINE:\n\n{{{{PERSONAS}}}}\n\n{OUTPUT_RULES}"
        ),
        TemplateName::UpdateMerge => format!(
            "You are creating an improved persona by merging an existing persona with a \
             user-provided update.\n\n\
             EXISTING PERSONA:\n<<<\n{{{{EXISTING_PERSONA}}}}\n>>>\n\n\
             USER-PROVIDED UPDATE:\n<<<\n{{{{USER_UPDATE}}}}\n>>>\n\n\
             Create a merged version that incorporates new information from the update, keeps \
             valuable details from the existing persona, and prefers the user's interpretation \
             where they conflict.\n\n{OUTPUT_RULES}"
        ),
        TemplateName::Derivative(kind) => derivative_default(kind),
    }
}

const COMBINATION_PREAMBLE: &str = "You are synthesizing several AI-generated personas into a \
    single, comprehensive persona. Each source interpreted the same request independently.\n\n\
    1. Identify the traits, behaviors and facts that appear across sources.\n\
    2. Preserve valuable details that only one source found.\n\
    3. Where sources disagree, choose the interpretation that best serves the persona.\n\
    4. Produce one coherent character with a consistent voice.\n\n\
    A user-supplied persona, when present, carries the same weight as each AI source.";

const OUTPUT_RULES: &str = "Start your response immediately with the persona content in \
    Markdown. Do not include preambles or commentary about the merge.";

fn derivative_default(kind: PromptKind) -> String {
    let instruction = match kind {
        PromptKind::ChatGpt => {
            "Write a ChatGPT custom-instructions system prompt that makes the assistant embody this persona."
        }
        PromptKind::Claude => {
            "Write a Claude system prompt that makes the assistant embody this persona, using clear sections."
        }
        PromptKind::Gemini => {
            "Write a Gemini system instruction that makes the model embody this persona."
        }
        PromptKind::Discord => {
            "Write a Discord bot personality prompt for this persona, suited to short chat messages."
        }
        PromptKind::CharacterAi => {
            "Write a Character.AI character definition (greeting, description, example dialogue) for this persona."
        }
        PromptKind::Condensed => {
            "Condense this persona into a prompt of 500 to 1000 words that keeps its essential traits and voice."
        }
        PromptKind::Alternative => {
            "Write an alternative framing of this persona as a prompt, emphasising a different facet of the character."
        }
    };
    format!(
        "{instruction}\n\nRespond with the prompt text only.\n\nSYNTHESIZED PERSONA:\n<<<\n{{{{SYNTHESIZED_PERSONA}}}}\n>>>"
    )
}
