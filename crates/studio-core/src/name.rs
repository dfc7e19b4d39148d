// ABOUTME: Normalizes free-text persona names into a canonical record with a stable dedup key.
// ABOUTME: Understands "Alias (Real Name)", "Real Name aka Alias", and bare names.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted name, in characters.
pub const MIN_NAME_LEN: usize = 2;
/// Longest accepted name, in characters.
pub const MAX_NAME_LEN: usize = 100;

const KEY_SEPARATOR: char = '|';

static PAREN_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^(]+)\s*\(([^)]+)\)\s*$").expect("parenthesized alias pattern compiles")
});

static AKA_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+aka\s+(.+)$").expect("aka alias pattern compiles")
});

/// Errors produced when a name cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("persona name cannot be empty")]
    EmptyName,

    #[error("persona name must be between {min} and {max} characters (got {len})")]
    InvalidLength { len: usize, min: usize, max: usize },
}

/// A normalized persona name.
///
/// When the input names both an alias and a real name, the alias is the
/// primary (display) identity and the real name is retained alongside it.
/// Both alias spellings of the same subject produce the same [`key`](Self::key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaName {
    primary: String,
    real: Option<String>,
    key: String,
}

impl PersonaName {
    /// Parse a free-text name. Never touches the outside world.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyName);
        }

        let (primary, real) = if let Some(caps) = PAREN_ALIAS.captures(trimmed) {
            (caps[1].to_string(), Some(caps[2].to_string()))
        } else if let Some(caps) = AKA_ALIAS.captures(trimmed) {
            // "Real aka Alias": the alias comes second.
            (caps[2].to_string(), Some(caps[1].to_string()))
        } else {
            (trimmed.to_string(), None)
        };

        let primary = validate_part(&primary)?;
        let real = real.map(|r| validate_part(&r)).transpose()?;

        let key = match &real {
            Some(real) => format!("{primary}{KEY_SEPARATOR}{real}"),
            None => primary.clone(),
        };

        Ok(Self { primary, real, key })
    }

    /// The display identity (the alias when one was given).
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// The real name, if the input carried an alias.
    pub fn real(&self) -> Option<&str> {
        self.real.as_deref()
    }

    pub fn has_alias(&self) -> bool {
        self.real.is_some()
    }

    /// Canonical dedup key: `primary|real` for aliased names, the name itself otherwise.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Description used inside generation prompts.
    pub fn prompt_description(&self) -> String {
        match &self.real {
            Some(real) => format!("{} (also known as {})", self.primary, real),
            None => self.primary.clone(),
        }
    }

    /// Path-safe folder name for the published persona package.
    pub fn directory_name(&self) -> String {
        sanitize_directory(&self.primary)
    }

    /// Lower-cased spellings under which this persona may already have been published.
    pub fn search_variations(&self) -> Vec<String> {
        let mut variations = vec![self.primary.to_lowercase()];
        if let Some(real) = &self.real {
            variations.push(real.to_lowercase());
            variations.push(format!("{} ({})", self.primary, real).to_lowercase());
        }
        dedup_preserving_order(variations)
    }

    /// Folder names derived from every search variation, for existence checks.
    pub fn directory_candidates(&self) -> Vec<String> {
        dedup_preserving_order(
            self.search_variations()
                .iter()
                .map(|v| sanitize_directory(v))
                .filter(|d| !d.is_empty())
                .collect(),
        )
    }

    /// Lower-case, dash-separated slug suitable for branch names.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.primary.len());
        for ch in self.primary.to_lowercase().chars() {
            if ch.is_alphanumeric() {
                slug.push(ch);
            } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        slug.trim_matches('-').to_string()
    }
}

impl fmt::Display for PersonaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.real {
            Some(real) => write!(f, "{} ({})", self.primary, real),
            None => f.write_str(&self.primary),
        }
    }
}

/// Turn a display name into a folder name: lower-case, quotes and parentheses
/// dropped, everything else that is not alphanumeric collapsed into `_`.
pub fn sanitize_directory(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        match ch {
            '\'' | '`' | '(' | ')' => {}
            c if c.is_alphanumeric() || c == '-' => out.push(c),
            _ => {
                if !out.ends_with('_') {
                    out.push('_');
                }
            }
        }
    }
    out.trim_matches('_').to_string()
}

/// Turn a folder name back into a human-readable name ("marie_curie" -> "Marie Curie").
pub fn display_from_directory(dir: &str) -> String {
    dir.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn validate_part(part: &str) -> Result<String, ParseError> {
    let collapsed = part.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(ParseError::EmptyName);
    }
    let len = collapsed.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(ParseError::InvalidLength {
            len,
            min: MIN_NAME_LEN,
            max: MAX_NAME_LEN,
        });
    }
    Ok(collapsed)
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}
