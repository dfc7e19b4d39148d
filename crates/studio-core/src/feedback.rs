// ABOUTME: Classifies pull request comments as regeneration feedback and formats them for prompts.
// ABOUTME: Also owns the hidden marker that identifies comments written by the studio itself.

/// Hidden marker appended to every comment the studio posts.
pub const BOT_MARKER: &str = "<!-- persona-studio -->";

const FEEDBACK_KEYWORDS: &[&str] = &[
    "truncated",
    "incomplete",
    "missing",
    "too short",
    "needs more",
    "expand",
    "add more",
    "please include",
    "could you add",
    "lacking",
    "insufficient",
    "update",
    "change",
    "improve",
    "regenerate",
    "redo",
    "revise",
];

/// True when the comment asks for changes to the generated persona.
pub fn is_feedback(body: &str) -> bool {
    let lower = body.to_lowercase();
    FEEDBACK_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// True for comments posted by the studio.
pub fn is_bot_comment(body: &str) -> bool {
    body.contains(BOT_MARKER)
}

/// Append the bot marker so the comment is never treated as feedback later.
pub fn sign(body: &str) -> String {
    format!("{body}\n\n{BOT_MARKER}")
}

/// Render feedback items as a numbered list, one per line.
pub fn format_feedback(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}\n", i + 1, item.trim()))
        .collect()
}

/// Tracker key for a processed comment.
pub fn comment_key(artifact_number: u64, comment_id: u64) -> String {
    format!("{artifact_number}-{comment_id}")
}
