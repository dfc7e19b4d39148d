// ABOUTME: Repository layout of published persona packages: folders, file paths, branches.
// ABOUTME: Also renders the package README, reads its prompt-generation markers, and parses issue back-references.

use std::sync::LazyLock;

use regex::Regex;

use crate::name::PersonaName;
use crate::prompt_kind::PromptKind;

pub const PERSONAS_ROOT: &str = "personas";
pub const USER_SUPPLIED_FILE: &str = "user_supplied";
pub const USER_UPDATE_FILE: &str = "user_update";

/// README markers asking for derivative prompts.
const PROMPT_TRIGGERS: [(&str, PromptGroup); 3] = [
    ("<!-- GENERATE:prompts -->", PromptGroup::All),
    ("<!-- GENERATE:platform_prompts -->", PromptGroup::Platform),
    ("<!-- GENERATE:variation_prompts -->", PromptGroup::Variation),
];

#[derive(Clone, Copy)]
enum PromptGroup {
    All,
    Platform,
    Variation,
}

impl PromptGroup {
    fn contains(self, kind: PromptKind) -> bool {
        match self {
            Self::All => true,
            Self::Platform => kind.is_platform(),
            Self::Variation => !kind.is_platform(),
        }
    }
}

static ISSUE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Created from issue: [\w.-]+/[\w.-]+#(\d+)").expect("issue reference pattern compiles")
});

pub fn persona_dir(dir: &str) -> String {
    format!("{PERSONAS_ROOT}/{dir}")
}

/// Raw output of one provider (or the user) inside a package.
pub fn raw_path(dir: &str, source: &str) -> String {
    format!("{PERSONAS_ROOT}/{dir}/raw/{source}.md")
}

pub fn synthesized_path(dir: &str) -> String {
    format!("{PERSONAS_ROOT}/{dir}/synthesized.md")
}

pub fn readme_path(dir: &str) -> String {
    format!("{PERSONAS_ROOT}/{dir}/README.md")
}

pub fn prompts_dir(dir: &str) -> String {
    format!("{PERSONAS_ROOT}/{dir}/prompts")
}

pub fn prompt_path(dir: &str, kind: PromptKind) -> String {
    format!("{}/{}", prompts_dir(dir), kind.output_file())
}

/// Prompt kinds requested by markers in a package README, in canonical order.
pub fn readme_prompt_triggers(readme: &str) -> Vec<PromptKind> {
    let groups: Vec<PromptGroup> = PROMPT_TRIGGERS
        .iter()
        .filter(|(marker, _)| readme.contains(marker))
        .map(|(_, group)| *group)
        .collect();
    PromptKind::ALL
        .into_iter()
        .filter(|kind| groups.iter().any(|g| g.contains(*kind)))
        .collect()
}

/// The README with every prompt marker line removed, so a merged prompts PR
/// does not trigger another round.
pub fn strip_prompt_triggers(readme: &str) -> String {
    let mut out: String = readme
        .lines()
        .filter(|line| !PROMPT_TRIGGERS.iter().any(|(marker, _)| line.trim() == *marker))
        .map(|line| format!("{line}\n"))
        .collect();
    for (marker, _) in PROMPT_TRIGGERS {
        out = out.replace(marker, "");
    }
    out
}

/// Branch for a new persona package.
pub fn branch_name(prefix: &str, name: &PersonaName, suffix: &str) -> String {
    format!("{prefix}/{}-{suffix}", name.slug())
}

/// Line placed in PR bodies linking back to the request issue.
pub fn issue_reference(owner: &str, repo: &str, number: u64) -> String {
    format!("Created from issue: {owner}/{repo}#{number}")
}

/// Recover the request issue number from a PR body written by [`issue_reference`].
pub fn parse_issue_reference(body: &str) -> Option<u64> {
    ISSUE_REFERENCE
        .captures(body)
        .and_then(|caps| caps[1].parse().ok())
}

/// README for a persona package, listing which sources contributed.
pub fn package_readme(name: &PersonaName, sources: &[String], has_user_supplied: bool) -> String {
    let mut readme = format!("# {}\n\n", name.primary());
    if let Some(real) = name.real() {
        readme.push_str(&format!("Also known as: {real}\n\n"));
    }
    readme.push_str("## Files\n\n");
    readme.push_str("- `synthesized.md`: the combined persona\n");
    for source in sources {
        readme.push_str(&format!("- `raw/{source}.md`: raw output from {source}\n"));
    }
    if has_user_supplied {
        readme.push_str(&format!(
            "- `raw/{USER_SUPPLIED_FILE}.md`: persona supplied with the request\n"
        ));
    }
    readme
}
