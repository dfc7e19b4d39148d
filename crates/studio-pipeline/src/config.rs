// ABOUTME: Configuration loading for the persona studio from environment variables.
// ABOUTME: Covers repositories, labels, data and template paths, polling, providers, and ledger policy.

use std::path::PathBuf;
use std::time::Duration;

use studio_github::GitHubConfig;
use studio_store::UnknownStatusPolicy;
use thiserror::Error;

const DEFAULT_PROVIDERS: &str = "anthropic,gemini,grok,openai";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Studio configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub github_token: Option<String>,
    pub github_owner: Option<String>,
    pub github_repo: Option<String>,
    pub personas_owner: String,
    pub personas_repo: String,
    pub persona_label: String,
    pub update_label: String,
    pub github_api_url: String,
    pub data_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub poll_interval: Duration,
    pub provider_timeout: Duration,
    pub providers: Vec<String>,
    pub synthesis_provider: String,
    pub unknown_status_policy: UnknownStatusPolicy,
}

impl StudioConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Environment variables:
    /// - GITHUB_TOKEN, GITHUB_OWNER, GITHUB_REPO: required by commands that talk to GitHub
    /// - PERSONAS_OWNER / PERSONAS_REPO: package repository (default: twin2ai/personas)
    /// - PERSONA_LABEL / UPDATE_LABEL: request labels (default: create-persona / update-persona)
    /// - GITHUB_API_URL: REST base URL (default: https://api.github.com)
    /// - STUDIO_HOME or DATA_DIR: ledger, tracker and raw archive (default: ./data)
    /// - TEMPLATES_DIR: prompt templates (default: ./prompts)
    /// - POLL_INTERVAL: `Ns`, `Nm`, `Nh` or bare seconds (default: 5m)
    /// - PROVIDER_TIMEOUT_SECS: per-call budget (default: 600)
    /// - STUDIO_PROVIDERS: comma-separated registration order
    /// - SYNTHESIS_PROVIDER: designated merge provider (default: gemini)
    /// - UNKNOWN_STATUS_POLICY: `pending` or `released` (default: pending)
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = var("STUDIO_HOME")
            .or_else(|| var("DATA_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let poll_interval = match var("POLL_INTERVAL") {
            Some(raw) => parse_interval(&raw).map_err(|reason| ConfigError::Invalid {
                var: "POLL_INTERVAL",
                value: raw.clone(),
                reason,
            })?,
            None => Duration::from_secs(300),
        };

        let provider_timeout = match var("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "PROVIDER_TIMEOUT_SECS",
                        value: raw,
                        reason: "expected a positive number of seconds".to_string(),
                    });
                }
            },
            None => Duration::from_secs(600),
        };

        let providers: Vec<String> = var("STUDIO_PROVIDERS")
            .unwrap_or_else(|| DEFAULT_PROVIDERS.to_string())
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if providers.is_empty() {
            return Err(ConfigError::Invalid {
                var: "STUDIO_PROVIDERS",
                value: String::new(),
                reason: "at least one provider is required".to_string(),
            });
        }

        let unknown_status_policy = match var("UNKNOWN_STATUS_POLICY") {
            Some(raw) => raw.parse().map_err(|e: studio_store::ledger::UnknownPolicyName| {
                ConfigError::Invalid {
                    var: "UNKNOWN_STATUS_POLICY",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => UnknownStatusPolicy::default(),
        };

        Ok(Self {
            github_token: var("GITHUB_TOKEN"),
            github_owner: var("GITHUB_OWNER"),
            github_repo: var("GITHUB_REPO"),
            personas_owner: var("PERSONAS_OWNER").unwrap_or_else(|| "twin2ai".to_string()),
            personas_repo: var("PERSONAS_REPO").unwrap_or_else(|| "personas".to_string()),
            persona_label: var("PERSONA_LABEL").unwrap_or_else(|| "create-persona".to_string()),
            update_label: var("UPDATE_LABEL").unwrap_or_else(|| "update-persona".to_string()),
            github_api_url: var("GITHUB_API_URL")
                .unwrap_or_else(|| "https://api.github.com".to_string()),
            data_dir,
            templates_dir: var("TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./prompts")),
            poll_interval,
            provider_timeout,
            providers,
            synthesis_provider: var("SYNTHESIS_PROVIDER")
                .map(|p| p.to_lowercase())
                .unwrap_or_else(|| "gemini".to_string()),
            unknown_status_policy,
        })
    }

    /// GitHub settings, failing when the repository or token is unset.
    pub fn github(&self, branch_prefix: &str) -> Result<GitHubConfig, ConfigError> {
        Ok(GitHubConfig {
            api_url: self.github_api_url.clone(),
            token: self
                .github_token
                .clone()
                .ok_or(ConfigError::Missing("GITHUB_TOKEN"))?,
            issues_owner: self
                .github_owner
                .clone()
                .ok_or(ConfigError::Missing("GITHUB_OWNER"))?,
            issues_repo: self
                .github_repo
                .clone()
                .ok_or(ConfigError::Missing("GITHUB_REPO"))?,
            personas_owner: self.personas_owner.clone(),
            personas_repo: self.personas_repo.clone(),
            create_label: self.persona_label.clone(),
            update_label: self.update_label.clone(),
            branch_prefix: branch_prefix.to_string(),
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }

    pub fn tracker_path(&self) -> PathBuf {
        self.data_dir.join("tracker.db")
    }

    pub fn raw_archive_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `30s`, `5m`, `1h`, or a bare number of seconds.
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.char_indices().last() {
        Some((i, 's')) => (&raw[..i], 1),
        Some((i, 'm')) => (&raw[..i], 60),
        Some((i, 'h')) => (&raw[..i], 3600),
        _ => (raw, 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("expected a duration like 30s, 5m or 1h, got '{raw}'"))?;
    if value == 0 {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(Duration::from_secs(value * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "GITHUB_TOKEN",
        "GITHUB_OWNER",
        "GITHUB_REPO",
        "PERSONAS_OWNER",
        "PERSONAS_REPO",
        "PERSONA_LABEL",
        "UPDATE_LABEL",
        "GITHUB_API_URL",
        "STUDIO_HOME",
        "DATA_DIR",
        "TEMPLATES_DIR",
        "POLL_INTERVAL",
        "PROVIDER_TIMEOUT_SECS",
        "STUDIO_PROVIDERS",
        "SYNTHESIS_PROVIDER",
        "UNKNOWN_STATUS_POLICY",
    ];

    fn clear_env() {
        for name in VARS {
            // SAFETY: serialized by ENV_MUTEX
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn config_loads_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = StudioConfig::from_env().unwrap();

        assert_eq!(config.personas_owner, "twin2ai");
        assert_eq!(config.personas_repo, "personas");
        assert_eq!(config.persona_label, "create-persona");
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.provider_timeout, Duration::from_secs(600));
        assert_eq!(config.providers, vec!["anthropic", "gemini", "grok", "openai"]);
        assert_eq!(config.synthesis_provider, "gemini");
        assert_eq!(config.unknown_status_policy, UnknownStatusPolicy::Pending);
        assert_eq!(config.ledger_path(), PathBuf::from("./data/ledger.db"));
    }

    #[test]
    fn config_reads_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("DATA_DIR", "/var/lib/studio");
            std::env::set_var("POLL_INTERVAL", "90");
            std::env::set_var("STUDIO_PROVIDERS", "Grok, openai");
            std::env::set_var("UNKNOWN_STATUS_POLICY", "released");
        }

        let config = StudioConfig::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/studio"));
        assert_eq!(config.poll_interval, Duration::from_secs(90));
        assert_eq!(config.providers, vec!["grok", "openai"]);
        assert_eq!(config.unknown_status_policy, UnknownStatusPolicy::Released);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_MUTEX
        unsafe { std::env::set_var("POLL_INTERVAL", "soon") };

        let result = StudioConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL"), "got: {err}");
    }

    #[test]
    fn github_settings_require_token_and_repo() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("GITHUB_OWNER", "twin2ai");
            std::env::set_var("GITHUB_REPO", "studio");
        }

        let config = StudioConfig::from_env().unwrap();
        let missing = config.github("persona").unwrap_err();
        assert!(matches!(missing, ConfigError::Missing("GITHUB_TOKEN")));

        // SAFETY: serialized by ENV_MUTEX
        unsafe { std::env::set_var("GITHUB_TOKEN", "ghp_x") };
        let config = StudioConfig::from_env().unwrap();
        clear_env();

        let github = config.github("persona").unwrap();
        assert_eq!(github.issues_repo, "studio");
        assert_eq!(github.personas_repo, "personas");
    }

    #[test]
    fn intervals_parse() {
        assert_eq!(parse_interval("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_interval("45").unwrap(), Duration::from_secs(45));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("m").is_err());
        assert!(parse_interval("five minutes").is_err());
    }
}
