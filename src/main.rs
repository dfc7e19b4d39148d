// ABOUTME: Entry point for the studio binary.
// ABOUTME: Parses CLI arguments, loads configuration, wires the studio, and runs the selected command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use studio_agent::{Aggregator, PromptGenerator, Synthesizer, create_provider, create_providers, detect_providers};
use studio_core::{PersonaName, PromptKind, TemplateStore};
use studio_github::GitHubClient;
use studio_pipeline::{
    BatchOptions, Orchestrator, PromptScanOptions, PromptStats, PublishOutcome, PublishSettings,
    Studio, StudioConfig, parse_batch_file, parse_interval,
};
use studio_store::{RawArchive, SqliteLedger, SqliteTracker};
use tokio_util::sync::CancellationToken;

/// Persona studio: turns persona requests into reviewed persona packages.
#[derive(Debug, Parser)]
#[command(name = "studio", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll for requests and feedback until interrupted (default).
    Run,

    /// Re-synthesize a published persona from its stored raw outputs.
    /// Without a name every persona folder is processed.
    Synthesize {
        /// Persona name, e.g. "Marie Curie".
        name: Option<String>,
    },

    /// Create personas for every name in a file, one per line.
    Batch {
        /// Regenerate names that were processed or published before.
        #[arg(long)]
        force: bool,
        file: PathBuf,
    },

    /// Generate derivative prompts from published personas.
    Prompts {
        /// Persona name. Omit to scan every persona with --all or --watch.
        #[arg(required_unless_present_any = ["all", "watch", "stats"])]
        name: Option<String>,
        /// Prompt kinds to generate; all kinds when omitted.
        #[arg(long = "kind", value_name = "KIND")]
        kinds: Vec<PromptKind>,
        /// Scan every persona once and generate prompts where they are
        /// missing, outdated, or requested by a README marker.
        #[arg(long, conflicts_with_all = ["name", "watch"])]
        all: bool,
        /// Keep scanning until interrupted.
        #[arg(long, conflicts_with = "name")]
        watch: bool,
        /// Time between scans with --watch; defaults to POLL_INTERVAL.
        #[arg(long, value_parser = parse_interval, requires = "watch")]
        interval: Option<Duration>,
        /// Regenerate prompts that look current.
        #[arg(long)]
        force: bool,
        /// Print prompt statistics instead of generating.
        #[arg(long, conflicts_with_all = ["all", "watch"])]
        stats: bool,
    },

    /// List ledger entries and optionally purge old ones.
    Ledger {
        /// Remove entries older than this many days.
        #[arg(long, value_name = "DAYS")]
        purge_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "studio=info,studio_pipeline=info,studio_agent=info",
                )
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = StudioConfig::from_env().context("loading configuration")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let studio = build_studio(&config)?;
            Orchestrator::new(studio, config.poll_interval).run(cancel).await;
        }
        Command::Synthesize { name: Some(name) } => {
            let studio = build_studio(&config)?;
            let name = PersonaName::parse(&name)?;
            let (dir, _) = studio
                .find_existing_persona(&name)
                .await?
                .with_context(|| format!("no published persona for {}", name.primary()))?;
            report(&dir, studio.resynthesize(&cancel, &dir).await?);
        }
        Command::Synthesize { name: None } => {
            let studio = build_studio(&config)?;
            let summary = studio.resynthesize_all(&cancel).await?;
            println!(
                "published {}, held {}, failed {}",
                summary.published, summary.held, summary.failed
            );
        }
        Command::Batch { force, file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let names = parse_batch_file(&contents);
            let options = BatchOptions {
                force,
                ..BatchOptions::default()
            };
            let studio = build_studio(&config)?;
            let summary = studio.run_batch(&cancel, &names, &options).await?;
            println!(
                "published {}, held {}, existing {}, invalid {}, failed {}",
                summary.published, summary.held, summary.existing, summary.invalid, summary.failed
            );
        }
        Command::Prompts {
            name,
            kinds,
            all,
            watch,
            interval,
            force,
            stats,
        } => {
            let kinds = if kinds.is_empty() {
                PromptKind::ALL.to_vec()
            } else {
                kinds
            };
            let options = PromptScanOptions { kinds, force };
            let studio = build_studio(&config)?;

            if stats {
                prompt_stats_command(&studio, name.as_deref()).await?;
            } else if watch {
                let interval = interval.unwrap_or(config.poll_interval);
                studio.watch_prompts(cancel, interval, &options).await;
            } else if all {
                let summary = studio.scan_prompts(&cancel, &options).await?;
                println!(
                    "published {}, held {}, current {}, failed {}",
                    summary.published, summary.held, summary.current, summary.failed
                );
            } else if let Some(name) = name {
                let name = PersonaName::parse(&name)?;
                report(
                    name.primary(),
                    studio.publish_prompts(&cancel, &name, &options.kinds).await?,
                );
            }
        }
        Command::Ledger { purge_days } => ledger_command(&config, purge_days)?,
    }

    Ok(())
}

fn report(subject: &str, outcome: PublishOutcome) {
    match outcome {
        PublishOutcome::Published(artifact) => println!("{subject}: opened {}", artifact.url),
        PublishOutcome::Skipped(reason) => println!("{subject}: skipped ({reason})"),
    }
}

async fn prompt_stats_command(studio: &Studio, name: Option<&str>) -> anyhow::Result<()> {
    let all: Vec<PromptStats> = match name {
        Some(name) => {
            let name = PersonaName::parse(name)?;
            let (dir, _) = studio
                .find_existing_persona(&name)
                .await?
                .with_context(|| format!("no published persona for {}", name.primary()))?;
            studio.prompt_stats(&dir).await?.into_iter().collect()
        }
        None => studio.prompt_stats_all().await?,
    };

    for stats in &all {
        print_prompt_stats(stats);
    }
    if name.is_none() {
        let with_prompts = all.iter().filter(|s| s.prompts_exist()).count();
        println!("{with_prompts} of {} personas have prompts", all.len());
    }
    Ok(())
}

fn print_prompt_stats(stats: &PromptStats) {
    let last = stats
        .last_published
        .as_ref()
        .map(|entry| format!("{} ({})", entry.artifact.url, entry.created_at))
        .unwrap_or_else(|| "-".to_string());
    let triggers: Vec<&str> = stats.triggers.iter().map(|k| k.as_str()).collect();
    println!(
        "{}\tprompts {} (platform {}, variation {})\ttriggers [{}]\tlast {}",
        stats.dir,
        stats.files.len(),
        stats.platform_count,
        stats.variation_count,
        triggers.join(","),
        last
    );
}

fn build_studio(config: &StudioConfig) -> anyhow::Result<Studio> {
    for info in detect_providers() {
        tracing::debug!(provider = info.name, has_api_key = info.has_api_key, model = %info.model, "provider detected");
    }

    let templates = TemplateStore::new(&config.templates_dir);
    let providers = create_providers(&config.providers)?;
    let synthesis = create_provider(&config.synthesis_provider, None)?;
    let github = config.github("persona")?;
    let settings = PublishSettings::new(github.issues_owner.clone(), github.issues_repo.clone());

    let ledger = SqliteLedger::open(&config.ledger_path())
        .context("opening ledger")?
        .with_policy(config.unknown_status_policy);
    let tracker = SqliteTracker::open(&config.tracker_path()).context("opening tracker")?;

    tracing::info!(
        providers = ?config.providers,
        synthesis = %config.synthesis_provider,
        data_dir = %config.data_dir.display(),
        "studio configured"
    );

    Ok(Studio {
        publisher: Arc::new(GitHubClient::new(github)),
        aggregator: Aggregator::new(providers).with_timeout(config.provider_timeout),
        synthesizer: Synthesizer::new(synthesis.clone(), templates.clone())
            .with_timeout(config.provider_timeout),
        prompts: PromptGenerator::new(synthesis, templates.clone())
            .with_timeout(config.provider_timeout),
        ledger,
        tracker,
        archive: RawArchive::new(config.raw_archive_dir()),
        templates,
        settings,
    })
}

fn ledger_command(config: &StudioConfig, purge_days: Option<i64>) -> anyhow::Result<()> {
    let ledger = SqliteLedger::open(&config.ledger_path()).context("opening ledger")?;

    if let Some(days) = purge_days {
        let removed = ledger.cleanup_older_than(chrono::Duration::days(days))?;
        println!("removed {removed} entries older than {days} days");
    }

    for entry in ledger.entries()? {
        println!(
            "{}\t{}\t#{}\t{}",
            entry.created_at, entry.key, entry.artifact.number, entry.artifact.url
        );
    }
    Ok(())
}
