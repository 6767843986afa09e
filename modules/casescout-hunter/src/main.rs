use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use casescout_common::{Article, Case, Config};
use casescout_hunter::assess::AssessmentEngine;
use casescout_hunter::backends::{
    BackendClient, BraveBackend, ExaBackend, VimeoBackend, YoutubeBackend,
};
use casescout_hunter::funnel::SearchFunnel;
use casescout_hunter::identity::KnownKeys;
use casescout_hunter::intake::{IntakeDecision, IntakeGate};
use casescout_hunter::knowledge;
use casescout_hunter::prescore;
use casescout_hunter::queue::{CaseQueue, RunOptions};
use casescout_hunter::store::{CaseStore, MemoryStore};
use openrouter_client::OpenRouterClient;

#[derive(Parser)]
#[command(name = "casescout", about = "Evidence artifact discovery and assessment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate configuration and report per-provider availability.
    Check,
    /// Assess unassessed cases through the funnel and classifier.
    Run {
        /// JSON file holding an array of cases to queue.
        #[arg(long)]
        cases: PathBuf,
        /// Process at most this many cases.
        #[arg(long)]
        limit: Option<usize>,
        /// Full pipeline, no persistence writes.
        #[arg(long)]
        dry_run: bool,
        /// Only cases from this region.
        #[arg(long)]
        region: Option<String>,
        /// Only the case with this exact key.
        #[arg(long = "case")]
        case_key: Option<String>,
    },
    /// Score an article against the prescore gate. No side effects.
    Prescore {
        #[arg(long)]
        region: String,
        /// Read the article text from a file.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Article text given inline.
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Run one article through the intake gate (prescore, key,
    /// duplicate check) without persisting anything.
    Triage {
        /// JSON file holding one article.
        #[arg(long)]
        article: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("casescout_hunter=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check => check(),
        Command::Run {
            cases,
            limit,
            dry_run,
            region,
            case_key,
        } => {
            run(cases, RunOptions {
                limit,
                dry_run,
                region,
                case_key,
            })
            .await
        }
        Command::Prescore {
            region,
            file,
            text,
            url,
        } => prescore_article(&region, file, text, &url),
        Command::Triage { article } => triage_article(article).await,
    }
}

fn check() -> Result<()> {
    match Config::from_env() {
        Ok(config) => {
            println!("Configuration OK");
            for (provider, available) in config.provider_report() {
                let status = if available { "available" } else { "not configured" };
                println!("  {provider:<12} {status}");
            }
            println!("Regions: {}", knowledge::supported_regions().join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cases_path: PathBuf, options: RunOptions) -> Result<()> {
    let config = Config::from_env()?;
    info!("casescout starting");

    let raw = std::fs::read_to_string(&cases_path)
        .with_context(|| format!("reading {}", cases_path.display()))?;
    let cases: Vec<Case> = serde_json::from_str(&raw).context("parsing cases file")?;
    let store = MemoryStore::with_cases(cases);

    let mut video_backends: Vec<Box<dyn BackendClient>> = Vec::new();
    if let Some(key) = &config.youtube_api_key {
        video_backends.push(Box::new(YoutubeBackend::new(key.clone())));
    }
    if let Some(token) = &config.vimeo_access_token {
        video_backends.push(Box::new(VimeoBackend::new(token.clone())));
    }
    let keyword_backend: Option<Box<dyn BackendClient>> = config
        .brave_api_key
        .as_ref()
        .map(|key| Box::new(BraveBackend::new(key.clone())) as Box<dyn BackendClient>);
    let fallback_backend: Option<Box<dyn BackendClient>> = config
        .exa_api_key
        .as_ref()
        .map(|key| Box::new(ExaBackend::new(key.clone())) as Box<dyn BackendClient>);

    for (provider, available) in config.provider_report() {
        if !available {
            info!(provider, "Provider not configured, backend disabled");
        }
    }

    let funnel = SearchFunnel::new(video_backends, keyword_backend, fallback_backend, &config);
    let engine = AssessmentEngine::new(OpenRouterClient::new(
        config.openrouter_api_key.clone(),
        config.openrouter_model.clone(),
    ));
    let queue = CaseQueue::new(
        funnel,
        engine,
        &store,
        Duration::from_millis(config.case_delay_ms),
    );

    let stats = queue.run(&options).await?;
    println!("{stats}");
    Ok(())
}

fn prescore_article(
    region: &str,
    file: Option<PathBuf>,
    text: Option<String>,
    url: &str,
) -> Result<()> {
    // Scoring is pure and needs no credentials; fall back to default
    // weights when the full config is absent.
    let weights = Config::from_env().map(|c| c.prescore).unwrap_or_default();
    let profile = knowledge::jurisdiction_profile(region)
        .with_context(|| format!("unknown region: {region}"))?;

    let body = match (file, text) {
        (Some(path), _) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, Some(inline)) => inline,
        (None, None) => anyhow::bail!("either --file or --text is required"),
    };

    let result = prescore::score(&body, url, &profile, &weights);
    println!(
        "score: {} (threshold {}) -> {}",
        result.score,
        result.threshold,
        if result.passed { "PASS" } else { "REJECT" }
    );
    for signal in &result.matched_signals {
        println!("  {signal}");
    }
    Ok(())
}

async fn triage_article(article_path: PathBuf) -> Result<()> {
    let weights = Config::from_env().map(|c| c.prescore).unwrap_or_default();
    let raw = std::fs::read_to_string(&article_path)
        .with_context(|| format!("reading {}", article_path.display()))?;
    let article: Article = serde_json::from_str(&raw).context("parsing article file")?;

    let store = MemoryStore::new();
    let mut known = KnownKeys::load(store.load_known_keys().await?);
    let gate = IntakeGate::new(weights, true);

    match gate.process(&article, &mut known, &store).await? {
        IntakeDecision::Rejected { prescore, reason } => {
            println!("{reason}");
            for signal in &prescore.matched_signals {
                println!("  {signal}");
            }
        }
        IntakeDecision::Duplicate { key, of } => {
            println!("DUPLICATE: {key} already claimed by {of}");
        }
        IntakeDecision::Promoted { case } => {
            println!("PROMOTED: {}", case.key);
            for url in &case.known_urls {
                println!("  known url: {url}");
            }
        }
    }
    Ok(())
}
