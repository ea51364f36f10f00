//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;

use crate::browser::default_renderer;
use crate::config::Config;
use crate::error::Error;
use crate::fallback::{FallbackManager, SourceFetchCoordinator, SourceFetcher};
use crate::scrape::anti_detection::USER_AGENTS;
use crate::scrape::{group_by_source, ScrapeOrchestrator};
use crate::validate::{DataValidator, ValidationResult};

/// Pacing for whole-cycle scrape retries, slower than the per-attempt
/// delay inside a cycle.
const CYCLE_RETRY_WAIT_SECS: (u64, u64) = (3, 5);

#[derive(Parser)]
#[command(name = "goldwatch")]
#[command(about = "Resilient gold price acquisition with API-first failover")]
#[command(version)]
pub struct Cli {
    /// Config file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the price feed (API first, scraper fallback)
    Fetch {
        /// Override the API endpoint URL
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Run one scraper-only cycle across all site parsers
    Scrape,

    /// Check each site's landing page is reachable
    Probe,

    /// Show effective configuration and source health
    Status,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch { api_url } => cmd_fetch(&config, api_url).await,
        Commands::Scrape => cmd_scrape(&config).await,
        Commands::Probe => cmd_probe(&config).await,
        Commands::Status => cmd_status(&config),
    }
}

/// One acquisition cycle through the coordinator, then validate and print
/// the winning payload.
async fn cmd_fetch(config: &Config, api_url: Option<String>) -> anyhow::Result<()> {
    let api_url = api_url.or_else(|| config.api.url.clone());

    let renderer = default_renderer(&config.browser);
    let orchestrator = ScrapeOrchestrator::new(
        renderer,
        config.execution.clone(),
        config.anti_detection.clone(),
    );

    let manager = Arc::new(FallbackManager::new(config.fallback.clone()));
    let coordinator = SourceFetchCoordinator::new(Arc::clone(&manager));

    let api_timeout = Duration::from_secs(config.fallback.api_timeout_secs);
    let api_fetcher: Option<SourceFetcher> = api_url
        .map(|url| Box::pin(async move { fetch_api(&url, api_timeout).await }) as SourceFetcher);

    let retries = config.execution.retry_attempts;
    let scraper_fetcher: Option<SourceFetcher> = Some(Box::pin(
        orchestrator.scrape_feed_with_retry(retries, CYCLE_RETRY_WAIT_SECS),
    ));

    let outcome = coordinator
        .fetch_with_fallback(api_fetcher, scraper_fetcher)
        .await;

    let Some(data) = outcome.data else {
        eprintln!("{} no data source available", style("✗").red());
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&manager.status_summary())?
        );
        std::process::exit(1);
    };

    if outcome.used_fallback {
        println!(
            "{} acquired via fallback ({})",
            style("!").yellow(),
            outcome.source
        );
    } else {
        println!("{} acquired from {}", style("✓").green(), outcome.source);
    }

    let report = DataValidator::new(config.validation.clone()).validate(&data, outcome.source);
    print_validation(&report);

    println!("{}", data);
    println!(
        "{}",
        serde_json::to_string_pretty(&manager.status_summary())?
    );
    Ok(())
}

/// Fetch the feed JSON straight from the upstream API.
async fn fetch_api(url: &str, timeout: Duration) -> crate::error::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENTS[0])
        .build()
        .map_err(|e| Error::Network(format!("HTTP client build failed: {}", e)))?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "API returned HTTP {}",
            response.status()
        )));
    }
    Ok(response.text().await?)
}

async fn cmd_scrape(config: &Config) -> anyhow::Result<()> {
    let renderer = default_renderer(&config.browser);
    let orchestrator = ScrapeOrchestrator::new(
        renderer,
        config.execution.clone(),
        config.anti_detection.clone(),
    );

    println!("{}", style("Running scrape cycle").bold());
    let records = orchestrator.scrape_all().await;
    if records.is_empty() {
        eprintln!("{} no records from any source", style("✗").red());
        std::process::exit(1);
    }

    let grouped = group_by_source(&records);
    for (source, items) in &grouped {
        println!("{} {}: {} records", style("✓").green(), source, items.len());
    }
    println!("{}", serde_json::to_string_pretty(&grouped)?);
    Ok(())
}

async fn cmd_probe(config: &Config) -> anyhow::Result<()> {
    let renderer = default_renderer(&config.browser);
    let orchestrator = ScrapeOrchestrator::new(
        renderer,
        config.execution.clone(),
        config.anti_detection.clone(),
    );

    println!("{}", style("Probing sources").bold());
    let results = orchestrator.probe_all().await;

    let mut all_reachable = true;
    for (name, reachable) in &results {
        if *reachable {
            println!("{} {}", style("✓").green(), name);
        } else {
            println!("{} {}", style("✗").red(), name);
            all_reachable = false;
        }
    }

    if !all_reachable {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    println!("{}", style("Source health").bold());
    let summary = FallbackManager::new(config.fallback.clone()).status_summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    println!("\n{}", style("Effective configuration").bold());
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn print_validation(report: &ValidationResult) {
    let verdict = if report.is_valid {
        style("valid").green()
    } else {
        style("INVALID").red()
    };
    println!("validation: {} (score {:.1})", verdict, report.score);
    for issue in &report.issues {
        println!("  {} {}", style("issue:").red(), issue);
    }
    for warning in &report.warnings {
        println!("  {} {}", style("warning:").yellow(), warning);
    }
}
