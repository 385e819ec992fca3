//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest crawler.

use anyhow::Context;
use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::crawler::crawl;
use catalog_harvest::output::{print_statistics, CrawlStatistics, FlushDestination};
use catalog_harvest::storage::CheckpointStore;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a resumable catalog crawler
///
/// Catalog-Harvest walks the list pages of a catalog category, visits every
/// listing's detail page and stores the results in SQLite. Progress is
/// checkpointed, so an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A resumable catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring the checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Last list page to fetch, overriding the config file
    #[arg(long, value_name = "N")]
    end_page: Option<u32>,

    /// Keep card data only; do not visit detail pages
    #[arg(long)]
    no_details: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the checkpoint and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(())
    } else if cli.stats {
        handle_stats(&config);
        Ok(())
    } else {
        handle_crawl(config, config_hash).await
    }
}

/// Applies command-line overrides on top of the configuration file
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if cli.fresh {
        config.crawler.resume = false;
    } else if cli.resume {
        config.crawler.resume = true;
    }

    if let Some(end_page) = cli.end_page {
        if end_page < config.crawler.start_page {
            anyhow::bail!(
                "--end-page ({}) must be >= start-page ({})",
                end_page,
                config.crawler.start_page
            );
        }
        config.crawler.end_page = Some(end_page);
    }

    if cli.no_details {
        config.crawler.fetch_details = false;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;

    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Category: {}", crawler.category_url);
    println!("  Start page: {}", crawler.start_page);
    match crawler.end_page {
        Some(end) => println!("  End page: {}", end),
        None => println!("  End page: auto-detect (probe cap {})", crawler.max_pages),
    }
    println!("  Max concurrent: {}", crawler.max_concurrent);
    println!("  Fetch details: {}", crawler.fetch_details);
    println!(
        "  Retries: {} (base {}ms, max {}ms)",
        crawler.max_retries, crawler.retry_base_delay_ms, crawler.retry_max_delay_ms
    );
    println!("  Request timeout: {}s", crawler.request_timeout_secs);
    println!("  Auto-save interval: {}", crawler.auto_save_interval);
    println!("  Resume: {}", crawler.resume);

    println!("\nUser Agent:");
    println!("  User-Agent: {}", config.user_agent.user_agent);
    println!("  Accept-Language: {}", config.user_agent.accept_language);
    if let Some(referer) = &config.user_agent.referer {
        println!("  Referer: {}", referer);
    }

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Database: {}", config.output.database_path);
    println!("  Fallback: {}", config.output.fallback_path);
    println!("  Failed URLs: {}", config.output.failed_urls_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the checkpoint
fn handle_stats(config: &Config) {
    let store = CheckpointStore::new(&config.output.checkpoint_path);
    println!("Checkpoint: {}\n", store.path().display());

    let state = store.load(&config.crawler.category_url);
    print_statistics(&CrawlStatistics::from_state(&state));
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    if config.crawler.resume {
        tracing::info!("Starting crawl (will resume from checkpoint if present)");
    } else {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    }

    match crawl(config, Some(config_hash)).await {
        Ok(summary) => {
            let destination = match &summary.flush.destination {
                FlushDestination::Primary(path) => path.display().to_string(),
                FlushDestination::Fallback(path) => format!("{} (fallback)", path.display()),
            };
            if summary.interrupted {
                tracing::info!(
                    pending = summary.pending,
                    "Crawl interrupted; run again to resume"
                );
            }
            tracing::info!(
                "Wrote {} listings to {} ({} failed URLs)",
                summary.flush.written,
                destination,
                summary.failed
            );
            Ok(())
        }
        Err(e) => Err(e).context("Crawl failed"),
    }
}
