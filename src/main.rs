//! Webtrace main entry point
//!
//! This is the command-line interface for the Webtrace collector.

use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webtrace::browser::ChromeSessionFactory;
use webtrace::collector::{scan_once, Collector};
use webtrace::config::load_config_with_hash;
use webtrace::storage::SqliteStoreFactory;

/// Webtrace: a page-level network activity collector
///
/// Webtrace loads pages in real Chrome, records the devtools network
/// events each load produces, and stores one record per contacted
/// resource together with cookies and page links.
#[derive(Parser, Debug)]
#[command(name = "webtrace")]
#[command(version = "1.0.0")]
#[command(about = "A page-level network activity collector", long_about = None)]
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

    /// Scan a single URL and print a report instead of running the pool
    #[arg(long, value_name = "URL", conflicts_with = "dry_run")]
    single: Option<String>,

    /// Validate config and show what would be scanned without scanning
    #[arg(long, conflicts_with = "single")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if let Some(url) = cli.single {
        handle_single(config, &url).await?;
    } else {
        handle_run(config).await?;
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
            0 => EnvFilter::new("webtrace=info,warn"),
            1 => EnvFilter::new("webtrace=debug,info"),
            2 => EnvFilter::new("webtrace=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be scanned
fn handle_dry_run(config: &webtrace::Config) -> anyhow::Result<()> {
    use webtrace::collector::read_page_list;

    println!("=== Webtrace Dry Run ===\n");

    println!("Collector Configuration:");
    println!("  Pool size: {}", config.collector.pool_size);
    println!("  Page list: {}", config.collector.page_list);
    println!("  Timeseries: {}", config.collector.timeseries);
    if config.collector.timeseries {
        println!("  Interval: {} minutes", config.collector.interval_minutes);
    }

    println!("\nBrowser:");
    let variants: Vec<&str> = config
        .browser
        .variants
        .iter()
        .map(|v| v.as_str())
        .collect();
    println!("  Variants: {}", variants.join(", "));
    println!("  Settle wait: {}s", config.browser.settle_wait_seconds);
    println!("  Page timeout: {}s", config.browser.page_timeout_seconds);
    println!("  DNT header: {}", config.browser.dnt);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let pages = read_page_list(std::path::Path::new(&config.collector.page_list))?;
    println!("\nPages ({}):", pages.len());
    for page in &pages {
        println!("  - {}", page);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would scan {} pages under {} variant(s)",
        pages.len(),
        config.browser.variants.len()
    );

    Ok(())
}

/// Handles the --single mode: scans one URL and prints a report to stdout
async fn handle_single(config: webtrace::Config, url: &str) -> anyhow::Result<()> {
    let url = url::Url::parse(url)?;
    let variant = *config
        .browser
        .variants
        .first()
        .ok_or_else(|| anyhow!("no browser variants configured"))?;

    println!("Scanning {} under {}...\n", url, variant);

    let sessions = ChromeSessionFactory::new(config.browser.clone());
    let result = scan_once(&config, &sessions, &url, variant).await?;

    println!("=== Scan Report ===");
    println!("Start URL:  {}", result.start_url);
    println!("Final URL:  {}", result.final_url);
    if let Some(title) = &result.title {
        println!("Title:      {}", title);
    }
    if let Some(version) = &result.browser_version {
        println!("Browser:    {}", version);
    }
    match result.page_load_time_ms {
        Some(ms) => println!("Load time:  {} ms", ms),
        None => println!("Load time:  (not measurable)"),
    }

    println!("\nResources ({}):", result.resources.len());
    for (resource_url, record) in &result.resources {
        let status = record
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let size = record
            .body_size
            .map(|s| format!("{} bytes", s))
            .unwrap_or_else(|| "-".to_string());
        println!("  [{}] {} ({})", status, resource_url, size);
    }

    println!("\nCookies ({}):", result.cookies.len());
    for cookie in &result.cookies {
        println!("  {} @ {}", cookie.name, cookie.domain);
    }

    println!("\nLinks ({}):", result.links.len());
    for link in &result.links {
        println!("  {}", link.href);
    }

    Ok(())
}

/// Handles the main collection run
async fn handle_run(config: webtrace::Config) -> anyhow::Result<()> {
    let sessions = Arc::new(ChromeSessionFactory::new(config.browser.clone()));
    let stores = Arc::new(SqliteStoreFactory::new(config.output.database_path.clone()));

    let collector = Collector::new(config, sessions, stores);
    match collector.run().await {
        Ok(summary) => {
            tracing::info!(
                "Collection finished: {}/{} scans stored",
                summary.succeeded,
                summary.attempted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Collection failed: {}", e);
            Err(e.into())
        }
    }
}
