//! Request-Pacer main entry point
//!
//! Fetches a list of URLs through one paced scheduler and prints one status
//! line per URL.

use anyhow::Context;
use clap::Parser;
use request_pacer::config::{load_config_with_hash, Config};
use request_pacer::{Pacer, RequestSpec};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Request-Pacer: fetch URLs politely
///
/// All URLs share one session (cookie jar) and are paced by the limits in the
/// configuration file: concurrency, periodic cooldowns, a per-minute ceiling
/// and automatic retries of transient failures.
#[derive(Parser, Debug)]
#[command(name = "request-pacer")]
#[command(version)]
#[command(about = "Fetch URLs through an adaptive request scheduler", long_about = None)]
struct Cli {
    /// URLs to fetch, in submission order
    #[arg(value_name = "URL", required_unless_present = "dry_run")]
    urls: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Do not retry failed requests
    #[arg(long)]
    no_retry: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if cli.dry_run {
        print_config(&config);
        return Ok(());
    }

    run(config, &cli.urls, cli.no_retry).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("request_pacer=info,warn"),
            1 => EnvFilter::new("request_pacer=debug,info"),
            2 => EnvFilter::new("request_pacer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode
fn print_config(config: &Config) {
    let scheduler = &config.scheduler;
    println!("=== Request-Pacer Dry Run ===\n");

    println!("Scheduler:");
    println!("  Max slots: {}", scheduler.max_slots);
    if scheduler.sleep_every > 0 {
        println!(
            "  Cooldown: {}ms every {} requests",
            scheduler.sleep_for, scheduler.sleep_every
        );
    } else {
        println!("  Cooldown: disabled");
    }
    if scheduler.max_per_minute > 0 {
        println!("  Max per minute: {}", scheduler.max_per_minute);
    } else {
        println!("  Max per minute: unlimited");
    }
    println!("  Max retries: {}", scheduler.max_retries);
    let mut codes: Vec<_> = scheduler
        .transient_codes
        .iter()
        .map(|code| code.as_str())
        .collect();
    codes.sort_unstable();
    println!("  Transient codes: {}", codes.join(", "));

    println!("\nTransport:");
    println!("  User agent: {}", config.transport.user_agent);
    println!("  Timeout: {}ms", config.transport.timeout);
    println!("  Connect timeout: {}ms", config.transport.connect_timeout);
    println!("  HTTPS only: {}", config.transport.https_only);
    for (name, value) in &config.transport.headers {
        println!("  Header: {}: {}", name, value);
    }
}

/// Fetches every URL through one pacer and prints the outcomes in order
async fn run(config: Config, urls: &[String], no_retry: bool) -> anyhow::Result<()> {
    let pacer = Pacer::new(config)?;

    let mut pending = Vec::with_capacity(urls.len());
    for url in urls {
        let mut request = RequestSpec::get(url).with_context(|| format!("invalid URL {}", url))?;
        if no_retry {
            request = request.no_retry();
        }
        pending.push((url, pacer.dispatch(request)));
    }

    let mut failures = 0usize;
    for (url, request) in pending {
        match request.await {
            Ok(response) => {
                println!("{} {} {}", response.status.as_u16(), response.body.len(), url);
            }
            Err(e) => {
                failures += 1;
                let code = e.code().map(|code| code.as_str()).unwrap_or("ERR");
                println!("ERR {} {}", code, url);
                tracing::warn!("{}", e);
            }
        }
    }

    let stats = pacer.stats();
    tracing::info!(
        "Fetched {} URLs ({} failed, {} attempts, {} retries)",
        urls.len(),
        failures,
        stats.dispatched,
        stats.retried
    );

    if failures > 0 {
        anyhow::bail!("{} of {} requests failed", failures, urls.len());
    }
    Ok(())
}
