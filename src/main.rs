//! Kumo-Frontier main entry point
//!
//! This is the command-line interface for the frontier service: `serve`
//! runs the engine behind the RPC surface, `put` streams URLs from a file
//! into a running service, `stats` queries the control surface.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kumo_frontier::config::{load_config_with_hash, Config};
use kumo_frontier::engine::Engine;
use kumo_frontier::service::{parse_line, stream_items, FrontierClient, Server};
use kumo_frontier::storage::open_store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Kumo-Frontier: a polite URL frontier service
///
/// The frontier accepts streams of discovered URLs, deduplicates and
/// persists them per (crawl, queue) pair, and serves them back under
/// politeness and fairness constraints. It schedules; it does not crawl.
#[derive(Parser, Debug)]
#[command(name = "kumo-frontier")]
#[command(version = "1.0.0")]
#[command(about = "A polite URL frontier service", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the frontier service
    Serve {
        /// Path to TOML configuration file; defaults apply when omitted
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Stream URLs from a file into a running service
    Put {
        /// File with one URL or JSON item per line
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Service address
        #[arg(long, default_value = "127.0.0.1:7070")]
        addr: String,

        /// Crawl id for plain-URL lines
        #[arg(long, default_value = "default")]
        crawl: String,
    },

    /// Show aggregate stats from a running service
    Stats {
        /// Service address
        #[arg(long, default_value = "127.0.0.1:7070")]
        addr: String,

        /// Restrict to one crawl
        #[arg(long)]
        crawl: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve { config } => handle_serve(config).await?,
        Command::Put { file, addr, crawl } => handle_put(&file, &addr, &crawl).await?,
        Command::Stats { addr, crawl } => handle_stats(&addr, crawl).await?,
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
            0 => EnvFilter::new("kumo_frontier=info,warn"),
            1 => EnvFilter::new("kumo_frontier=debug,info"),
            2 => EnvFilter::new("kumo_frontier=trace,debug"),
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

/// Handles the serve command: store, engine, listener, accept loop
async fn handle_serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(&path) {
                Ok((config, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    let store = open_store(&config.store).context("failed to open store backend")?;
    tracing::info!("Store backend: {}", config.store.backend);

    let engine = Arc::new(Engine::new(store, config.frontier.clone()).await?);

    let server = Server::bind(engine, &config.server).await?;
    server.run().await?;

    Ok(())
}

/// Handles the put command: the thin client shell streaming a file
async fn handle_put(file: &PathBuf, addr: &str, crawl: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut items = Vec::new();
    let mut unparsable = 0u64;
    for line in content.lines() {
        match parse_line(line, crawl) {
            None => continue,
            Some(Ok(item)) => items.push(item),
            Some(Err(e)) => {
                tracing::warn!("Skipping unparsable line: {}", e);
                unparsable += 1;
            }
        }
    }

    tracing::info!("Streaming {} items to {}", items.len(), addr);
    let summary = stream_items(addr, items).await?;

    println!("=== Ingest Summary ===");
    println!("  OK:      {}", summary.ok);
    println!("  SKIPPED: {}", summary.skipped);
    println!("  FAIL:    {}", summary.failed);
    if unparsable > 0 {
        println!("  Unparsable lines: {}", unparsable);
    }

    Ok(())
}

/// Handles the stats command
async fn handle_stats(addr: &str, crawl: Option<String>) -> anyhow::Result<()> {
    let mut client = FrontierClient::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let stats = client.get_stats(crawl.clone()).await?;

    match crawl {
        Some(crawl) => println!("=== Frontier Statistics ({}) ===\n", crawl),
        None => println!("=== Frontier Statistics ===\n"),
    }
    println!("  Queues:    {}", stats.queues);
    println!("  Active:    {}", stats.active);
    println!("  In-flight: {}", stats.in_flight);
    println!("  Completed: {}", stats.completed);
    if !stats.healthy {
        println!("\n  WARNING: engine is unhealthy (read-only mode)");
    }

    Ok(())
}
