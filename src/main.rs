// src/main.rs

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod downloader;
mod error;
mod ledger;
mod spider;

use config::Config;
use downloader::Downloader;
use spider::renderer::ChromeRenderer;
use spider::{RunState, Spider};

/// The main entry point, which dispatches to the requested command.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    // Default to a full run if no command is given.
    let command = args.get(1).map_or("run", |s| s.as_str());

    match command {
        "run" => run_pipeline(load_config(args.get(2))?).await,
        "links" => print_links(load_config(args.get(2))?).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// Logs go to stderr so `links` output stays clean on stdout.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chromiumoxide::conn=off,chromiumoxide::handler=off")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `from_file` validates what it loads; the defaults are always valid.
fn load_config(path: Option<&String>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path)),
        None => Ok(Config::default()),
    }
}

fn build_spider(config: Config) -> Result<Spider<ChromeRenderer>> {
    let renderer = ChromeRenderer::new(&config);
    let downloader = Downloader::new(&config).context("Failed to build HTTP client")?;
    Ok(Spider::new(config, renderer, downloader)?)
}

/// Renders the listing page (once), then downloads every new document.
async fn run_pipeline(config: Config) -> Result<()> {
    let spider = build_spider(config)?;
    if spider.run().await == RunState::Aborted {
        tracing::error!("Run aborted before any links were processed");
    }
    Ok(())
}

/// Prints the absolute document links without downloading them.
async fn print_links(config: Config) -> Result<()> {
    let spider = build_spider(config)?;
    for link in spider.discover().await.unwrap_or_default() {
        println!("{}", link);
    }
    Ok(())
}

/// Prints the help message for the user.
fn print_usage() {
    println!("--- SDS Harvester ---");
    println!("Usage: sds_harvest [COMMAND] [CONFIG.json]");
    println!("\nCommands:");
    println!("  run       Render the listing page and download new documents (default).");
    println!("  links     Print the document links found on the listing page.");
    println!("  help      Show this message.");
    println!("\nThe rendered page is cached; delete the snapshot file to re-scrape.");
    println!("Set RUST_LOG (e.g. RUST_LOG=debug) to change log verbosity.");
}
