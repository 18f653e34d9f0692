use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use core_logic::{
    load_contracts, setup_logger, shutdown_token, CheckpointStore, CrawlerConfig, ResourcePool,
};
use dotenv::dotenv;
use holders_crawler::client::{probe_proxies, ChainbaseClient};
use holders_crawler::config::load_settings;
use holders_crawler::runtime::{open_proxy_pool, Runtime};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Resumable token holder crawler", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/crawler.toml")]
    config: String,
    /// Show pool, retry and page-level logs
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every contract in the contract list, resuming unfinished ones first
    Crawl {
        #[arg(long)]
        contracts: Option<PathBuf>,
        #[arg(short, long)]
        workers: Option<usize>,
        #[arg(short, long)]
        export_metrics: Option<PathBuf>,
    },
    /// Probe every proxy and persist the result in the proxy pool snapshot
    CheckProxies {
        #[arg(long, default_value = "https://api.chainbase.online")]
        probe_url: String,
        #[arg(long, default_value = "50")]
        concurrency: usize,
    },
    /// Show unfinished contracts and proxy pool health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let _log_guard = setup_logger(args.verbose);
    info!("Loading config from: {}", args.config);
    let config = load_settings(&args.config)?;

    match args.command {
        Command::Crawl {
            contracts,
            workers,
            export_metrics,
        } => crawl(config, contracts, workers, export_metrics).await,
        Command::CheckProxies {
            probe_url,
            concurrency,
        } => check_proxies(&config, &probe_url, concurrency).await,
        Command::Status => status(&config).await,
    }
}

async fn crawl(
    config: CrawlerConfig,
    contracts_file: Option<PathBuf>,
    workers: Option<usize>,
    export_metrics: Option<PathBuf>,
) -> Result<()> {
    let contracts_file = contracts_file.unwrap_or_else(|| config.paths.contracts_file.clone());
    let contracts = load_contracts(&contracts_file)
        .with_context(|| format!("Failed to load contracts from {}", contracts_file.display()))?;

    let api = Arc::new(ChainbaseClient::new(&config.chainbase));
    let runtime = Runtime::build(config, api).await?;
    let cancel = shutdown_token();

    let results = runtime.scheduler(workers).run(contracts, &cancel).await;

    match runtime.store.list_unfinished_contracts().await {
        Ok(unfinished) if !unfinished.is_empty() => {
            println!(
                "{} {} contract(s) left unfinished; rerun to resume:",
                "⚠".yellow(),
                unfinished.len()
            );
            for address in unfinished {
                println!("  - {}", address);
            }
        }
        Ok(_) => {}
        Err(e) => error!("Could not list unfinished contracts: {}", e),
    }

    let new_holders: usize = results.iter().map(|r| r.new_holders().len()).sum();
    println!(
        "{} {} contracts processed, {} new holders",
        "✔".green(),
        results.len(),
        new_holders
    );

    if let Some(path) = export_metrics {
        runtime
            .metrics
            .export_to_file(&path)
            .await
            .with_context(|| format!("Failed to export metrics to {}", path.display()))?;
        info!("Metrics exported to {}", path.display());
    }
    Ok(())
}

async fn check_proxies(config: &CrawlerConfig, probe_url: &str, concurrency: usize) -> Result<()> {
    let pool = open_proxy_pool(config).await?;
    if pool.is_empty() {
        println!("No proxies in {}", config.paths.proxies_file.display());
        return Ok(());
    }

    let (healthy, unhealthy) = probe_proxies(
        &pool,
        probe_url,
        Duration::from_secs(10),
        concurrency,
    )
    .await;
    println!(
        "Proxies: {} healthy, {} unhealthy (of {})",
        healthy.to_string().green(),
        unhealthy.to_string().red(),
        pool.len()
    );
    Ok(())
}

async fn status(config: &CrawlerConfig) -> Result<()> {
    let store = CheckpointStore::open(&config.paths.db_dir)
        .await
        .context("Failed to open checkpoint store")?;

    let unfinished = store.list_unfinished_contracts().await?;
    println!("{}", "Unfinished contracts".bold());
    if unfinished.is_empty() {
        println!("  none");
    }
    for address in &unfinished {
        if let Some(progress) = store.get_progress(address).await? {
            let total = progress
                .total_pages
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            let status = match progress.status.as_str() {
                "FAILED" => "FAILED".red(),
                other => other.yellow(),
            };
            println!(
                "  {} {} page {}/{}{}",
                address,
                status,
                progress.current_page,
                total,
                progress
                    .error_message
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            );
        }
    }

    let processed = store.processed_contracts().await?;
    let completed = processed
        .iter()
        .filter(|c| c.status == core_logic::ParsingStatus::Completed)
        .count();
    println!(
        "{} {} of {} recorded contracts completed",
        "Processed:".bold(),
        completed,
        processed.len()
    );

    let pool = open_proxy_pool(config).await?;
    print_pool_health(&pool).await;
    Ok(())
}

async fn print_pool_health(pool: &ResourcePool) {
    let now = Utc::now();
    let entries = pool.entries().await;
    let cooling = entries.iter().filter(|e| e.is_cooling_down(now)).count();
    let disabled = entries.iter().filter(|e| !e.is_working).count();
    println!(
        "{} {} entries, {} available, {} cooling down, {} disabled",
        format!("{} pool:", pool.name()).bold(),
        pool.len(),
        pool.available_count().await.to_string().green(),
        cooling,
        disabled.to_string().red()
    );
}
