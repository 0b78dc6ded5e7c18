//! CLI for the crawl coordination subsystem: seed the frontier, inspect
//! its counts, or run a worker loop (optionally with screenshot capture).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use onioncrawl::{
    ContentSaver, CrawlConfig, CrawlConfigBuilder, CrawlWorker, FetchClient, FrontierStore,
    RedisFrontier, ScreenshotHandle, ScreenshotSupervisor, WorkerReport,
};

/// Grace period for in-flight screenshot captures at shutdown.
const SUPERVISOR_GRACE: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "onioncrawl", version, about = "Breadth-first .onion crawler")]
struct Cli {
    /// Path to a TOML config file; defaults apply if it does not exist.
    #[arg(long, short, default_value = "onioncrawl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the frontier queue with URLs (from args, else the config).
    Seed {
        /// Clear the existing queue and visited set first.
        #[arg(long)]
        clear: bool,
        /// Seed URLs; falls back to `seed_urls` from the config file.
        urls: Vec<String>,
    },
    /// Report frontier queue and visited-set sizes.
    Status,
    /// Run crawl workers until the frontier drains or Ctrl-C.
    Crawl {
        /// Number of concurrent worker loops in this process.
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Capture screenshots through the browser pool.
        #[arg(long)]
        screenshots: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        CrawlConfig::load(&cli.config)?
    } else {
        CrawlConfig::default()
    };

    match cli.command {
        Commands::Seed { clear, urls } => seed(&config, clear, urls).await,
        Commands::Status => status(&config).await,
        Commands::Crawl {
            workers,
            screenshots,
        } => crawl(config, workers.max(1), screenshots).await,
    }
}

async fn connect_frontier(config: &CrawlConfig) -> Result<RedisFrontier> {
    RedisFrontier::connect(
        config.redis_url(),
        config.task_queue_key(),
        config.visited_set_key(),
    )
    .await
    .context("Cannot reach the frontier store; the crawler cannot run without it")
}

async fn seed(config: &CrawlConfig, clear: bool, urls: Vec<String>) -> Result<()> {
    let frontier = connect_frontier(config).await?;

    ContentSaver::new(config.data_dir())
        .ensure_dirs()
        .await
        .context("Failed to create data directories")?;

    let urls = if urls.is_empty() {
        config.seed_urls().to_vec()
    } else {
        urls
    };
    anyhow::ensure!(!urls.is_empty(), "No seed URLs given (args or config)");

    let added = frontier.seed(&urls, clear).await?;
    let status = frontier.status().await?;
    println!(
        "Seeded {added} task(s); queue={} visited={}",
        status.queue_size, status.visited_size
    );
    Ok(())
}

async fn status(config: &CrawlConfig) -> Result<()> {
    let frontier = connect_frontier(config).await?;
    let status = frontier.status().await?;
    println!(
        "queue={} visited={}",
        status.queue_size, status.visited_size
    );
    Ok(())
}

async fn crawl(mut config: CrawlConfig, workers: usize, screenshots: bool) -> Result<()> {
    if screenshots {
        config = CrawlConfigBuilder::from_config(config)
            .save_screenshots(true)
            .build();
    }

    let saver = Arc::new(ContentSaver::new(config.data_dir()));
    saver
        .ensure_dirs()
        .await
        .context("Failed to create data directories")?;

    let fetcher = Arc::new(FetchClient::new(&config, Arc::clone(&saver))?);

    let supervisor = if config.save_screenshots() {
        let (supervisor, handle) =
            ScreenshotSupervisor::start(config.clone(), Arc::clone(&saver)).await;
        Some((supervisor, handle))
    } else {
        None
    };
    let screenshot_handle = supervisor.as_ref().map(|(_, handle)| handle.clone());

    // Explicit cancellation: Ctrl-C stops every worker after its current
    // task; the normal exit path is the frontier staying empty for the
    // dequeue timeout.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping workers after their current task");
            let _ = shutdown_tx.send(true);
        }
    });

    // The supervisor owns browser processes, so it must be shut down on
    // every exit path, including a failed worker connect.
    let result = run_workers(
        &config,
        workers,
        &fetcher,
        &saver,
        screenshot_handle,
        &shutdown_rx,
    )
    .await;

    if let Some((supervisor, handle)) = supervisor {
        drop(handle);
        supervisor.shutdown(SUPERVISOR_GRACE).await;
    }
    let total = result?;

    let frontier = connect_frontier(&config).await?;
    let status = frontier.status().await?;
    println!(
        "Crawl finished: {} pages processed, {} links enqueued; queue={} visited={}",
        total.pages_processed, total.links_enqueued, status.queue_size, status.visited_size
    );
    Ok(())
}

/// Spawn `workers` crawl loops and aggregate their reports. Every frontier
/// connection is established before the first worker spawns, so a connect
/// failure leaves nothing running behind the error.
async fn run_workers(
    config: &CrawlConfig,
    workers: usize,
    fetcher: &Arc<FetchClient>,
    saver: &Arc<ContentSaver>,
    screenshot_handle: Option<ScreenshotHandle>,
    shutdown_rx: &watch::Receiver<bool>,
) -> Result<WorkerReport> {
    // BLPOP pins a connection, so every worker gets its own.
    let mut frontiers: Vec<Arc<dyn FrontierStore>> = Vec::with_capacity(workers);
    for _ in 0..workers {
        frontiers.push(Arc::new(connect_frontier(config).await?));
    }

    let mut handles = Vec::with_capacity(workers);
    for (id, frontier) in frontiers.into_iter().enumerate() {
        let worker = CrawlWorker::new(
            id,
            config.clone(),
            frontier,
            Arc::clone(fetcher),
            Arc::clone(saver),
            screenshot_handle.clone(),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
    }
    info!("Started {workers} crawl worker(s)");

    let mut total = WorkerReport::default();
    for handle in handles {
        match handle.await {
            Ok(report) => {
                total.pages_processed += report.pages_processed;
                total.links_enqueued += report.links_enqueued;
            }
            Err(e) => error!("Worker task panicked: {e}"),
        }
    }
    Ok(total)
}
