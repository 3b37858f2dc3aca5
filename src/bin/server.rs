//! Trade grid server binary
//!
//! Run with: cargo run --bin grid-server -- --help

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use trade_grid::cache::DEFAULT_EVENT_CAPACITY;
use trade_grid::server::{run_server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "grid-server")]
#[command(about = "In-memory data grid serving the Trade and Price caches")]
struct Args {
    /// gRPC listen address
    #[arg(long, default_value = "[::1]:1408")]
    listen_addr: String,

    /// Buffered change events per cache before slow listeners lag
    #[arg(long, default_value_t = DEFAULT_EVENT_CAPACITY)]
    event_capacity: usize,

    /// Start with an empty Price cache
    #[arg(long, default_value_t = false)]
    no_bootstrap: bool,

    /// Move a random price every N milliseconds (0 = never)
    #[arg(long, default_value = "0")]
    ticker_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of worker threads for processing requests
    #[arg(long, default_value = "4")]
    worker_threads: usize,
}

async fn run_with_config(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ServerConfig {
        listen_addr: args.listen_addr.clone(),
        event_capacity: args.event_capacity,
        bootstrap: !args.no_bootstrap,
        ticker_interval: (args.ticker_ms > 0).then(|| Duration::from_millis(args.ticker_ms)),
    };

    tracing::info!("=== Trade Grid Server Configuration ===");
    tracing::info!("Worker threads: {}", args.worker_threads);
    tracing::info!("Listen address: {}", args.listen_addr);
    tracing::info!("Event capacity: {}", args.event_capacity);
    tracing::info!("Bootstrap prices: {}", config.bootstrap);
    match config.ticker_interval {
        Some(interval) => tracing::info!("Price ticker: every {:?}", interval),
        None => tracing::info!("Price ticker: off"),
    }
    tracing::info!("========================================");

    run_server(config).await
}

fn main() -> Result<()> {
    let args = Args::parse();
    let worker_threads = args.worker_threads;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?
        .block_on(run_with_config(args))
}
