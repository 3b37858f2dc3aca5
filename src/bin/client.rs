//! Trade grid sample client
//!
//! Run with: cargo run --bin grid-client -- --help

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use trade_grid::model::{PRICE_CACHE, TRADE_CACHE};
use trade_grid::{
    BulkSymbolMutator, BulkTradeLoader, CacheStore, ClientConfig, GridSession, Price,
    PriceChangeMonitor, RemoteCache, Trade,
};

#[derive(Parser, Debug)]
#[command(name = "grid-client")]
#[command(about = "Sample client for the Trade and Price caches of a trade grid")]
struct Args {
    /// Server address (gRPC endpoint)
    #[arg(long, global = true, env = "GRID_SERVER_ADDRESS", default_value = "http://[::1]:1408")]
    server_addr: String,

    /// Client node ID
    #[arg(long, global = true, default_value = "1")]
    client_id: u32,

    /// Bound on every request, in seconds
    #[arg(long, global = true, default_value = "120")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the size of the Trade and Price caches
    Size,
    /// Print price changes until interrupted
    Monitor,
    /// Add random trades for a symbol at its current price
    AddTrades {
        symbol: String,
        #[arg(allow_hyphen_values = true)]
        count: i64,
    },
    /// Split a symbol: multiply trade quantities and divide prices by the factor
    StockSplit {
        symbol: String,
        #[arg(allow_hyphen_values = true)]
        factor: i64,
    },
}

struct Caches {
    trades: RemoteCache<Trade>,
    prices: RemoteCache<Price>,
}

impl Caches {
    fn open(session: &GridSession) -> Self {
        Self {
            trades: session.cache(TRADE_CACHE),
            prices: session.cache(PRICE_CACHE),
        }
    }

    fn trades(&self) -> Arc<dyn CacheStore<Trade>> {
        Arc::new(self.trades.clone())
    }

    fn prices(&self) -> Arc<dyn CacheStore<Price>> {
        Arc::new(self.prices.clone())
    }
}

async fn cmd_size(caches: &Caches) -> Result<()> {
    println!("Trade cache size = {}", caches.trades.size().await?);
    println!("Price cache size = {}", caches.prices.size().await?);
    Ok(())
}

async fn cmd_monitor(caches: &Caches) -> Result<()> {
    println!("Listening for price changes. Press CTRL-C to finish.");
    PriceChangeMonitor::new(caches.prices())
        .run(|change| println!("{}", change))
        .await?;
    Ok(())
}

async fn cmd_add_trades(caches: &Caches, symbol: &str, count: i64) -> Result<()> {
    let outcome = BulkTradeLoader::new(caches.trades(), caches.prices())
        .add_trades(symbol, count)
        .await?;
    println!(
        "Added {} trades for {} at ${:.2}",
        outcome.added, outcome.symbol, outcome.price
    );
    println!("Trades cache size is now {}", caches.trades.size().await?);
    Ok(())
}

async fn cmd_stock_split(caches: &Caches, symbol: &str, factor: i64) -> Result<()> {
    let outcome = BulkSymbolMutator::new(caches.trades(), caches.prices())
        .stock_split(symbol, factor)
        .await?;
    println!(
        "Split {} {}-for-1 across {} trades, price ${:.2} -> ${:.2}",
        outcome.symbol, outcome.factor, outcome.updated_trades, outcome.old_price, outcome.new_price
    );
    Ok(())
}

async fn run_command(caches: &Caches, command: &Commands) -> Result<()> {
    match command {
        Commands::Size => cmd_size(caches).await,
        Commands::Monitor => cmd_monitor(caches).await,
        Commands::AddTrades { symbol, count } => cmd_add_trades(caches, symbol, *count).await,
        Commands::StockSplit { symbol, factor } => cmd_stock_split(caches, symbol, *factor).await,
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ClientConfig {
        client_id: args.client_id,
        server_addr: args.server_addr.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..Default::default()
    };

    let session = GridSession::connect(config).await?;
    let caches = Caches::open(&session);

    let result = tokio::select! {
        result = run_command(&caches, &args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    };

    session.close();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
