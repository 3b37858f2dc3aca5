//! Integration tests for the trade grid over gRPC

use approx::assert_relative_eq;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use trade_grid::model::{DEMO_SYMBOLS, INITIAL_PRICE, PRICE_CACHE, TRADE_CACHE};
use trade_grid::monitor::PriceChangeMonitor;
use trade_grid::processor::{Filter, Processor};
use trade_grid::server::{GridServer, ServerConfig};
use trade_grid::{
    BulkSymbolMutator, BulkTradeLoader, CacheStore, ClientConfig, GridError, GridSession, Price,
    RemoteCache, Trade,
};

/// Find an available port for testing
fn find_available_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct TestGrid {
    server: Arc<GridServer>,
    session: GridSession,
    handle: tokio::task::JoinHandle<()>,
}

impl TestGrid {
    fn trades(&self) -> RemoteCache<Trade> {
        self.session.cache(TRADE_CACHE)
    }

    fn prices(&self) -> RemoteCache<Price> {
        self.session.cache(PRICE_CACHE)
    }
}

impl Drop for TestGrid {
    fn drop(&mut self) {
        self.session.close();
        self.handle.abort();
    }
}

async fn start_grid() -> TestGrid {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    let port = find_available_port();
    let server_addr = format!("127.0.0.1:{}", port);

    let server = Arc::new(GridServer::new(ServerConfig {
        listen_addr: server_addr,
        ..Default::default()
    }));
    let service = Arc::clone(&server).into_service();
    let listen_addr: std::net::SocketAddr = server.listen_addr().parse().unwrap();

    let handle = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service)
            .serve(listen_addr)
            .await
            .unwrap();
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    let session = GridSession::connect(ClientConfig {
        server_addr: format!("http://127.0.0.1:{}", port),
        ..Default::default()
    })
    .await
    .unwrap();

    TestGrid {
        server,
        session,
        handle,
    }
}

#[tokio::test]
async fn test_sizes_after_bootstrap() {
    let grid = start_grid().await;

    assert!(grid.session.heartbeat().await.unwrap());
    assert_eq!(grid.trades().size().await.unwrap(), 0);
    assert_eq!(grid.prices().size().await.unwrap(), DEMO_SYMBOLS.len());

    let orcl = grid.prices().get("ORCL").await.unwrap().unwrap();
    assert_relative_eq!(orcl.price, INITIAL_PRICE);
    assert!(grid.prices().get("XYZ").await.unwrap().is_none());
}

#[tokio::test]
async fn test_add_trades_then_split() {
    let grid = start_grid().await;
    let trades: Arc<dyn CacheStore<Trade>> = Arc::new(grid.trades());
    let prices: Arc<dyn CacheStore<Price>> = Arc::new(grid.prices());

    let loaded = BulkTradeLoader::new(Arc::clone(&trades), Arc::clone(&prices))
        .add_trades("MSFT", 2500)
        .await
        .unwrap();
    assert_eq!(loaded.added, 2500);
    assert_eq!(loaded.batches, 3);
    assert_eq!(trades.size().await.unwrap(), 2500);

    let other = Trade::new("EMC", 10, 20.0);
    trades.put(&other.id, &other).await.unwrap();

    // remember a few quantities to check after the split
    let sample: Vec<Trade> = grid
        .server
        .grid()
        .cache(TRADE_CACHE)
        .keys()
        .into_iter()
        .take(20)
        .filter_map(|key| grid.server.grid().cache(TRADE_CACHE).get(&key))
        .map(|value| serde_json::from_value(value).unwrap())
        .collect();

    let split = BulkSymbolMutator::new(Arc::clone(&trades), Arc::clone(&prices))
        .stock_split("MSFT", 2)
        .await
        .unwrap();
    assert_eq!(split.updated_quantities, 2500);
    assert_eq!(split.updated_trades, 2500);
    assert_relative_eq!(split.old_price, 20.0);
    assert_relative_eq!(split.new_price, 10.0);

    for before in sample {
        let after = trades.get(&before.id).await.unwrap().unwrap();
        if before.symbol == "MSFT" {
            assert_eq!(after.quantity, before.quantity * 2);
            assert_relative_eq!(after.price, before.price / 2.0);
        } else {
            assert_eq!(after, before);
        }
    }
    assert_relative_eq!(prices.get("MSFT").await.unwrap().unwrap().price, 10.0);
    assert_relative_eq!(prices.get("EMC").await.unwrap().unwrap().price, 20.0);
}

#[tokio::test]
async fn test_business_errors_over_the_wire() {
    let grid = start_grid().await;
    let trades: Arc<dyn CacheStore<Trade>> = Arc::new(grid.trades());
    let prices: Arc<dyn CacheStore<Price>> = Arc::new(grid.prices());

    let loader = BulkTradeLoader::new(Arc::clone(&trades), Arc::clone(&prices));
    assert!(matches!(
        loader.add_trades("ORCL", -1).await,
        Err(GridError::InvalidArgument(_))
    ));
    match loader.add_trades("XYZ", 10).await {
        Err(GridError::UnknownSymbol { valid, .. }) => {
            let mut expected: Vec<&str> = DEMO_SYMBOLS.to_vec();
            expected.sort();
            assert_eq!(valid, expected);
        }
        other => panic!("unexpected result: {:?}", other.map(|o| o.added)),
    }

    let mutator = BulkSymbolMutator::new(Arc::clone(&trades), Arc::clone(&prices));
    assert!(matches!(
        mutator.stock_split("ORCL", 11).await,
        Err(GridError::InvalidArgument(_))
    ));
    assert_eq!(trades.size().await.unwrap(), 0);
    assert_relative_eq!(prices.get("ORCL").await.unwrap().unwrap().price, 20.0);
}

#[tokio::test]
async fn test_invoke_all_streams_entry_failures() {
    let grid = start_grid().await;
    grid.server.grid().cache(TRADE_CACHE).put(
        "broken".to_string(),
        serde_json::json!({"id": "broken", "symbol": "AAPL", "quantity": "n/a", "price": 1.0}),
    );
    let healthy = Trade::new("AAPL", 3, 20.0);
    grid.trades().put(&healthy.id, &healthy).await.unwrap();

    let results: Vec<_> = grid
        .trades()
        .invoke_all(
            &Filter::equal(Trade::SYMBOL, "AAPL"),
            &Processor::multiply(Trade::QUANTITY, 5),
        )
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(GridError::EntryFailed { key, .. }) if key == "broken")));
    assert_eq!(grid.trades().get(&healthy.id).await.unwrap().unwrap().quantity, 15);
}

#[tokio::test]
async fn test_monitor_receives_price_updates() {
    let grid = start_grid().await;
    let monitor = PriceChangeMonitor::new(Arc::new(grid.prices()));
    let mut changes = monitor.changes().await.unwrap();

    // give the server time to register the listener
    tokio::time::sleep(Duration::from_millis(100)).await;

    grid.prices()
        .put("ABC", &Price::new("ABC", 10.0))
        .await
        .unwrap();
    grid.prices()
        .put("ABC", &Price::new("ABC", 12.5))
        .await
        .unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(change.symbol, "ABC");
    assert_relative_eq!(change.old_price, 10.0);
    assert_relative_eq!(change.new_price, 12.5);
    assert_relative_eq!(change.change(), 2.5);
}

#[tokio::test]
async fn test_closed_session_fails_fast() {
    let grid = start_grid().await;
    let prices = grid.prices();

    grid.session.close();

    assert!(!grid.session.is_connected());
    assert!(matches!(prices.size().await, Err(GridError::SessionClosed)));
}

#[tokio::test]
async fn test_dropped_streams_leave_session_usable() {
    let grid = start_grid().await;
    let trades: Arc<dyn CacheStore<Trade>> = Arc::new(grid.trades());
    let prices: Arc<dyn CacheStore<Price>> = Arc::new(grid.prices());

    BulkTradeLoader::new(Arc::clone(&trades), Arc::clone(&prices))
        .add_trades("GOOG", 3000)
        .await
        .unwrap();

    // take one result of a bulk invocation and drop the rest
    {
        let mut results = trades
            .invoke_all(
                &Filter::equal(Trade::SYMBOL, "GOOG"),
                &Processor::extract(Trade::QUANTITY),
            )
            .await
            .unwrap();
        assert!(results.next().await.unwrap().is_ok());
    }

    // abandon a running monitor the way CTRL-C does
    let monitor = PriceChangeMonitor::new(Arc::clone(&prices));
    let abandoned = tokio::time::timeout(Duration::from_millis(200), monitor.run(|_| {})).await;
    assert!(abandoned.is_err());

    // the server lets go of the abandoned listener
    let price_cache = grid.server.grid().cache(PRICE_CACHE);
    for _ in 0..50 {
        if price_cache.listener_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(price_cache.listener_count(), 0);

    assert!(grid.session.heartbeat().await.unwrap());
    assert_eq!(trades.size().await.unwrap(), 3000);

    let mut changes = monitor.changes().await.unwrap();
    prices.put("GOOG", &Price::new("GOOG", 21.0)).await.unwrap();
    let change = tokio::time::timeout(Duration::from_secs(5), changes.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(change.symbol, "GOOG");
    assert_relative_eq!(change.old_price, 20.0);
    assert_relative_eq!(change.new_price, 21.0);
}

#[tokio::test]
async fn test_monitor_ignores_foreign_inserts_over_the_wire() {
    let grid = start_grid().await;
    let monitor = PriceChangeMonitor::new(Arc::new(grid.prices()));
    let mut changes = monitor.changes().await.unwrap();

    grid.server
        .grid()
        .cache(PRICE_CACHE)
        .put("NEW".to_string(), serde_json::json!({"symbol": "NEW", "px": 1.0}));
    grid.prices()
        .put("EMC", &Price::new("EMC", 22.5))
        .await
        .unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(change.symbol, "EMC");
    assert_relative_eq!(change.change(), 2.5);
}

