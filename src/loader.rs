//! Bulk trade loading
//!
//! Generates random trades for one symbol at its current price and writes
//! them to the Trade cache in fixed-size `put_all` batches.

use crate::error::GridError;
use crate::model::{Price, Trade};
use crate::store::CacheStore;
use crate::symbols;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Trades written per `put_all` round trip
pub const BATCH_SIZE: usize = 1000;

/// Largest generated trade quantity
pub const MAX_QUANTITY: u64 = 1000;

/// Summary of a completed load
#[derive(Clone, Debug, PartialEq)]
pub struct LoadOutcome {
    pub symbol: String,
    pub added: usize,
    pub batches: usize,
    /// Price every generated trade was booked at
    pub price: f64,
}

pub struct BulkTradeLoader {
    trades: Arc<dyn CacheStore<Trade>>,
    prices: Arc<dyn CacheStore<Price>>,
    batch_size: usize,
}

impl BulkTradeLoader {
    pub fn new(trades: Arc<dyn CacheStore<Trade>>, prices: Arc<dyn CacheStore<Price>>) -> Self {
        Self {
            trades,
            prices,
            batch_size: BATCH_SIZE,
        }
    }

    /// Override the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Add `count` random trades for `symbol`, booked at the symbol's
    /// current price.
    ///
    /// Batches are written as they fill. If a write fails, earlier batches
    /// stay in the cache.
    pub async fn add_trades(&self, symbol: &str, count: i64) -> Result<LoadOutcome, GridError> {
        let count = usize::try_from(count).map_err(|_| {
            GridError::InvalidArgument(format!("count must not be negative, got {count}"))
        })?;

        let price = symbols::current_price(self.prices.as_ref(), symbol)
            .await?
            .price;

        tracing::info!("Adding {} random trades for {}...", count, symbol);

        let mut added = 0;
        let mut batches = 0;
        while added < count {
            let len = self.batch_size.min(count - added);
            let batch = random_trades(symbol, price, len);
            self.trades.put_all(&batch).await?;
            added += len;
            batches += 1;
            tracing::debug!("Wrote batch {} ({} trades)", batches, len);
        }

        Ok(LoadOutcome {
            symbol: symbol.to_string(),
            added,
            batches,
            price,
        })
    }
}

/// `len` trades keyed by id, each with a quantity in `1..=MAX_QUANTITY`
fn random_trades(symbol: &str, price: f64, len: usize) -> HashMap<String, Trade> {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let trade = Trade::new(symbol, rng.gen_range(1..=MAX_QUANTITY), price);
            (trade.id.clone(), trade)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EventKind, Grid};
    use crate::model::{PRICE_CACHE, TRADE_CACHE};
    use crate::processor::{Filter, Processor};
    use crate::store::{InvokeResult, LocalCache, MapEvent, ResultStream};
    use async_trait::async_trait;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use serde_json::Value;

    /// Trade store that remembers the size of every `put_all`
    struct RecordingTrades {
        inner: LocalCache<Trade>,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CacheStore<Trade> for RecordingTrades {
        fn name(&self) -> &str {
            self.inner.name()
        }
        async fn get(&self, key: &str) -> Result<Option<Trade>, GridError> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, value: &Trade) -> Result<Option<Trade>, GridError> {
            self.inner.put(key, value).await
        }
        async fn put_all(&self, entries: &HashMap<String, Trade>) -> Result<(), GridError> {
            self.batches.lock().push(entries.len());
            self.inner.put_all(entries).await
        }
        async fn size(&self) -> Result<usize, GridError> {
            self.inner.size().await
        }
        async fn key_set(&self) -> Result<ResultStream<String>, GridError> {
            self.inner.key_set().await
        }
        async fn invoke_all(
            &self,
            filter: &Filter,
            processor: &Processor,
        ) -> Result<ResultStream<InvokeResult>, GridError> {
            self.inner.invoke_all(filter, processor).await
        }
        async fn invoke(&self, key: &str, processor: &Processor) -> Result<Option<Value>, GridError> {
            self.inner.invoke(key, processor).await
        }
        async fn subscribe(
            &self,
            kind: Option<EventKind>,
        ) -> Result<ResultStream<MapEvent<Trade>>, GridError> {
            self.inner.subscribe(kind).await
        }
    }

    struct Fixture {
        trades: Arc<RecordingTrades>,
        prices: LocalCache<Price>,
    }

    impl Fixture {
        async fn new() -> Self {
            let grid = Grid::default();
            let prices = LocalCache::new(grid.cache(PRICE_CACHE));
            prices.put("XYZ", &Price::new("XYZ", 10.0)).await.unwrap();
            let trades = Arc::new(RecordingTrades {
                inner: LocalCache::new(grid.cache(TRADE_CACHE)),
                batches: Mutex::new(Vec::new()),
            });
            Self { trades, prices }
        }

        fn loader(&self) -> BulkTradeLoader {
            BulkTradeLoader::new(self.trades.clone(), Arc::new(self.prices.clone()))
        }

        async fn all_trades(&self) -> Vec<Trade> {
            let keys: Vec<String> = self
                .trades
                .key_set()
                .await
                .unwrap()
                .map(|k| k.unwrap())
                .collect()
                .await;
            let mut trades = Vec::new();
            for key in keys {
                trades.push(self.trades.get(&key).await.unwrap().unwrap());
            }
            trades
        }
    }

    #[tokio::test]
    async fn test_loads_in_batches_of_one_thousand() {
        let fx = Fixture::new().await;

        let outcome = fx.loader().add_trades("XYZ", 2500).await.unwrap();

        assert_eq!(outcome.added, 2500);
        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.price, 10.0);
        assert_eq!(*fx.trades.batches.lock(), vec![1000, 1000, 500]);

        let trades = fx.all_trades().await;
        assert_eq!(trades.len(), 2500);
        for trade in &trades {
            assert_eq!(trade.symbol, "XYZ");
            assert_eq!(trade.price, 10.0);
            assert!((1..=MAX_QUANTITY).contains(&trade.quantity));
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_batch() {
        let fx = Fixture::new().await;

        let outcome = fx
            .loader()
            .with_batch_size(10)
            .add_trades("XYZ", 30)
            .await
            .unwrap();

        assert_eq!(outcome.batches, 3);
        assert_eq!(*fx.trades.batches.lock(), vec![10, 10, 10]);
    }

    #[tokio::test]
    async fn test_zero_count_writes_nothing() {
        let fx = Fixture::new().await;

        let outcome = fx.loader().add_trades("XYZ", 0).await.unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.batches, 0);
        assert!(fx.trades.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_negative_count_is_rejected() {
        let fx = Fixture::new().await;

        let err = fx.loader().add_trades("XYZ", -1).await.unwrap_err();

        assert!(matches!(err, GridError::InvalidArgument(_)));
        assert_eq!(fx.trades.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_rejected() {
        let fx = Fixture::new().await;

        let err = fx.loader().add_trades("ABC", 5).await.unwrap_err();

        match err {
            GridError::UnknownSymbol { symbol, valid } => {
                assert_eq!(symbol, "ABC");
                assert_eq!(valid, vec!["XYZ"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.trades.size().await.unwrap(), 0);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let batch = random_trades("EMC", 1.5, 500);
        assert_eq!(batch.len(), 500);
        assert!(batch.iter().all(|(id, trade)| *id == trade.id));
    }
}
