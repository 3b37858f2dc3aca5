//! Stock split
//!
//! Rescales every trade of one symbol and the symbol's price without moving
//! any trade to the client: a symbol filter selects the trades on the grid
//! and multiply processors update them in place.
//!
//! The split runs as three independent remote mutations:
//! 1. trade quantities multiplied by the factor
//! 2. trade prices multiplied by `1 / factor`
//! 3. the symbol's price multiplied by `1 / factor`
//!
//! There is no transaction across them. A concurrent reader can see a trade
//! whose quantity is already split while its price is not, and a failure
//! part way leaves earlier mutations applied. Nothing is rolled back.

use crate::error::GridError;
use crate::model::{Price, Trade};
use crate::processor::{Filter, Processor};
use crate::store::CacheStore;
use crate::symbols;
use futures::StreamExt;
use std::sync::Arc;

/// Smallest accepted split factor
pub const MIN_FACTOR: i64 = 1;

/// Largest accepted split factor
pub const MAX_FACTOR: i64 = 10;

/// What a completed split changed
#[derive(Clone, Debug, PartialEq)]
pub struct SplitOutcome {
    pub symbol: String,
    pub factor: i64,
    /// Trades whose quantity was multiplied
    pub updated_quantities: usize,
    /// Trades whose price was divided. Reported as the number of trades split.
    pub updated_trades: usize,
    /// Price read before any mutation
    pub old_price: f64,
    /// `old_price / factor`, computed here rather than read back from the grid
    pub new_price: f64,
}

/// Applies filtered bulk mutations to every trade of a symbol
pub struct BulkSymbolMutator {
    trades: Arc<dyn CacheStore<Trade>>,
    prices: Arc<dyn CacheStore<Price>>,
}

impl BulkSymbolMutator {
    pub fn new(trades: Arc<dyn CacheStore<Trade>>, prices: Arc<dyn CacheStore<Price>>) -> Self {
        Self { trades, prices }
    }

    /// Split `symbol` by `factor`: quantities are multiplied and prices
    /// divided, for every trade of the symbol and for its current price.
    pub async fn stock_split(&self, symbol: &str, factor: i64) -> Result<SplitOutcome, GridError> {
        if !(MIN_FACTOR..=MAX_FACTOR).contains(&factor) {
            return Err(GridError::InvalidArgument(format!(
                "factor must be between {MIN_FACTOR} and {MAX_FACTOR}, got {factor}"
            )));
        }

        let current = symbols::current_price(self.prices.as_ref(), symbol).await?;

        let inverse = 1.0 / factor as f64;
        let by_symbol = Filter::equal(Trade::SYMBOL, symbol);

        let updated_quantities = self
            .apply_to_trades(&by_symbol, &Processor::multiply(Trade::QUANTITY, factor))
            .await?;
        tracing::info!("Updated quantity for {} trades", updated_quantities);

        let updated_trades = self
            .apply_to_trades(&by_symbol, &Processor::multiply_f64(Trade::PRICE, inverse))
            .await?;
        tracing::info!("Updated price for {} trades", updated_trades);

        self.prices
            .invoke(symbol, &Processor::multiply_f64(Price::PRICE, inverse))
            .await
            .map_err(|e| e.into_mutation_failure(self.prices.name(), 0))?
            .ok_or_else(|| GridError::MutationFailed {
                cache: self.prices.name().to_string(),
                applied: 0,
                reason: format!("{symbol} was removed during the split"),
            })?;

        let new_price = current.price / factor as f64;
        tracing::info!(
            "Updated price for {} from ${:.2} to ${:.2}",
            symbol,
            current.price,
            new_price
        );

        Ok(SplitOutcome {
            symbol: symbol.to_string(),
            factor,
            updated_quantities,
            updated_trades,
            old_price: current.price,
            new_price,
        })
    }

    /// Run a processor over the selected trades, counting results until the
    /// stream ends or the first failure.
    async fn apply_to_trades(&self, filter: &Filter, processor: &Processor) -> Result<usize, GridError> {
        let mut results = self.trades.invoke_all(filter, processor).await?;
        let mut applied = 0;
        while let Some(result) = results.next().await {
            if let Err(e) = result {
                tracing::warn!("Stopped after {} trades: {}", applied, e);
                return Err(e.into_mutation_failure(self.trades.name(), applied));
            }
            applied += 1;
        }
        Ok(applied)
    }
}
