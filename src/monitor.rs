//! Price change monitoring
//!
//! Turns the Price cache's event stream into price changes. Inserts and
//! deletes are ignored; only updates to an existing price are reported.

use crate::cache::EventKind;
use crate::error::GridError;
use crate::model::Price;
use crate::store::{CacheStore, ResultStream};
use futures::StreamExt;
use std::sync::Arc;

/// An update of one symbol's price
#[derive(Clone, Debug, PartialEq)]
pub struct PriceChange {
    pub symbol: String,
    pub old_price: f64,
    pub new_price: f64,
}

impl PriceChange {
    /// Signed difference, new minus old
    pub fn change(&self) -> f64 {
        self.new_price - self.old_price
    }
}

impl std::fmt::Display for PriceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Price changed for {}, new=${:.2}, old=${:.2}, change=${:.2}",
            self.symbol,
            self.new_price,
            self.old_price,
            self.change()
        )
    }
}

pub struct PriceChangeMonitor {
    prices: Arc<dyn CacheStore<Price>>,
}

impl PriceChangeMonitor {
    pub fn new(prices: Arc<dyn CacheStore<Price>>) -> Self {
        Self { prices }
    }

    /// Stream of price updates. Runs until the subscription ends or the
    /// stream is dropped.
    pub async fn changes(&self) -> Result<ResultStream<PriceChange>, GridError> {
        let updates = self.prices.subscribe(Some(EventKind::Updated)).await?;
        Ok(updates
            .map(|event| -> Result<PriceChange, GridError> {
                let event = event?;
                into_change(event.key, event.old, event.new)
            })
            .boxed())
    }

    /// Call `on_change` for every update until the subscription ends.
    ///
    /// An event that cannot be decoded stops the monitor with an error.
    pub async fn run<F>(&self, mut on_change: F) -> Result<(), GridError>
    where
        F: FnMut(&PriceChange),
    {
        let mut changes = self.changes().await?;
        tracing::info!("Monitoring price changes on {}", self.prices.name());
        while let Some(change) = changes.next().await {
            on_change(&change?);
        }
        tracing::info!("Price event stream ended");
        Ok(())
    }
}

fn into_change(
    symbol: String,
    old: Option<Price>,
    new: Option<Price>,
) -> Result<PriceChange, GridError> {
    match (old, new) {
        (Some(old), Some(new)) => Ok(PriceChange {
            symbol,
            old_price: old.price,
            new_price: new.price,
        }),
        _ => Err(GridError::MalformedEvent(format!(
            "update of {symbol} is missing its old or new price"
        ))),
    }
}
