//! Symbol validation against the Price cache key set.

use crate::error::GridError;
use crate::model::Price;
use crate::store::CacheStore;
use futures::StreamExt;

/// Every symbol currently in the Price cache, sorted.
pub async fn symbols(prices: &dyn CacheStore<Price>) -> Result<Vec<String>, GridError> {
    let mut keys = prices.key_set().await?;
    let mut symbols = Vec::new();
    while let Some(key) = keys.next().await {
        symbols.push(key?);
    }
    symbols.sort();
    Ok(symbols)
}

/// Fail with `UnknownSymbol` unless `symbol` is a key of the Price cache.
pub async fn ensure_known(prices: &dyn CacheStore<Price>, symbol: &str) -> Result<(), GridError> {
    let valid = symbols(prices).await?;
    if valid.iter().any(|s| s == symbol) {
        Ok(())
    } else {
        Err(GridError::UnknownSymbol {
            symbol: symbol.to_string(),
            valid,
        })
    }
}

/// Current price of a known symbol.
///
/// If the entry is removed between the key scan and the read, the error
/// lists the symbols present after the removal.
pub async fn current_price(prices: &dyn CacheStore<Price>, symbol: &str) -> Result<Price, GridError> {
    ensure_known(prices, symbol).await?;
    match prices.get(symbol).await? {
        Some(price) => Ok(price),
        None => Err(GridError::UnknownSymbol {
            symbol: symbol.to_string(),
            valid: symbols(prices).await?,
        }),
    }
}
