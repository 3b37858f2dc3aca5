//! Records held by the grid: trades and current prices.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the cache holding trades keyed by trade id
pub const TRADE_CACHE: &str = "Trade";

/// Name of the cache holding prices keyed by symbol
pub const PRICE_CACHE: &str = "Price";

/// Symbols loaded into the Price cache by the server bootstrap
pub const DEMO_SYMBOLS: [&str; 6] = ["ORCL", "MSFT", "GOOG", "AAPL", "YHOO", "EMC"];

/// Price every demo symbol starts at
pub const INITIAL_PRICE: f64 = 20.0;

/// One executed trade
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub quantity: u64,
    pub price: f64,
}

impl Trade {
    pub const ID: &'static str = "id";
    pub const SYMBOL: &'static str = "symbol";
    pub const QUANTITY: &'static str = "quantity";
    pub const PRICE: &'static str = "price";

    /// Create a trade with a fresh unique id
    pub fn new(symbol: impl Into<String>, quantity: u64, price: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            quantity,
            price,
        }
    }
}

/// Current market price for one symbol
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub symbol: String,
    pub price: f64,
}

impl Price {
    pub const SYMBOL: &'static str = "symbol";
    pub const PRICE: &'static str = "price";

    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
        }
    }
}
