pub mod cache;
pub mod client;
pub mod error;
pub mod loader;
pub mod model;
pub mod monitor;
pub mod mutator;
pub mod processor;
pub mod protocol;
pub mod server;
pub mod store;
pub mod symbols;

// Generated gRPC stubs for the DataGrid service
pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/grid.DataGrid.rs"));
}

pub use client::{ClientConfig, GridSession, RemoteCache};
pub use error::GridError;
pub use loader::BulkTradeLoader;
pub use model::{Price, Trade};
pub use monitor::PriceChangeMonitor;
pub use mutator::BulkSymbolMutator;
pub use server::{GridServer, ServerConfig};
pub use store::{CacheStore, LocalCache};
