//! Trade grid - Main entry point
//!
//! Sample client for a data grid holding two named caches, `Trade` and
//! `Price`, together with the grid server it talks to.
//!
//! ## Architecture
//!
//! The client never moves trades to itself to change them:
//! 1. Filters select entries on the server (e.g. all trades for `ORCL`)
//! 2. Entry processors mutate the selected entries in place
//! 3. Results stream back to the client one entry at a time
//! 4. Price changes are pushed to listeners as events
//!
//! ## Usage
//!
//! Start the server:
//! ```bash
//! cargo run --bin grid-server -- --listen-addr [::1]:1408 --ticker-ms 2000
//! ```
//!
//! Run the client:
//! ```bash
//! cargo run --bin grid-client -- size
//! cargo run --bin grid-client -- add-trades ORCL 2500
//! cargo run --bin grid-client -- stock-split ORCL 2
//! cargo run --bin grid-client -- monitor
//! ```

fn main() {
    println!("Trade grid");
    println!();
    println!("Use the following binaries:");
    println!("  cargo run --bin grid-server -- --help");
    println!("  cargo run --bin grid-client -- --help");
}
