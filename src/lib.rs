//! Paper-trading bot for leveraged positions on several symbols.
//!
//! Each cycle marks open positions to market, closes the ones past their
//! take-profit or stop-loss, then asks an advisor what to do with every
//! configured symbol and routes the answer into the ledger.

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod strategies;
pub mod types;
