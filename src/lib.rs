//! Polymarket near-expiry favorite sniper.
//!
//! Scans for liquid, high-confidence markets close to resolution, allocates a
//! fixed-risk capital budget across them, and tracks the resulting positions
//! to settlement with a real-time stop-loss watcher.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod monitor;
pub mod scanner;
pub mod storage;
pub mod types;
pub mod watcher;
