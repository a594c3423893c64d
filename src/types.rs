//! Core domain types shared across the pipeline, ledger, and watchers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// How a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Yes,
    No,
    StopLoss,
}

impl Resolution {
    pub fn winning_side(self) -> Option<Side> {
        match self {
            Resolution::Yes => Some(Side::Yes),
            Resolution::No => Some(Side::No),
            Resolution::StopLoss => None,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Yes => write!(f, "YES"),
            Resolution::No => write!(f, "NO"),
            Resolution::StopLoss => write!(f, "STOP_LOSS"),
        }
    }
}

/// An open position held against a single market side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub event_id: String,
    pub market_id: String,
    pub slug: String,
    pub side: Side,
    /// CLOB token id used for order-book and quote-stream lookups.
    pub token_id: String,
    pub entry_price: Decimal,
    pub entry_probability: Decimal,
    pub size: Decimal,
    pub cost: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// A settled position. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    #[serde(flatten)]
    pub position: Position,
    pub closed_at: DateTime<Utc>,
    pub resolution: Resolution,
    pub payout: Decimal,
    pub pnl: Decimal,
}

/// A market+side combination that passed every eligibility filter in one
/// scan cycle. Consumed by the executor in the same cycle it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub event_id: String,
    pub market_id: String,
    pub slug: String,
    pub side: Side,
    pub token_id: String,
    pub probability: Decimal,
    pub best_ask: Decimal,
    pub ask_size: Decimal,
    pub hours_to_close: Decimal,
    /// High-volatility instrument class; the allocator sizes these down.
    pub is_crypto: bool,
}

/// Read-only snapshot of ledger health for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub balance: Decimal,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub locked_events: usize,
    pub realized_pnl: Decimal,
    /// Free balance plus the cost basis of every open position.
    pub total_value: Decimal,
}
