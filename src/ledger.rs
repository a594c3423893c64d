//! Position and lock ledger
//!
//! Single source of truth for capital, open exposure, and per-event locking.
//! Every mutation (debit, credit, open, close, lock, unlock) happens under
//! one write-lock acquisition so no component can observe a half-updated
//! state across an await point.

use crate::error::{BotError, Result};
use crate::types::{ClosedPosition, LedgerSummary, Position, Resolution, Side};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Parameters for opening a position. The ledger assigns the id and
/// timestamps on insert.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub event_id: String,
    pub market_id: String,
    pub slug: String,
    pub side: Side,
    pub token_id: String,
    pub entry_price: Decimal,
    pub entry_probability: Decimal,
    pub size: Decimal,
    pub cost: Decimal,
}

/// Persisted ledger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    pub initial_capital: Decimal,
    pub balance: Decimal,
    pub positions: Vec<Position>,
    pub closed_positions: Vec<ClosedPosition>,
    pub event_locks: HashSet<String>,
}

impl LedgerState {
    fn fresh(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            balance: initial_capital,
            positions: Vec::new(),
            closed_positions: Vec::new(),
            event_locks: HashSet::new(),
        }
    }
}

/// Shared ledger handle. Cheap to clone; all clones observe the same state.
#[derive(Clone, Debug)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
}

impl Ledger {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::fresh(initial_capital))),
        }
    }

    pub fn from_state(state: LedgerState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Load a ledger snapshot from disk. A missing file seeds a fresh ledger;
    /// an unreadable one is a persistence failure (fatal at startup).
    pub async fn load<P: AsRef<Path>>(path: P, initial_capital: Decimal) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No ledger state at {}, starting fresh with ${}", path.display(), initial_capital);
            return Ok(Self::new(initial_capital));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BotError::Persistence(format!("read {}: {}", path.display(), e)))?;
        let state: LedgerState = serde_json::from_str(&content)
            .map_err(|e| BotError::Persistence(format!("parse {}: {}", path.display(), e)))?;

        info!(
            "Loaded ledger: balance=${:.2}, open={}, closed={}, locks={}",
            state.balance,
            state.positions.len(),
            state.closed_positions.len(),
            state.event_locks.len()
        );
        Ok(Self::from_state(state))
    }

    /// Persist the full ledger snapshot as pretty JSON.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| BotError::Persistence(format!("serialize ledger: {}", e)))?
        };

        tokio::fs::write(path.as_ref(), json.as_bytes())
            .await
            .map_err(|e| BotError::Persistence(format!("write {}: {}", path.as_ref().display(), e)))?;
        debug!("Saved ledger state to {}", path.as_ref().display());
        Ok(())
    }

    /// Atomically debit the wallet, store the position, and lock its event.
    /// The balance check happens inside the write lock: earlier buys in the
    /// same cycle have already been debited by the time this one is checked.
    pub async fn open_position(&self, new: NewPosition) -> Result<Position> {
        let mut state = self.state.write().await;

        if new.cost > state.balance {
            return Err(BotError::InsufficientBalance {
                required: new.cost,
                available: state.balance,
            });
        }

        let position = Position {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            market_id: new.market_id,
            slug: new.slug,
            side: new.side,
            token_id: new.token_id,
            entry_price: new.entry_price,
            entry_probability: new.entry_probability,
            size: new.size,
            cost: new.cost,
            opened_at: Utc::now(),
        };

        state.balance -= position.cost;
        state.event_locks.insert(position.event_id.clone());
        state.positions.push(position.clone());

        Ok(position)
    }

    /// Atomically credit the payout, move the position to the closed list,
    /// and unlock its event iff no other open position references it.
    pub async fn settle(
        &self,
        position_id: Uuid,
        resolution: Resolution,
        payout: Decimal,
    ) -> Result<ClosedPosition> {
        let mut state = self.state.write().await;

        let idx = state
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| BotError::PositionNotFound(position_id.to_string()))?;

        let position = state.positions.remove(idx);
        let pnl = payout - position.cost;
        state.balance += payout;

        let still_held = state.positions.iter().any(|p| p.event_id == position.event_id);
        if !still_held {
            state.event_locks.remove(&position.event_id);
        }

        let closed = ClosedPosition {
            position,
            closed_at: Utc::now(),
            resolution,
            payout,
            pnl,
        };
        state.closed_positions.push(closed.clone());

        Ok(closed)
    }

    pub async fn is_event_locked(&self, event_id: &str) -> bool {
        self.state.read().await.event_locks.contains(event_id)
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.state.read().await.positions.clone()
    }

    pub async fn open_position_count(&self) -> usize {
        self.state.read().await.positions.len()
    }

    pub async fn balance(&self) -> Decimal {
        self.state.read().await.balance
    }

    pub async fn initial_capital(&self) -> Decimal {
        self.state.read().await.initial_capital
    }

    /// Sum of realized P&L across all closed positions.
    pub async fn realized_pnl(&self) -> Decimal {
        self.state
            .read()
            .await
            .closed_positions
            .iter()
            .map(|c| c.pnl)
            .sum()
    }

    pub async fn closed_positions(&self) -> Vec<ClosedPosition> {
        self.state.read().await.closed_positions.clone()
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.clone()
    }

    pub async fn summary(&self) -> LedgerSummary {
        let state = self.state.read().await;
        let open_cost: Decimal = state.positions.iter().map(|p| p.cost).sum();
        LedgerSummary {
            balance: state.balance,
            open_positions: state.positions.len(),
            closed_positions: state.closed_positions.len(),
            locked_events: state.event_locks.len(),
            realized_pnl: state.closed_positions.iter().map(|c| c.pnl).sum(),
            total_value: state.balance + open_cost,
        }
    }
}
