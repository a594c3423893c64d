//! Settled-trade audit log
//!
//! Append-only SQLite record of every settlement (resolution or stop-loss).
//! This is an audit sink, not state: insert failures are logged and the
//! cycle carries on.

use crate::error::Result;
use crate::types::ClosedPosition;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::warn;

#[derive(Clone)]
pub struct TradeLog {
    pool: SqlitePool,
}

impl TradeLog {
    /// Open (or create) the trade log database.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await?;

        let log = Self { pool };
        log.run_migrations().await?;
        Ok(log)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                closed_at TEXT NOT NULL,
                slug TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                size TEXT NOT NULL,
                cost TEXT NOT NULL,
                resolution TEXT NOT NULL,
                payout TEXT NOT NULL,
                pnl TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a settlement. Failures are swallowed after a warning so a dead
    /// audit store never blocks settlement itself.
    pub async fn record(&self, closed: &ClosedPosition) {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (id, closed_at, slug, side, entry_price, size, cost, resolution, payout, pnl)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(closed.position.id.to_string())
        .bind(closed.closed_at.to_rfc3339())
        .bind(&closed.position.slug)
        .bind(closed.position.side.to_string())
        .bind(closed.position.entry_price.to_string())
        .bind(closed.position.size.to_string())
        .bind(closed.position.cost.to_string())
        .bind(closed.resolution.to_string())
        .bind(closed.payout.to_string())
        .bind(closed.pnl.to_string())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to record trade {}: {}", closed.position.id, e);
        }
    }

    /// Number of recorded settlements.
    pub async fn trade_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
