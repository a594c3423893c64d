//! Error types for the trading bot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Incomplete market data: {0}")]
    DataIncomplete(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Audit log error: {0}")]
    AuditLog(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Transient failures are skipped for the current cycle and retried on
    /// the next natural schedule; only rate limiting is retried in-cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::Network(_) | BotError::Json(_) | BotError::WebSocket(_) | BotError::DataIncomplete(_)
        )
    }
}
