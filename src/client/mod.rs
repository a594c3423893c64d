//! Polymarket API clients
//!
//! - Gamma API: event discovery and market detail
//! - CLOB API: order book depth
//!
//! Everything the decision pipeline needs from upstream goes through the
//! [`MarketDataSource`] trait so the scanner and monitor can be tested
//! against a mock.

mod clob;
mod gamma;

pub use clob::ClobClient;
pub use gamma::GammaClient;

use crate::config::ApiConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One entry of the paged event listing.
#[derive(Debug, Clone)]
pub struct EventListing {
    pub event_id: String,
    pub slug: String,
    pub markets: Vec<MarketRef>,
}

/// Market reference inside an event listing.
#[derive(Debug, Clone)]
pub struct MarketRef {
    pub id: String,
    pub slug: String,
}

/// Full market detail. Pricing and token fields may be absent on an
/// otherwise successful fetch; the stage-1 filter treats that as
/// incomplete data.
#[derive(Debug, Clone)]
pub struct MarketDetail {
    pub id: String,
    /// Implied prices per outcome, YES first.
    pub outcome_prices: Vec<Decimal>,
    /// CLOB token ids per outcome, YES first.
    pub token_ids: Vec<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub closed: bool,
}

/// A single order book level.
#[derive(Debug, Clone, PartialEq)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book for one token.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Upstream market data: paged discovery, market detail, and order books.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// One page of open events. HTTP 429 surfaces as `BotError::RateLimited`.
    async fn events_page(&self, offset: usize, limit: usize) -> Result<Vec<EventListing>>;

    async fn market_by_slug(&self, slug: &str) -> Result<Option<MarketDetail>>;

    async fn market_by_id(&self, id: &str) -> Result<Option<MarketDetail>>;

    async fn order_book(&self, token_id: &str) -> Result<OrderBook>;
}

/// Unified client over both HTTP APIs.
pub struct PolymarketClient {
    pub gamma: GammaClient,
    pub clob: ClobClient,
}

impl PolymarketClient {
    pub fn new(config: &ApiConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            gamma: GammaClient::new(&config.gamma_url, timeout_secs)?,
            clob: ClobClient::new(&config.clob_url, timeout_secs)?,
        })
    }
}

#[async_trait]
impl MarketDataSource for PolymarketClient {
    async fn events_page(&self, offset: usize, limit: usize) -> Result<Vec<EventListing>> {
        self.gamma.events_page(offset, limit).await
    }

    async fn market_by_slug(&self, slug: &str) -> Result<Option<MarketDetail>> {
        self.gamma.market_by_slug(slug).await
    }

    async fn market_by_id(&self, id: &str) -> Result<Option<MarketDetail>> {
        self.gamma.market_by_id(id).await
    }

    async fn order_book(&self, token_id: &str) -> Result<OrderBook> {
        self.clob.order_book(token_id).await
    }
}
