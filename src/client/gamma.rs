//! Gamma API client for event discovery and market detail

use super::{EventListing, MarketDetail, MarketRef};
use crate::error::{BotError, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

pub struct GammaClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GammaEvent {
    id: String,
    slug: Option<String>,
    markets: Option<Vec<GammaMarketRef>>,
}

#[derive(Debug, Deserialize)]
struct GammaMarketRef {
    id: String,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    id: String,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    closed: Option<bool>,
    /// JSON string like `["0.85", "0.15"]`
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<String>,
    /// JSON string of token ids, YES first
    #[serde(rename = "clobTokenIds")]
    clob_token_ids: Option<String>,
}

impl GammaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// One page of open events.
    pub async fn events_page(&self, offset: usize, limit: usize) -> Result<Vec<EventListing>> {
        let url = format!("{}/events", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("closed", "false".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(BotError::RateLimited { retry_after_secs: 60 });
        }

        let events: Vec<GammaEvent> = resp.error_for_status()?.json().await?;

        Ok(events
            .into_iter()
            .filter_map(|e| {
                let markets = e.markets?;
                if markets.is_empty() {
                    return None;
                }
                Some(EventListing {
                    event_id: e.id,
                    slug: e.slug.unwrap_or_default(),
                    markets: markets
                        .into_iter()
                        .map(|m| MarketRef {
                            id: m.id,
                            slug: m.slug.unwrap_or_default(),
                        })
                        .collect(),
                })
            })
            .collect())
    }

    pub async fn market_by_slug(&self, slug: &str) -> Result<Option<MarketDetail>> {
        self.fetch_market(&[("slug", slug)]).await
    }

    pub async fn market_by_id(&self, id: &str) -> Result<Option<MarketDetail>> {
        self.fetch_market(&[("id", id)]).await
    }

    async fn fetch_market(&self, query: &[(&str, &str)]) -> Result<Option<MarketDetail>> {
        let url = format!("{}/markets", self.base_url);
        let resp = self.http.get(&url).query(query).send().await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(BotError::RateLimited { retry_after_secs: 60 });
        }

        let markets: Vec<GammaMarket> = resp.error_for_status()?.json().await?;
        Ok(markets.into_iter().next().map(parse_detail))
    }
}

/// The API returns prices and token ids as stringified JSON arrays;
/// missing or malformed fields decode to empty vectors and are rejected
/// downstream as incomplete data.
fn parse_detail(gm: GammaMarket) -> MarketDetail {
    let outcome_prices: Vec<Decimal> = gm
        .outcome_prices
        .as_deref()
        .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .map(|prices| prices.iter().filter_map(|p| p.parse().ok()).collect())
        .unwrap_or_default();

    let token_ids: Vec<String> = gm
        .clob_token_ids
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let end_date: Option<DateTime<Utc>> = gm.end_date.as_deref().and_then(|s| s.parse().ok());

    MarketDetail {
        id: gm.id,
        outcome_prices,
        token_ids,
        end_date,
        closed: gm.closed.unwrap_or(false),
    }
}
