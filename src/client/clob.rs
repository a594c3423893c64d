//! CLOB API client for order book depth

use super::{BookLevel, OrderBook};
use crate::error::{BotError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

pub struct ClobClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
    size: String,
}

impl ClobClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the order book for a token. Levels with unparseable prices or
    /// sizes are dropped.
    pub async fn order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(BotError::RateLimited { retry_after_secs: 60 });
        }

        let raw: RawBook = resp.error_for_status()?.json().await?;
        Ok(OrderBook {
            bids: parse_levels(raw.bids),
            asks: parse_levels(raw.asks),
        })
    }
}

fn parse_levels(raw: Vec<RawLevel>) -> Vec<BookLevel> {
    raw.into_iter()
        .filter_map(|l| {
            Some(BookLevel {
                price: l.price.parse().ok()?,
                size: l.size.parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_levels_and_drops_garbage() {
        let raw = vec![
            RawLevel { price: "0.91".to_string(), size: "12.5".to_string() },
            RawLevel { price: "bogus".to_string(), size: "1".to_string() },
        ];

        let levels = parse_levels(raw);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].price, dec!(0.91));
        assert_eq!(levels[0].size, dec!(12.5));
    }
}
