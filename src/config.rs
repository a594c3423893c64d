//! Configuration management

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub strategy: StrategyConfig,
    pub engine: EngineConfig,
    pub scanner: ScannerConfig,
    pub watcher: WatcherConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Gamma API endpoint (event discovery, market detail)
    pub gamma_url: String,
    /// CLOB API endpoint (order books)
    pub clob_url: String,
    /// Market quote-stream WebSocket endpoint
    pub ws_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Maximum hours until market close for a candidate
    pub max_hours_to_close: Decimal,
    /// Acceptance band for implied probability, inclusive
    pub min_probability: Decimal,
    pub max_probability: Decimal,
    /// Minimum best-ask depth value (price x size) in USD
    pub min_liquidity_usd: Decimal,
    /// Fractional bid drop from entry that triggers a stop-loss exit
    pub stop_price_drop: Decimal,
    /// Fraction of performance-adjusted capital risked per opportunity
    pub per_market_percent: Decimal,
    /// Allocation multiplier applied to crypto markets
    pub crypto_discount: Decimal,
    /// Starting capital; sizing base compounds realized P&L on top of this
    pub initial_capital: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Eligibility scan cadence
    pub scan_interval_secs: u64,
    /// Resolution poll cadence
    pub monitor_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Discovery page size
    pub page_size: usize,
    /// Markets checked per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_pause_ms: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Back-off after an HTTP 429 before retrying the same page
    pub rate_limit_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Keepalive cadence while connected
    pub ping_interval_secs: u64,
    /// Delay before reconnecting after a disconnect
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Ledger snapshot path (JSON)
    pub state_file: String,
    /// SQLite trade audit log path
    pub trade_db: String,
}

impl Config {
    /// Load configuration from file, with `POLYSNIPER_`-prefixed environment
    /// variables layered on top.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(&path.as_ref().to_string_lossy()).required(false),
            )
            .add_source(config::Environment::with_prefix("POLYSNIPER").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Load from default locations, falling back to built-in defaults.
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = ["config.toml", "~/.config/polysniper/config.toml"];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        Ok(Config::default())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".to_string(),
            clob_url: "https://clob.polymarket.com".to_string(),
            ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_hours_to_close: dec!(4),
            min_probability: dec!(0.80),
            max_probability: dec!(0.96),
            min_liquidity_usd: dec!(2.5),
            stop_price_drop: dec!(0.50),
            per_market_percent: dec!(0.04),
            crypto_discount: dec!(0.20),
            initial_capital: dec!(50),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 7200,
            monitor_interval_secs: 60,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            batch_size: 1,
            batch_pause_ms: 10,
            request_timeout_secs: 10,
            rate_limit_backoff_secs: 60,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 10,
            reconnect_delay_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: "state.json".to_string(),
            trade_db: "trades.db".to_string(),
        }
    }
}
