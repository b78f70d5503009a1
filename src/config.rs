use anyhow::{bail, Context};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::api::interval_to_ms;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "PERPBOT";

/// Complete bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    pub trading: TradingConfig,
    pub candles: CandleConfig,
    pub exchange: ExchangeConfig,
    pub paper: PaperConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    pub pairs: Vec<PairConfig>,
}

/// Static per-instrument parameters
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PairConfig {
    /// Exchange coin symbol, e.g. `ETH`
    pub coin: String,
    /// Trading pair label, e.g. `ETH-PERP`
    pub pair: String,
    /// Position size in quote currency
    pub position_size: f64,
    pub take_profit_percentage: f64,
    pub risk_reward_ratio: f64,
    /// Configured price decimals; live exchange metadata takes precedence
    #[serde(default)]
    pub price_decimals: Option<u32>,
    /// Configured size decimals; live exchange metadata takes precedence
    #[serde(default)]
    pub size_decimals: Option<u32>,
}

impl PairConfig {
    /// True if an event tagged with `symbol` belongs to this instrument
    pub fn matches(&self, symbol: &str) -> bool {
        self.coin == symbol || self.pair == symbol
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CandleConfig {
    /// Exchange interval label (`1m`, `1h`, ...)
    pub interval: String,
    /// History length and rolling window capacity
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub info_url: String,
    pub ws_url: String,
    /// Book level used as the entry reference price
    pub book_depth: usize,
    /// Submit brackets as one linked request
    pub use_grouping: bool,
    pub requests_per_minute: u32,
    pub reconnect_secs: u64,
    /// Account whose fills the feed subscribes to
    #[serde(default)]
    pub user_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaperConfig {
    /// Fee charged on simulated fills, as a fraction of notional
    pub fee_rate: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PsarEma,
    RsiSma,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    pub psar_step: f64,
    pub psar_max: f64,
    pub ema_period: usize,
    pub ema_filter: bool,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub sma_period: usize,
}

impl BotConfig {
    /// Load built-in defaults, then the optional file, then `PERPBOT__*` env vars
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Self::defaults();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        Self::finish(builder)
    }

    /// Built-in defaults overlaid with a TOML document
    pub fn from_toml(overrides: &str) -> anyhow::Result<Self> {
        Self::finish(Self::defaults().add_source(File::from_str(overrides, FileFormat::Toml)))
    }

    fn defaults() -> ConfigBuilder<config::builder::DefaultState> {
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn finish(builder: ConfigBuilder<config::builder::DefaultState>) -> anyhow::Result<Self> {
        let config: BotConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trading.pairs.is_empty() {
            bail!("trading.pairs must list at least one instrument");
        }

        let mut seen = HashSet::new();
        for pair in &self.trading.pairs {
            if !seen.insert(pair.coin.as_str()) {
                bail!("duplicate instrument {}", pair.coin);
            }
            if !(pair.position_size > 0.0) {
                bail!("{}: position_size must be positive", pair.coin);
            }
            if !(pair.take_profit_percentage > 0.0) {
                bail!("{}: take_profit_percentage must be positive", pair.coin);
            }
            if !(pair.risk_reward_ratio > 0.0) {
                bail!("{}: risk_reward_ratio must be positive", pair.coin);
            }
        }

        if self.candles.count == 0 {
            bail!("candles.count must be positive");
        }
        if interval_to_ms(&self.candles.interval).is_none() {
            bail!("unknown candle interval {}", self.candles.interval);
        }
        if let Some(address) = &self.exchange.user_address {
            let hex = address.strip_prefix("0x").unwrap_or_default();
            if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("exchange.user_address must be a 0x-prefixed 20-byte hex address");
            }
        }
        if !(self.paper.fee_rate >= 0.0) {
            bail!("paper.fee_rate must not be negative");
        }

        Ok(())
    }

    pub fn pair(&self, symbol: &str) -> Option<&PairConfig> {
        self.trading.pairs.iter().find(|p| p.matches(symbol))
    }

    pub fn coins(&self) -> Vec<String> {
        self.trading.pairs.iter().map(|p| p.coin.clone()).collect()
    }
}
