// Exchange collaborators: market data, order submission and event streams
pub mod hyperliquid;
pub mod paper;
pub mod ws;

pub use hyperliquid::HyperliquidClient;
pub use paper::PaperGateway;
pub use ws::{parse_feed_message, FeedMessage, HyperliquidFeed};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AssetMeta, Candle, Grouping, L2Book, OrderResponse, OrderSpec};

/// Failure talking to the exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        ExchangeError::Parse(e.to_string())
    }
}

/// Read-only market queries
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `count` candles for `coin`, oldest first
    async fn candle_history(
        &self,
        coin: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn l2_book(&self, coin: &str) -> Result<L2Book, ExchangeError>;

    /// Perpetuals universe with size precision per asset
    async fn meta(&self) -> Result<Vec<AssetMeta>, ExchangeError>;
}

/// Order submission
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit orders and return one response per order, in request order
    ///
    /// `Err` means the request as a whole failed; a single refused order is
    /// an [`OrderResponse::Rejected`] entry.
    async fn submit(
        &self,
        orders: Vec<OrderSpec>,
        grouping: Grouping,
    ) -> Result<Vec<OrderResponse>, ExchangeError>;

    /// Whether the gateway can accept a bracket as one linked request
    fn supports_grouping(&self) -> bool {
        true
    }
}

/// Milliseconds covered by one candle of the given interval label
pub fn interval_to_ms(interval: &str) -> Option<i64> {
    const MINUTE: i64 = 60_000;
    let ms = match interval {
        "1m" => MINUTE,
        "3m" => 3 * MINUTE,
        "5m" => 5 * MINUTE,
        "15m" => 15 * MINUTE,
        "30m" => 30 * MINUTE,
        "1h" => 60 * MINUTE,
        "2h" => 120 * MINUTE,
        "4h" => 240 * MINUTE,
        "8h" => 480 * MINUTE,
        "12h" => 720 * MINUTE,
        "1d" => 1440 * MINUTE,
        "3d" => 3 * 1440 * MINUTE,
        "1w" => 7 * 1440 * MINUTE,
        _ => return None,
    };
    Some(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_to_ms() {
        assert_eq!(interval_to_ms("1m"), Some(60_000));
        assert_eq!(interval_to_ms("1h"), Some(3_600_000));
        assert_eq!(interval_to_ms("1d"), Some(86_400_000));
        assert_eq!(interval_to_ms("7m"), None);
    }
}
