use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::{interval_to_ms, ExchangeError, MarketData};
use crate::models::{AssetMeta, BookLevel, Candle, L2Book};

pub const HYPERLIQUID_INFO_URL: &str = "https://api.hyperliquid.xyz/info";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 10;

type InfoRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Hyperliquid `/info` endpoint
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct HyperliquidClient {
    client: Client,
    info_url: String,
    rate_limiter: Arc<InfoRateLimiter>,
    initial_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    universe: Vec<AssetMeta>,
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    coin: String,
    levels: Vec<Vec<BookLevel>>,
}

impl HyperliquidClient {
    /// Create a client posting to `info_url`, limited to `requests_per_minute`
    pub fn new(info_url: impl Into<String>, requests_per_minute: u32) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            info_url: info_url.into(),
            rate_limiter,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay (doubles on every attempt)
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// POST an info request, retrying transport errors, 429 and 5xx with exponential backoff
    async fn post_info<T: DeserializeOwned>(&self, payload: &Value) -> Result<T, ExchangeError> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.post_info_once(payload).await {
                Ok(body) => return Ok(serde_json::from_str(&body)?),
                Err(e) if is_retryable(&e) => {
                    if attempt < MAX_RETRIES {
                        let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                        tracing::warn!(
                            "Info request {} attempt {}/{} failed: {}. Retrying in {:?}...",
                            payload["type"],
                            attempt,
                            MAX_RETRIES,
                            e,
                            backoff
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(ExchangeError::RateLimited))
    }

    async fn post_info_once(&self, payload: &Value) -> Result<String, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let response = self.client.post(&self.info_url).json(payload).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ExchangeError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.text().await?)
    }
}

fn is_retryable(error: &ExchangeError) -> bool {
    match error {
        ExchangeError::Http(_) | ExchangeError::RateLimited => true,
        ExchangeError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl MarketData for HyperliquidClient {
    async fn candle_history(
        &self,
        coin: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let interval_ms = interval_to_ms(interval)
            .ok_or_else(|| ExchangeError::Unsupported(format!("candle interval {}", interval)))?;

        let end_time = Utc::now().timestamp_millis();
        let start_time = end_time - interval_ms * count as i64;

        let payload = json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval,
                "startTime": start_time,
                "endTime": end_time
            }
        });

        let mut candles: Vec<Candle> = self.post_info(&payload).await?;
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }

        tracing::debug!("Fetched {} {} candles for {}", candles.len(), interval, coin);

        Ok(candles)
    }

    async fn l2_book(&self, coin: &str) -> Result<L2Book, ExchangeError> {
        let payload = json!({ "type": "l2Book", "coin": coin });
        let response: BookResponse = self.post_info(&payload).await?;

        let mut levels = response.levels.into_iter();
        let (bids, asks) = match (levels.next(), levels.next()) {
            (Some(bids), Some(asks)) => (bids, asks),
            _ => return Err(ExchangeError::Parse(format!("l2Book for {} missing a side", coin))),
        };

        Ok(L2Book {
            coin: if response.coin.is_empty() {
                coin.to_string()
            } else {
                response.coin
            },
            bids,
            asks,
        })
    }

    async fn meta(&self) -> Result<Vec<AssetMeta>, ExchangeError> {
        let response: MetaResponse = self.post_info(&json!({ "type": "meta" })).await?;
        Ok(response.universe)
    }
}
