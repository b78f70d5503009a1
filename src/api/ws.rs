use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use crate::config::BotConfig;
use crate::models::{Candle, CandleEvent, Fill, FillBatch};

pub const HYPERLIQUID_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
const KEEPALIVE_SECS: u64 = 30;

/// Decoded message from the exchange websocket
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Candle(CandleEvent),
    Fills(FillBatch),
}

/// Decode one websocket text frame
///
/// Returns `None` for control channels (subscription acks, pongs) and
/// anything that does not parse; the feed never fails on a bad frame.
pub fn parse_feed_message(text: &str) -> Option<FeedMessage> {
    let value: Value = serde_json::from_str(text).ok()?;
    let channel = value.get("channel")?.as_str()?;
    let data = value.get("data")?;

    match channel {
        "candle" => {
            let candle: Candle = serde_json::from_value(data.clone()).ok()?;
            Some(FeedMessage::Candle(CandleEvent {
                coin: candle.coin.clone(),
                is_snapshot: false,
                candle,
            }))
        }
        "userFills" => {
            let is_snapshot = data
                .get("isSnapshot")
                .and_then(|b| b.as_bool())
                .unwrap_or(false);
            let fills: Vec<Fill> = data
                .get("fills")?
                .as_array()?
                .iter()
                .filter_map(|f| serde_json::from_value(f.clone()).ok())
                .collect();
            Some(FeedMessage::Fills(FillBatch { is_snapshot, fills }))
        }
        _ => None,
    }
}

/// Websocket subscription to candle and user-fill streams
pub struct HyperliquidFeed {
    ws_url: String,
    coins: Vec<String>,
    interval: String,
    user: Option<String>,
    reconnect_delay: Duration,
}

impl HyperliquidFeed {
    pub fn new(ws_url: impl Into<String>, coins: Vec<String>, interval: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            coins,
            interval: interval.into(),
            user: None,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Candle streams for every configured coin, plus the configured account's fills
    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.exchange.ws_url.clone(),
            config.coins(),
            config.candles.interval.clone(),
        )
        .with_user(config.exchange.user_address.clone())
        .with_reconnect_delay(Duration::from_secs(config.exchange.reconnect_secs))
    }

    /// Also subscribe to fills for this account address
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn subscriptions(&self) -> Vec<Value> {
        let mut subs: Vec<Value> = self
            .coins
            .iter()
            .map(|coin| {
                json!({
                    "method": "subscribe",
                    "subscription": {"type": "candle", "coin": coin, "interval": self.interval}
                })
            })
            .collect();

        if let Some(user) = &self.user {
            subs.push(json!({
                "method": "subscribe",
                "subscription": {"type": "userFills", "user": user}
            }));
        }

        subs
    }

    /// Run until both receivers are dropped, reconnecting on any socket error
    pub async fn run(self, candle_tx: mpsc::Sender<CandleEvent>, fill_tx: mpsc::Sender<FillBatch>) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            tracing::info!("Connecting to {} (attempt {})", self.ws_url, attempt);

            match self.run_connection(&candle_tx, &fill_tx).await {
                Ok(()) => {
                    tracing::info!("Event consumers gone, closing feed");
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        "Feed connection lost: {}. Reconnecting in {:?}...",
                        e,
                        self.reconnect_delay
                    );
                    sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// One connection lifetime. `Ok` means the consumers hung up.
    async fn run_connection(
        &self,
        candle_tx: &mpsc::Sender<CandleEvent>,
        fill_tx: &mpsc::Sender<FillBatch>,
    ) -> anyhow::Result<()> {
        let (ws, _resp) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await?;
        let (mut writer, mut reader) = ws.split();

        for sub in self.subscriptions() {
            writer.send(Message::Text(sub.to_string().into())).await?;
        }
        tracing::info!(
            "Subscribed to {} candle streams{}",
            self.coins.len(),
            if self.user.is_some() { " and user fills" } else { "" }
        );

        let mut keepalive = interval(Duration::from_secs(KEEPALIVE_SECS));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    writer
                        .send(Message::Text(json!({"method": "ping"}).to_string().into()))
                        .await?;
                }
                msg = reader.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match parse_feed_message(&text) {
                                Some(FeedMessage::Candle(event)) => {
                                    if candle_tx.send(event).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                Some(FeedMessage::Fills(batch)) => {
                                    if fill_tx.send(batch).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                None => {}
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            writer.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            anyhow::bail!("server closed connection: {:?}", frame);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => anyhow::bail!("stream ended"),
                    }
                }
            }
        }
    }
}
