use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{ExchangeError, OrderGateway};
use crate::models::{
    Candle, Fill, FillBatch, Grouping, OrderId, OrderResponse, OrderSpec, OrderStatus, OrderType,
    Tpsl,
};

/// Simulated bracket resting on the paper book
#[derive(Debug, Clone)]
struct PaperBracket {
    is_long: bool,
    size: f64,
    entry_px: f64,
    entry_oid: OrderId,
    entry_filled: bool,
    stop_loss: Option<(OrderId, f64)>,
    take_profit: Option<(OrderId, f64)>,
}

/// Paper-trading order gateway
///
/// Accepts brackets without touching the exchange and fills them against the
/// candles passed to [`PaperGateway::observe`], pushing the resulting fills
/// into the same channel the live fill stream would use.
pub struct PaperGateway {
    next_oid: AtomicU64,
    fee_rate: f64,
    brackets: Mutex<HashMap<String, PaperBracket>>,
    fill_tx: mpsc::Sender<FillBatch>,
}

fn parse_px(value: &str) -> Result<f64, ExchangeError> {
    value
        .parse()
        .map_err(|_| ExchangeError::Rejected(format!("invalid price or size: {}", value)))
}

impl PaperGateway {
    pub fn new(fee_rate: f64, fill_tx: mpsc::Sender<FillBatch>) -> Self {
        Self {
            next_oid: AtomicU64::new(1),
            fee_rate,
            brackets: Mutex::new(HashMap::new()),
            fill_tx,
        }
    }

    fn next_oid(&self) -> OrderId {
        self.next_oid.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of coins with a live paper bracket
    pub fn open_brackets(&self) -> usize {
        self.brackets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn accept(
        &self,
        book: &mut HashMap<String, PaperBracket>,
        order: &OrderSpec,
    ) -> Result<OrderId, ExchangeError> {
        let px = parse_px(&order.limit_px)?;
        let size = parse_px(&order.sz)?;
        if px <= 0.0 || size <= 0.0 {
            return Err(ExchangeError::Rejected(format!(
                "non-positive price {} or size {}",
                order.limit_px, order.sz
            )));
        }

        match &order.order_type {
            OrderType::Limit { .. } => {
                if book.contains_key(&order.coin) {
                    return Err(ExchangeError::Rejected(format!(
                        "paper book already holds a bracket for {}",
                        order.coin
                    )));
                }
                let oid = self.next_oid();
                book.insert(
                    order.coin.clone(),
                    PaperBracket {
                        is_long: order.is_buy,
                        size,
                        entry_px: px,
                        entry_oid: oid,
                        entry_filled: false,
                        stop_loss: None,
                        take_profit: None,
                    },
                );
                Ok(oid)
            }
            OrderType::Trigger { trigger_px, tpsl, .. } => {
                let trigger = parse_px(trigger_px)?;
                let bracket = book.get_mut(&order.coin).ok_or_else(|| {
                    ExchangeError::Rejected(format!("reduce-only order without position on {}", order.coin))
                })?;
                let oid = self.next_oid();
                match tpsl {
                    Tpsl::Sl => bracket.stop_loss = Some((oid, trigger)),
                    Tpsl::Tp => bracket.take_profit = Some((oid, trigger)),
                }
                Ok(oid)
            }
        }
    }

    /// Match live brackets for the candle's coin against its range
    pub async fn observe(&self, candle: &Candle) {
        let fills = {
            let mut book = self.brackets.lock().unwrap_or_else(|e| e.into_inner());
            let Some(bracket) = book.get_mut(&candle.coin) else {
                return;
            };
            let fills = self.match_bracket(&candle.coin, bracket, candle);
            if fills.iter().any(|f| f.oid != bracket.entry_oid) {
                book.remove(&candle.coin);
            }
            fills
        };

        if fills.is_empty() {
            return;
        }
        if self
            .fill_tx
            .send(FillBatch {
                is_snapshot: false,
                fills,
            })
            .await
            .is_err()
        {
            tracing::warn!("Paper fills dropped: fill consumer gone");
        }
    }

    fn match_bracket(&self, coin: &str, bracket: &mut PaperBracket, candle: &Candle) -> Vec<Fill> {
        let mut fills = Vec::new();

        if !bracket.entry_filled {
            let crossed = if bracket.is_long {
                candle.low <= bracket.entry_px
            } else {
                candle.high >= bracket.entry_px
            };
            if crossed {
                bracket.entry_filled = true;
                tracing::info!(
                    "[paper] {} entry {} filled @ {}",
                    coin,
                    bracket.entry_oid,
                    bracket.entry_px
                );
                fills.push(self.fill(
                    coin,
                    bracket.entry_oid,
                    bracket.is_long,
                    bracket.entry_px,
                    bracket.size,
                    0.0,
                    candle.close_time,
                ));
            }
            // Protective legs only arm from the next observation on
            return fills;
        }

        let dir = if bracket.is_long { 1.0 } else { -1.0 };
        let stop_hit = bracket.stop_loss.filter(|(_, px)| {
            if bracket.is_long { candle.low <= *px } else { candle.high >= *px }
        });
        let target_hit = bracket.take_profit.filter(|(_, px)| {
            if bracket.is_long { candle.high >= *px } else { candle.low <= *px }
        });

        if let Some((oid, px)) = stop_hit.or(target_hit) {
            let closed_pnl = (px - bracket.entry_px) * bracket.size * dir;
            tracing::info!(
                "[paper] {} exit {} @ {} (closed pnl {:.4})",
                coin,
                oid,
                px,
                closed_pnl
            );
            fills.push(self.fill(
                coin,
                oid,
                !bracket.is_long,
                px,
                bracket.size,
                closed_pnl,
                candle.close_time,
            ));
        }

        fills
    }

    #[allow(clippy::too_many_arguments)]
    fn fill(
        &self,
        coin: &str,
        oid: OrderId,
        is_buy: bool,
        px: f64,
        sz: f64,
        closed_pnl: f64,
        time: i64,
    ) -> Fill {
        Fill {
            coin: coin.to_string(),
            oid,
            px,
            sz,
            side: if is_buy { "B" } else { "A" }.to_string(),
            time,
            closed_pnl,
            fee: px * sz * self.fee_rate,
        }
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(
        &self,
        orders: Vec<OrderSpec>,
        grouping: Grouping,
    ) -> Result<Vec<OrderResponse>, ExchangeError> {
        let mut book = self.brackets.lock().unwrap_or_else(|e| e.into_inner());

        let responses: Vec<OrderResponse> = match grouping {
            // Linked requests are all-or-nothing
            Grouping::NormalTpsl => {
                let mut staged = book.clone();
                let mut responses = Vec::with_capacity(orders.len());
                for order in &orders {
                    let oid = self.accept(&mut staged, order)?;
                    responses.push(OrderResponse::Accepted(OrderStatus::Resting { oid }));
                }
                *book = staged;
                responses
            }
            Grouping::Na => orders
                .iter()
                .map(|order| match self.accept(&mut book, order) {
                    Ok(oid) => OrderResponse::Accepted(OrderStatus::Resting { oid }),
                    Err(ExchangeError::Rejected(error)) => OrderResponse::Rejected { error },
                    Err(e) => OrderResponse::Rejected {
                        error: e.to_string(),
                    },
                })
                .collect(),
        };

        tracing::info!(
            "[paper] accepted {}/{} orders ({:?}) for {}",
            responses.iter().filter(|r| r.status().is_some()).count(),
            orders.len(),
            grouping,
            orders.first().map(|o| o.coin.as_str()).unwrap_or("-")
        );

        Ok(responses)
    }
}
