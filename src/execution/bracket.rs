use thiserror::Error;
use uuid::Uuid;

use super::precision::{format_price, format_size, round_to, Precision};
use crate::api::{ExchangeError, OrderGateway};
use crate::config::PairConfig;
use crate::models::{Grouping, L2Book, OrderResponse, OrderSpec, OrderStatus, OrderType, Tpsl};

/// Reasons a bracket cannot be planned
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("reference price must be positive, got {0}")]
    InvalidReferencePrice(f64),

    #[error("invalid instrument parameters: {0}")]
    InvalidPair(String),

    #[error("position size rounds to zero at {0} size decimals")]
    ZeroSize(u32),

    #[error("order book for {coin} has no {side}")]
    EmptyBook { coin: String, side: &'static str },
}

/// Entry, stop-loss and take-profit for one position, pre-rounded
#[derive(Debug, Clone, PartialEq)]
pub struct BracketPlan {
    pub id: Uuid,
    pub is_long: bool,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub precision: Precision,
}

/// Price used to plan an entry: the ask side for a long, the bid side for a short
///
/// `depth` indexes into the side so the estimate accounts for some slippage;
/// a thinner book uses its deepest level.
pub fn reference_price(book: &L2Book, is_long: bool, depth: usize) -> Result<f64, PlanError> {
    let (levels, side) = if is_long {
        (&book.asks, "asks")
    } else {
        (&book.bids, "bids")
    };

    levels
        .get(depth)
        .or_else(|| levels.last())
        .map(|level| level.px)
        .ok_or_else(|| PlanError::EmptyBook {
            coin: book.coin.clone(),
            side,
        })
}

/// Compute the bracket for a directional entry at `reference_price`
pub fn plan_bracket(
    is_long: bool,
    reference_price: f64,
    pair: &PairConfig,
    precision: Precision,
) -> Result<BracketPlan, PlanError> {
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return Err(PlanError::InvalidReferencePrice(reference_price));
    }
    if !(pair.position_size > 0.0) {
        return Err(PlanError::InvalidPair(format!(
            "{} position_size {}",
            pair.coin, pair.position_size
        )));
    }
    if !(pair.take_profit_percentage > 0.0) || !(pair.risk_reward_ratio > 0.0) {
        return Err(PlanError::InvalidPair(format!(
            "{} take_profit_percentage {} / risk_reward_ratio {}",
            pair.coin, pair.take_profit_percentage, pair.risk_reward_ratio
        )));
    }

    let size = round_to(pair.position_size / reference_price, precision.size_decimals);
    if size <= 0.0 {
        return Err(PlanError::ZeroSize(precision.size_decimals));
    }

    let tp_distance = reference_price * pair.take_profit_percentage;
    let sl_distance = tp_distance / pair.risk_reward_ratio;
    let dir = if is_long { 1.0 } else { -1.0 };

    let price_dp = precision.max_price_decimals;
    Ok(BracketPlan {
        id: Uuid::new_v4(),
        is_long,
        entry_price: round_to(reference_price, price_dp),
        stop_loss: round_to(reference_price - dir * sl_distance, price_dp),
        take_profit: round_to(reference_price + dir * tp_distance, price_dp),
        size,
        precision,
    })
}

impl BracketPlan {
    /// Client order id for leg `index` of this bracket
    fn cloid(&self, index: u128) -> String {
        format!("0x{:032x}", self.id.as_u128().wrapping_add(index))
    }

    /// The three linked orders: entry limit, then stop-loss and take-profit triggers
    pub fn orders(&self, coin: &str) -> Vec<OrderSpec> {
        let price_dp = self.precision.max_price_decimals;
        let size = format_size(self.size, self.precision.size_decimals);

        let trigger = |index: u128, px: f64, tpsl: Tpsl| {
            let px = format_price(px, price_dp);
            OrderSpec {
                coin: coin.to_string(),
                is_buy: !self.is_long,
                sz: size.clone(),
                limit_px: px.clone(),
                order_type: OrderType::Trigger {
                    is_market: true,
                    trigger_px: px,
                    tpsl,
                },
                reduce_only: true,
                cloid: Some(self.cloid(index)),
            }
        };

        vec![
            OrderSpec {
                coin: coin.to_string(),
                is_buy: self.is_long,
                sz: size.clone(),
                limit_px: format_price(self.entry_price, price_dp),
                order_type: OrderType::Limit {
                    tif: "Gtc".to_string(),
                },
                reduce_only: false,
                cloid: Some(self.cloid(0)),
            },
            trigger(1, self.stop_loss, Tpsl::Sl),
            trigger(2, self.take_profit, Tpsl::Tp),
        ]
    }

    /// Prices and size as they go out on the wire
    pub fn describe(&self) -> String {
        let price_dp = self.precision.max_price_decimals;
        format!(
            "entry {} SL {} TP {} size {}",
            format_price(self.entry_price, price_dp),
            format_price(self.stop_loss, price_dp),
            format_price(self.take_profit, price_dp),
            format_size(self.size, self.precision.size_decimals)
        )
    }
}

/// Submit a bracket and return the entry order's status
///
/// Grouped submission is all-or-nothing. Without grouping the entry is sent
/// first and must succeed; the protective legs are then sent one by one and a
/// failing leg is only logged. A rejected entry rejects the whole bracket.
pub async fn submit_bracket(
    gateway: &dyn OrderGateway,
    orders: Vec<OrderSpec>,
    use_grouping: bool,
) -> Result<OrderStatus, ExchangeError> {
    if use_grouping && gateway.supports_grouping() {
        let mut statuses = gateway
            .submit(orders, Grouping::NormalTpsl)
            .await?
            .into_iter();
        let entry = statuses
            .next()
            .ok_or_else(|| ExchangeError::Parse("empty status list for bracket".to_string()))
            .and_then(accepted)?;
        for (label, response) in ["stop-loss", "take-profit"].into_iter().zip(statuses) {
            if let OrderResponse::Rejected { error } = response {
                tracing::warn!("Protective {} order rejected for {:?}: {}", label, entry, error);
            }
        }
        return Ok(entry);
    }

    let mut orders = orders.into_iter();
    let entry = orders
        .next()
        .ok_or_else(|| ExchangeError::Rejected("bracket without entry order".to_string()))?;

    let status = gateway
        .submit(vec![entry], Grouping::Na)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ExchangeError::Parse("empty status list for entry".to_string()))
        .and_then(accepted)?;

    for leg in orders {
        let label = match &leg.order_type {
            OrderType::Trigger { tpsl: Tpsl::Sl, .. } => "stop-loss",
            OrderType::Trigger { tpsl: Tpsl::Tp, .. } => "take-profit",
            OrderType::Limit { .. } => "limit",
        };
        let result = gateway
            .submit(vec![leg], Grouping::Na)
            .await
            .and_then(|statuses| statuses.into_iter().try_for_each(|s| accepted(s).map(drop)));
        if let Err(e) = result {
            tracing::warn!("Protective {} order failed for {:?}: {}", label, status, e);
        }
    }

    Ok(status)
}

fn accepted(response: OrderResponse) -> Result<OrderStatus, ExchangeError> {
    match response {
        OrderResponse::Accepted(status) => Ok(status),
        OrderResponse::Rejected { error } => Err(ExchangeError::Rejected(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookLevel;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn pair(tp: f64, rr: f64) -> PairConfig {
        PairConfig {
            coin: "ETH".to_string(),
            pair: "ETH-PERP".to_string(),
            position_size: 1000.0,
            take_profit_percentage: tp,
            risk_reward_ratio: rr,
            price_decimals: None,
            size_decimals: None,
        }
    }

    fn levels(prices: &[f64]) -> Vec<BookLevel> {
        prices
            .iter()
            .map(|&px| BookLevel { px, sz: 1.0, n: 1 })
            .collect()
    }

    fn book() -> L2Book {
        L2Book {
            coin: "ETH".to_string(),
            bids: levels(&[1999.9, 1999.8, 1999.5]),
            asks: levels(&[2000.0, 2000.2, 2000.6]),
        }
    }

    #[test]
    fn test_long_bracket_prices() {
        let plan = plan_bracket(true, 2000.0, &pair(0.01, 2.0), Precision::DEFAULT).unwrap();

        assert!(plan.is_long);
        assert_eq!(plan.entry_price, 2000.0);
        assert_eq!(plan.stop_loss, 1990.0);
        assert_eq!(plan.take_profit, 2020.0);
        assert_eq!(plan.size, 0.5);
    }

    #[test]
    fn test_short_bracket_prices() {
        let plan = plan_bracket(false, 2000.0, &pair(0.01, 2.0), Precision::DEFAULT).unwrap();

        assert_eq!(plan.stop_loss, 2010.0);
        assert_eq!(plan.take_profit, 1980.0);
    }

    #[test]
    fn test_prices_and_size_rounded_to_precision() {
        let precision = Precision::from_sz_decimals(4);
        let plan = plan_bracket(true, 1234.567, &pair(0.015, 2.0), precision).unwrap();

        // 1000 / 1234.567 = 0.81000...
        assert_eq!(plan.size, 0.81);
        assert_eq!(plan.entry_price, 1234.57);
        // tp 18.518505, sl 9.2592525
        assert_eq!(plan.take_profit, 1253.09);
        assert_eq!(plan.stop_loss, 1225.31);
    }

    #[test]
    fn test_describe_uses_wire_prices() {
        let precision = Precision::from_sz_decimals(4);
        let plan = plan_bracket(true, 1234.567, &pair(0.015, 2.0), precision).unwrap();
        let orders = plan.orders("ETH");

        // Two-decimal plan prices exceed five significant figures on the wire
        assert_eq!(plan.describe(), "entry 1234.6 SL 1225.3 TP 1253.1 size 0.81");
        assert!(plan.describe().contains(&format!("SL {}", orders[1].limit_px)));
        assert!(plan.describe().contains(&format!("TP {}", orders[2].limit_px)));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            plan_bracket(true, 0.0, &pair(0.01, 2.0), Precision::DEFAULT),
            Err(PlanError::InvalidReferencePrice(0.0))
        );
        assert!(matches!(
            plan_bracket(true, 2000.0, &pair(0.01, 0.0), Precision::DEFAULT),
            Err(PlanError::InvalidPair(_))
        ));
        assert_eq!(
            plan_bracket(true, 1_000_000.0, &pair(0.01, 2.0), Precision::from_sz_decimals(0)),
            Err(PlanError::ZeroSize(0))
        );
    }

    #[test]
    fn test_reference_price_uses_depth_on_opposite_side() {
        assert_eq!(reference_price(&book(), true, 2), Ok(2000.6));
        assert_eq!(reference_price(&book(), false, 2), Ok(1999.5));
        assert_eq!(reference_price(&book(), true, 0), Ok(2000.0));
    }

    #[test]
    fn test_reference_price_thin_and_empty_book() {
        let mut thin = book();
        thin.asks.truncate(1);
        assert_eq!(reference_price(&thin, true, 2), Ok(2000.0));

        thin.bids.clear();
        assert_eq!(
            reference_price(&thin, false, 2),
            Err(PlanError::EmptyBook {
                coin: "ETH".to_string(),
                side: "bids"
            })
        );
    }

    #[test]
    fn test_orders_shape() {
        let plan = plan_bracket(true, 2000.0, &pair(0.01, 2.0), Precision::DEFAULT).unwrap();
        let orders = plan.orders("ETH");

        assert_eq!(orders.len(), 3);

        let entry = &orders[0];
        assert!(entry.is_buy);
        assert!(!entry.reduce_only);
        assert_eq!(entry.limit_px, "2000");
        assert_eq!(entry.sz, "0.5");
        assert!(matches!(entry.order_type, OrderType::Limit { ref tif } if tif == "Gtc"));

        for (order, tpsl, px) in [(&orders[1], Tpsl::Sl, "1990"), (&orders[2], Tpsl::Tp, "2020")] {
            assert!(!order.is_buy);
            assert!(order.reduce_only);
            assert_eq!(order.limit_px, px);
            assert_eq!(
                order.order_type,
                OrderType::Trigger {
                    is_market: true,
                    trigger_px: px.to_string(),
                    tpsl
                }
            );
        }

        let cloids: Vec<_> = orders.iter().filter_map(|o| o.cloid.clone()).collect();
        assert_eq!(cloids.len(), 3);
        assert!(cloids.iter().all(|c| c.starts_with("0x") && c.len() == 34));
        assert_ne!(cloids[0], cloids[1]);
    }

    #[test]
    fn test_short_orders_flip_sides() {
        let plan = plan_bracket(false, 2000.0, &pair(0.01, 2.0), Precision::DEFAULT).unwrap();
        let orders = plan.orders("ETH");

        assert!(!orders[0].is_buy);
        assert!(orders[1].is_buy && orders[2].is_buy);
    }

    /// Records every submission; fails orders whose index is listed
    struct RecordingGateway {
        grouping: bool,
        fail_calls: Vec<usize>,
        calls: Mutex<Vec<(usize, Grouping)>>,
    }

    impl RecordingGateway {
        fn new(grouping: bool, fail_calls: Vec<usize>) -> Self {
            Self {
                grouping,
                fail_calls,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderGateway for RecordingGateway {
        async fn submit(
            &self,
            orders: Vec<OrderSpec>,
            grouping: Grouping,
        ) -> Result<Vec<OrderResponse>, ExchangeError> {
            let mut calls = self.calls.lock().unwrap();
            let call = calls.len();
            calls.push((orders.len(), grouping));
            if self.fail_calls.contains(&call) {
                return Err(ExchangeError::Rejected("insufficient margin".to_string()));
            }
            Ok((0..orders.len())
                .map(|i| {
                    OrderResponse::Accepted(OrderStatus::Resting {
                        oid: 100 + (call + i) as u64,
                    })
                })
                .collect())
        }

        fn supports_grouping(&self) -> bool {
            self.grouping
        }
    }

    fn bracket_orders() -> Vec<OrderSpec> {
        plan_bracket(true, 2000.0, &pair(0.01, 2.0), Precision::DEFAULT)
            .unwrap()
            .orders("ETH")
    }

    #[tokio::test]
    async fn test_grouped_submission() {
        let gateway = RecordingGateway::new(true, vec![]);

        let status = submit_bracket(&gateway, bracket_orders(), true).await.unwrap();

        assert_eq!(status.order_id(), 100);
        assert_eq!(*gateway.calls.lock().unwrap(), vec![(3, Grouping::NormalTpsl)]);
    }

    #[tokio::test]
    async fn test_grouped_rejection_fails_entry() {
        let gateway = RecordingGateway::new(true, vec![0]);
        assert!(submit_bracket(&gateway, bracket_orders(), true).await.is_err());
    }

    #[tokio::test]
    async fn test_sequential_when_gateway_cannot_group() {
        let gateway = RecordingGateway::new(false, vec![]);

        let status = submit_bracket(&gateway, bracket_orders(), true).await.unwrap();

        assert_eq!(status.order_id(), 100);
        assert_eq!(
            *gateway.calls.lock().unwrap(),
            vec![(1, Grouping::Na), (1, Grouping::Na), (1, Grouping::Na)]
        );
    }

    #[tokio::test]
    async fn test_sequential_leg_failure_is_best_effort() {
        let gateway = RecordingGateway::new(true, vec![1]);

        let status = submit_bracket(&gateway, bracket_orders(), false).await;

        assert_eq!(status.unwrap().order_id(), 100);
        assert_eq!(gateway.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sequential_entry_failure_stops() {
        let gateway = RecordingGateway::new(false, vec![0]);

        let result = submit_bracket(&gateway, bracket_orders(), false).await;

        assert!(matches!(result, Err(ExchangeError::Rejected(_))));
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }

    /// Accepts the request but refuses every order individually
    struct RefusingGateway {
        grouping: bool,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl OrderGateway for RefusingGateway {
        async fn submit(
            &self,
            orders: Vec<OrderSpec>,
            _grouping: Grouping,
        ) -> Result<Vec<OrderResponse>, ExchangeError> {
            *self.calls.lock().unwrap() += 1;
            Ok(orders
                .iter()
                .map(|_| OrderResponse::Rejected {
                    error: "Order has invalid price.".to_string(),
                })
                .collect())
        }

        fn supports_grouping(&self) -> bool {
            self.grouping
        }
    }

    #[tokio::test]
    async fn test_refused_entry_rejects_bracket() {
        for grouping in [true, false] {
            let gateway = RefusingGateway {
                grouping,
                calls: Mutex::new(0),
            };

            let result = submit_bracket(&gateway, bracket_orders(), true).await;

            assert!(
                matches!(result, Err(ExchangeError::Rejected(ref reason)) if reason == "Order has invalid price.")
            );
            assert_eq!(*gateway.calls.lock().unwrap(), 1);
        }
    }
}
