use serde::{Deserialize, Deserializer, Serialize};

/// Exchange order identifier
pub type OrderId = u64;

/// OHLCV candle as delivered by the exchange (`candleSnapshot` and the
/// `candle` websocket channel share this shape)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    /// Open time, exchange epoch milliseconds
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T", default)]
    pub close_time: i64,
    #[serde(rename = "s", default)]
    pub coin: String,
    #[serde(rename = "i", default)]
    pub interval: String,
    #[serde(rename = "o", deserialize_with = "de_f64")]
    pub open: f64,
    #[serde(rename = "h", deserialize_with = "de_f64")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "de_f64")]
    pub low: f64,
    #[serde(rename = "c", deserialize_with = "de_f64")]
    pub close: f64,
    #[serde(rename = "v", default, deserialize_with = "de_f64")]
    pub volume: f64,
}

/// Trading signal produced by a strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Hold,
}

/// A single user fill from the account fill stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub coin: String,
    pub oid: OrderId,
    #[serde(deserialize_with = "de_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_f64")]
    pub sz: f64,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default, deserialize_with = "de_f64")]
    pub closed_pnl: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub fee: f64,
}

/// One price level of the L2 book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookLevel {
    #[serde(deserialize_with = "de_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_f64")]
    pub sz: f64,
    #[serde(default)]
    pub n: u32,
}

/// L2 order book snapshot, best price first on both sides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct L2Book {
    pub coin: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Perpetual asset metadata from the exchange universe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default)]
    pub max_leverage: u32,
}

/// Protective order tag understood by the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tpsl {
    Sl,
    Tp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Limit {
        tif: String,
    },
    Trigger {
        #[serde(rename = "isMarket")]
        is_market: bool,
        #[serde(rename = "triggerPx")]
        trigger_px: String,
        tpsl: Tpsl,
    },
}

/// Order as submitted to the exchange; prices and sizes are pre-formatted strings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSpec {
    pub coin: String,
    pub is_buy: bool,
    pub sz: String,
    pub limit_px: String,
    pub order_type: OrderType,
    pub reduce_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloid: Option<String>,
}

/// How a multi-order request is linked on the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Grouping {
    Na,
    NormalTpsl,
}

/// Per-order acknowledgment returned by order submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    Filled {
        oid: OrderId,
        #[serde(rename = "avgPx", deserialize_with = "de_f64")]
        avg_px: f64,
    },
    Resting {
        oid: OrderId,
    },
}

impl OrderStatus {
    /// Order id regardless of whether the order filled immediately or rests
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderStatus::Filled { oid, .. } | OrderStatus::Resting { oid } => *oid,
        }
    }
}

/// One entry of a submission response: `{"filled":..}`, `{"resting":..}` or `{"error":..}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OrderResponse {
    Accepted(OrderStatus),
    Rejected { error: String },
}

impl OrderResponse {
    pub fn status(&self) -> Option<&OrderStatus> {
        match self {
            OrderResponse::Accepted(status) => Some(status),
            OrderResponse::Rejected { .. } => None,
        }
    }
}

/// Candle pushed by the candle stream
#[derive(Debug, Clone, PartialEq)]
pub struct CandleEvent {
    pub coin: String,
    pub is_snapshot: bool,
    pub candle: Candle,
}

/// Batch of fills pushed by the account fill stream
#[derive(Debug, Clone, PartialEq)]
pub struct FillBatch {
    pub is_snapshot: bool,
    pub fills: Vec<Fill>,
}

/// The exchange sends most numbers as decimal strings; accept both forms.
pub fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candle_from_exchange_json() {
        let candle: Candle = serde_json::from_value(json!({
            "t": 1_700_000_000_000i64,
            "T": 1_700_003_599_999i64,
            "s": "ETH",
            "i": "1h",
            "o": "2000.5",
            "c": "2010.0",
            "h": "2015.25",
            "l": "1995",
            "v": "1234.5",
            "n": 42
        }))
        .unwrap();

        assert_eq!(candle.open_time, 1_700_000_000_000);
        assert_eq!(candle.coin, "ETH");
        assert_eq!(candle.high, 2015.25);
        assert_eq!(candle.low, 1995.0);
        assert_eq!(candle.volume, 1234.5);
    }

    #[test]
    fn test_fill_from_exchange_json() {
        let fill: Fill = serde_json::from_value(json!({
            "coin": "BTC",
            "px": "65000.0",
            "sz": "0.01",
            "side": "A",
            "time": 1_700_000_000_000i64,
            "startPosition": "0.01",
            "dir": "Close Long",
            "closedPnl": "12.5",
            "hash": "0xabc",
            "oid": 90542681,
            "crossed": true,
            "fee": "0.2275",
            "tid": 1
        }))
        .unwrap();

        assert_eq!(fill.oid, 90542681);
        assert_eq!(fill.closed_pnl, 12.5);
        assert_eq!(fill.fee, 0.2275);
    }

    #[test]
    fn test_order_status_variants() {
        let filled: OrderStatus =
            serde_json::from_value(json!({"filled": {"totalSz": "0.02", "avgPx": "1891.4", "oid": 77738308}}))
                .unwrap();
        let resting: OrderStatus = serde_json::from_value(json!({"resting": {"oid": 77738309}})).unwrap();

        assert_eq!(filled.order_id(), 77738308);
        assert_eq!(resting.order_id(), 77738309);
        assert!(matches!(filled, OrderStatus::Filled { avg_px, .. } if avg_px == 1891.4));
    }

    #[test]
    fn test_order_response_variants() {
        let responses: Vec<OrderResponse> = serde_json::from_value(json!([
            {"resting": {"oid": 77738309}},
            {"error": "Order must have minimum value of $10."}
        ]))
        .unwrap();

        assert_eq!(responses[0].status(), Some(&OrderStatus::Resting { oid: 77738309 }));
        assert_eq!(
            responses[1],
            OrderResponse::Rejected {
                error: "Order must have minimum value of $10.".to_string()
            }
        );
        assert_eq!(responses[1].status(), None);
    }

    #[test]
    fn test_trigger_order_wire_shape() {
        let order = OrderSpec {
            coin: "ETH".to_string(),
            is_buy: false,
            sz: "0.5".to_string(),
            limit_px: "1990".to_string(),
            order_type: OrderType::Trigger {
                is_market: true,
                trigger_px: "1990".to_string(),
                tpsl: Tpsl::Sl,
            },
            reduce_only: true,
            cloid: None,
        };

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["order_type"]["trigger"]["tpsl"], "sl");
        assert_eq!(value["order_type"]["trigger"]["isMarket"], true);
        assert_eq!(value["reduce_only"], true);
        assert!(value.get("cloid").is_none());
    }
}
