use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::api::MarketData;

/// Exchange limit on significant figures in a non-integer price
const MAX_SIGNIFICANT_FIGURES: u32 = 5;
/// Total decimal budget shared between size and price on perpetuals
const MAX_PERP_DECIMALS: u32 = 6;

/// Allowed decimal places for one instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub size_decimals: u32,
    pub max_price_decimals: u32,
}

impl Precision {
    /// Conservative precision used when exchange metadata is unavailable
    pub const DEFAULT: Precision = Precision {
        size_decimals: 4,
        max_price_decimals: 6,
    };

    /// Size precision is authoritative and consumes part of the price budget
    pub fn from_sz_decimals(size_decimals: u32) -> Self {
        Self {
            size_decimals,
            max_price_decimals: MAX_SIGNIFICANT_FIGURES
                .min(MAX_PERP_DECIMALS.saturating_sub(size_decimals)),
        }
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Look up `coin` in the exchange universe
///
/// Never fails: any metadata problem degrades to [`Precision::DEFAULT`].
pub async fn resolve_precision(market: &dyn MarketData, coin: &str) -> Precision {
    match market.meta().await {
        Ok(universe) => match universe.iter().find(|asset| asset.name == coin) {
            Some(asset) => {
                let precision = Precision::from_sz_decimals(asset.sz_decimals);
                tracing::debug!(coin, ?precision, "Resolved precision");
                precision
            }
            None => {
                tracing::warn!(coin, "Coin not in exchange universe, using default precision");
                Precision::DEFAULT
            }
        },
        Err(e) => {
            tracing::warn!(coin, error = %e, "Metadata lookup failed, using default precision");
            Precision::DEFAULT
        }
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
}

/// Round half away from zero to `decimals` places
///
/// Non-finite input is returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    to_decimal(value)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Wire representation of a price
///
/// Rounds to `max_decimals`, then applies the exchange's significant-figure
/// rule: integers are sent as-is, other values are limited to five
/// significant figures (five or more integer digits round to an integer).
pub fn format_price(value: f64, max_decimals: u32) -> String {
    let Some(price) = to_decimal(value) else {
        return value.to_string();
    };
    let price = price
        .round_dp_with_strategy(max_decimals, RoundingStrategy::MidpointAwayFromZero)
        .normalize();

    if price.is_integer() || significant_figures(&price) <= MAX_SIGNIFICANT_FIGURES {
        return price.to_string();
    }

    let integer_digits = integer_digits(&price);
    let collapsed = if integer_digits >= MAX_SIGNIFICANT_FIGURES {
        price.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    } else {
        price
            .round_sf_with_strategy(MAX_SIGNIFICANT_FIGURES, RoundingStrategy::MidpointAwayFromZero)
            .unwrap_or(price)
    };

    collapsed.normalize().to_string()
}

/// Wire representation of an order size
pub fn format_size(value: f64, size_decimals: u32) -> String {
    match to_decimal(value) {
        Some(size) => size
            .round_dp_with_strategy(size_decimals, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
        None => value.to_string(),
    }
}

fn significant_figures(value: &Decimal) -> u32 {
    let mantissa = value.normalize().mantissa().unsigned_abs();
    if mantissa == 0 {
        0
    } else {
        mantissa.to_string().len() as u32
    }
}

fn integer_digits(value: &Decimal) -> u32 {
    let integer = value.trunc().abs();
    if integer.is_zero() {
        0
    } else {
        integer.to_string().len() as u32
    }
}
