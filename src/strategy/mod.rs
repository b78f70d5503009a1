// Pluggable signal functions
pub mod psar_ema;
pub mod rsi_sma;

pub use psar_ema::PsarEmaStrategy;
pub use rsi_sma::RsiSmaStrategy;

use std::sync::Arc;

use crate::config::{StrategyConfig, StrategyKind};
use crate::models::{Candle, Signal};
use crate::Result;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Directional decision for the current candle window (oldest first)
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}

/// Build the configured signal function
pub fn from_config(config: &StrategyConfig) -> Arc<dyn Strategy> {
    match config.kind {
        StrategyKind::PsarEma => Arc::new(PsarEmaStrategy::new(
            config.psar_step,
            config.psar_max,
            config.ema_period,
            config.ema_filter,
        )),
        StrategyKind::RsiSma => Arc::new(RsiSmaStrategy::new(
            config.rsi_period,
            config.rsi_oversold,
            config.rsi_overbought,
            config.sma_period,
        )),
    }
}

pub(crate) fn insufficient_data(have: usize, need: usize) -> crate::Error {
    format!("Insufficient data: {} candles, need {}", have, need).into()
}
