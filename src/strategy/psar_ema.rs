use super::{insufficient_data, Strategy};
use crate::indicators::{calculate_ema, calculate_psar};
use crate::models::{Candle, Signal};
use crate::Result;

/// Trend-following on Parabolic SAR, optionally confirmed by an EMA
///
/// Long while the close is above the SAR, short while below. With
/// `ema_filter` the close must also sit on the same side of the EMA.
#[derive(Debug, Clone)]
pub struct PsarEmaStrategy {
    step: f64,
    max_step: f64,
    ema_period: usize,
    ema_filter: bool,
}

impl PsarEmaStrategy {
    pub fn new(step: f64, max_step: f64, ema_period: usize, ema_filter: bool) -> Self {
        Self {
            step,
            max_step,
            ema_period,
            ema_filter,
        }
    }
}

impl Default for PsarEmaStrategy {
    fn default() -> Self {
        Self::new(0.02, 0.2, 90, false)
    }
}

impl Strategy for PsarEmaStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        if candles.len() < self.min_candles_required() {
            return Err(insufficient_data(candles.len(), self.min_candles_required()));
        }

        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let psar = calculate_psar(&highs, &lows, self.step, self.max_step)
            .ok_or("Failed to compute PSAR")?;

        let price = candles[candles.len() - 1].close;

        let (above_ema, below_ema) = if self.ema_filter {
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            let ema = calculate_ema(&closes, self.ema_period).ok_or("Failed to compute EMA")?;
            (price > ema, price < ema)
        } else {
            (true, true)
        };

        tracing::debug!(price, psar, "PSAR evaluation");

        // Long is checked first
        if price > psar && above_ema {
            Ok(Signal::Long)
        } else if price < psar && below_ema {
            Ok(Signal::Short)
        } else {
            Ok(Signal::Hold)
        }
    }

    fn name(&self) -> &str {
        "PsarEmaStrategy"
    }

    fn min_candles_required(&self) -> usize {
        if self.ema_filter {
            self.ema_period.max(2)
        } else {
            2
        }
    }
}
