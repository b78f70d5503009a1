use super::{insufficient_data, Strategy};
use crate::indicators::{calculate_rsi, calculate_sma};
use crate::models::{Candle, Signal};
use crate::Result;

/// Mean-reversion entries filtered by trend
///
/// Long when RSI is below `oversold` while the close is above the SMA;
/// short when RSI is above `overbought` while the close is below it.
#[derive(Debug, Clone)]
pub struct RsiSmaStrategy {
    rsi_period: usize,
    oversold: f64,
    overbought: f64,
    sma_period: usize,
}

impl RsiSmaStrategy {
    pub fn new(rsi_period: usize, oversold: f64, overbought: f64, sma_period: usize) -> Self {
        Self {
            rsi_period,
            oversold,
            overbought,
            sma_period,
        }
    }
}

impl Default for RsiSmaStrategy {
    fn default() -> Self {
        Self::new(10, 40.0, 60.0, 15)
    }
}

impl Strategy for RsiSmaStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        if candles.len() < self.min_candles_required() {
            return Err(insufficient_data(candles.len(), self.min_candles_required()));
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = calculate_rsi(&closes, self.rsi_period).ok_or("Failed to compute RSI")?;
        let sma = calculate_sma(&closes, self.sma_period).ok_or("Failed to compute SMA")?;
        let price = closes[closes.len() - 1];

        tracing::debug!(price, rsi, sma, "RSI/SMA evaluation");

        if rsi < self.oversold && price > sma {
            Ok(Signal::Long)
        } else if rsi > self.overbought && price < sma {
            Ok(Signal::Short)
        } else {
            Ok(Signal::Hold)
        }
    }

    fn name(&self) -> &str {
        "RsiSmaStrategy"
    }

    fn min_candles_required(&self) -> usize {
        (self.rsi_period + 1).max(self.sma_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: i as i64 * 3_600_000,
                close_time: (i as i64 + 1) * 3_600_000 - 1,
                coin: "SOL".to_string(),
                interval: "1h".to_string(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_min_candles() {
        assert_eq!(RsiSmaStrategy::default().min_candles_required(), 15);
        assert_eq!(RsiSmaStrategy::new(14, 30.0, 70.0, 5).min_candles_required(), 15);
    }

    #[test]
    fn test_insufficient_data() {
        let result = RsiSmaStrategy::default().generate_signal(&candles_from(&[100.0; 5]));
        assert!(result.is_err());
    }

    #[test]
    fn test_long_on_pullback_in_uptrend() {
        // Steady climb then a ten-bar dip that drags RSI down but stays above the 30-SMA
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        closes.extend((1..=10).map(|i| 139.0 - i as f64));

        let strategy = RsiSmaStrategy::new(10, 40.0, 60.0, 30);
        let sma = calculate_sma(&closes, 30).unwrap();
        let rsi = calculate_rsi(&closes, 10).unwrap();
        assert!(closes[closes.len() - 1] > sma);
        assert!(rsi < 40.0);

        assert_eq!(
            strategy.generate_signal(&candles_from(&closes)).unwrap(),
            Signal::Long
        );
    }

    #[test]
    fn test_short_on_bounce_in_downtrend() {
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        closes.extend((1..=10).map(|i| 161.0 + i as f64));

        let strategy = RsiSmaStrategy::new(10, 40.0, 60.0, 30);
        let sma = calculate_sma(&closes, 30).unwrap();
        let rsi = calculate_rsi(&closes, 10).unwrap();
        assert!(closes[closes.len() - 1] < sma);
        assert!(rsi > 60.0);

        assert_eq!(
            strategy.generate_signal(&candles_from(&closes)).unwrap(),
            Signal::Short
        );
    }

    #[test]
    fn test_hold_when_trend_disagrees() {
        // Uninterrupted climb: price above SMA but RSI pinned high
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(
            RsiSmaStrategy::default()
                .generate_signal(&candles_from(&closes))
                .unwrap(),
            Signal::Hold
        );
    }
}
