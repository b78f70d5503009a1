use serde::Serialize;

use crate::models::Fill;

/// Realized results for one instrument, accumulated over the run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub total_trades: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    /// Closed PnL net of fees
    pub net_pnl: f64,
}

impl PerformanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the fills of one exit event into the record
    ///
    /// Counts one trade per event. The event is a win or loss by the sign of
    /// its summed closed PnL; exactly zero is neither. Every fill's fee is
    /// deducted.
    pub fn record_exit(&mut self, fills: &[Fill]) {
        if fills.is_empty() {
            return;
        }

        let closed_pnl: f64 = fills.iter().map(|f| f.closed_pnl).sum();
        let fees: f64 = fills.iter().map(|f| f.fee).sum();

        self.total_trades += 1;
        if closed_pnl > 0.0 {
            self.total_wins += 1;
        } else if closed_pnl < 0.0 {
            self.total_losses += 1;
        }
        self.net_pnl += closed_pnl - fees;
    }

    /// Wins as a percentage of trades
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.total_wins as f64 / self.total_trades as f64 * 100.0
        }
    }
}
