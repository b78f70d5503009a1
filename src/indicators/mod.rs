// Technical indicators consumed by the signal functions

pub mod moving_average;
pub mod psar;
pub mod rsi;

pub use moving_average::{calculate_ema, calculate_sma};
pub use psar::calculate_psar;
pub use rsi::calculate_rsi;
