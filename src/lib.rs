// Core modules
pub mod api;
pub mod config;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::{ExchangeError, MarketData, OrderGateway};
pub use config::BotConfig;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
