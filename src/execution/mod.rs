// Position lifecycle: candle window, bracket planning, fill classification
pub mod bracket;
pub mod candle_buffer;
pub mod engine;
pub mod executor;
pub mod performance;
pub mod position_tracker;
pub mod precision;

pub use bracket::{plan_bracket, reference_price, submit_bracket, BracketPlan, PlanError};
pub use candle_buffer::{BufferUpdate, CandleBuffer};
pub use engine::Engine;
pub use executor::{
    execute_entry, EntryOutcome, EntryRequest, EntrySettings, ExecutionAction, ExecutionDecision,
    Executor,
};
pub use performance::PerformanceRecord;
pub use position_tracker::{FillClass, PositionState, PositionTracker};
pub use precision::{format_price, format_size, resolve_precision, round_to, Precision};
