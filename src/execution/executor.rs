use std::sync::Arc;

use super::bracket::{plan_bracket, reference_price, submit_bracket, BracketPlan};
use super::candle_buffer::{BufferUpdate, CandleBuffer};
use super::performance::PerformanceRecord;
use super::position_tracker::{FillClass, PositionState, PositionTracker};
use super::precision::resolve_precision;
use crate::api::{MarketData, OrderGateway};
use crate::config::PairConfig;
use crate::models::{Candle, Fill, OrderStatus, Signal};
use crate::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Enter { is_long: bool },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// Entry path parameters shared by all instruments
#[derive(Debug, Clone, Copy)]
pub struct EntrySettings {
    pub book_depth: usize,
    pub use_grouping: bool,
}

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            book_depth: 2,
            use_grouping: true,
        }
    }
}

/// An entry the executor has committed to; the tracker is already `Entering`
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub pair: PairConfig,
    pub is_long: bool,
}

/// Result of the entry path, fed back to the owning executor
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Acknowledged {
        status: OrderStatus,
        plan: BracketPlan,
    },
    Failed(String),
}

/// Per-instrument strategy state: candle window, position and results
///
/// Owned by exactly one task; all methods are synchronous so the
/// `Flat -> Entering` transition happens before any I/O.
pub struct Executor {
    pair: PairConfig,
    strategy: Arc<dyn Strategy>,
    buffer: CandleBuffer,
    tracker: PositionTracker,
    performance: PerformanceRecord,
}

impl Executor {
    pub fn new(pair: PairConfig, strategy: Arc<dyn Strategy>, max_candles: usize) -> Self {
        Self {
            pair,
            strategy,
            buffer: CandleBuffer::new(max_candles),
            tracker: PositionTracker::new(),
            performance: PerformanceRecord::new(),
        }
    }

    pub fn coin(&self) -> &str {
        &self.pair.coin
    }

    pub fn pair(&self) -> &PairConfig {
        &self.pair
    }

    pub fn state(&self) -> PositionState {
        self.tracker.state()
    }

    pub fn is_entering(&self) -> bool {
        self.tracker.is_entering()
    }

    pub fn performance(&self) -> &PerformanceRecord {
        &self.performance
    }

    /// Seed the candle window from history
    pub fn initialize(&mut self, history: Vec<Candle>) {
        self.buffer.initialize(history);
        tracing::info!(
            "{}: buffer seeded with {} candles",
            self.pair.coin,
            self.buffer.len()
        );
    }

    /// Apply a live candle and evaluate the strategy
    ///
    /// Returns an entry request when a directional signal arrives while flat;
    /// the tracker is then `Entering` and the caller must run the entry path
    /// and report back through [`Executor::on_entry_outcome`].
    pub fn on_candle(&mut self, candle: Candle) -> Option<EntryRequest> {
        if self.buffer.apply_update(candle) == BufferUpdate::Ignored {
            tracing::debug!("{}: stale candle ignored", self.pair.coin);
            return None;
        }

        let signal = self.evaluate();
        let decision = self.process_signal(signal);

        match decision.action {
            ExecutionAction::Enter { is_long } => {
                if !self.tracker.try_begin_entry(is_long) {
                    return None;
                }
                tracing::info!(
                    "{}: {} entry triggered by {}",
                    self.pair.coin,
                    if is_long { "LONG" } else { "SHORT" },
                    self.strategy.name()
                );
                Some(EntryRequest {
                    pair: self.pair.clone(),
                    is_long,
                })
            }
            ExecutionAction::Skip => {
                tracing::debug!("{}: skip ({})", self.pair.coin, decision.reason);
                None
            }
        }
    }

    fn evaluate(&self) -> Signal {
        if self.buffer.len() < self.strategy.min_candles_required() {
            return Signal::Hold;
        }
        match self.strategy.generate_signal(&self.buffer.candles()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("{}: strategy evaluation failed: {}", self.pair.coin, e);
                Signal::Hold
            }
        }
    }

    /// Decide what to do with a signal given the current position state
    pub fn process_signal(&self, signal: Signal) -> ExecutionDecision {
        let is_long = match signal {
            Signal::Long => true,
            Signal::Short => false,
            Signal::Hold => {
                return ExecutionDecision {
                    action: ExecutionAction::Skip,
                    reason: "Hold signal".to_string(),
                }
            }
        };

        match self.tracker.state() {
            PositionState::Flat => ExecutionDecision {
                action: ExecutionAction::Enter { is_long },
                reason: format!("{:?} signal while flat", signal),
            },
            PositionState::Entering { .. } => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: "Entry already in flight".to_string(),
            },
            PositionState::InPosition { main_order_id, .. } => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: format!("Already in position (main order {})", main_order_id),
            },
        }
    }

    /// Settle an in-flight entry
    pub fn on_entry_outcome(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Acknowledged { status, plan } => {
                match self.tracker.confirm_entry(&status) {
                    Some(oid) => tracing::info!(
                        "{}: in position, main order {} ({:?}) {}",
                        self.pair.coin,
                        oid,
                        status,
                        plan.describe()
                    ),
                    None => tracing::warn!(
                        "{}: acknowledgment {:?} with no entry in flight",
                        self.pair.coin,
                        status
                    ),
                }
            }
            EntryOutcome::Failed(reason) => {
                self.tracker.abort_entry();
                tracing::error!("{}: entry failed, back to flat: {}", self.pair.coin, reason);
            }
        }
    }

    /// Classify a batch of this instrument's fills
    ///
    /// All exit fills of the batch count as one exit event. Returns true if
    /// the position was closed.
    pub fn on_fills(&mut self, fills: &[Fill]) -> bool {
        let mut exits = Vec::new();
        for fill in fills {
            match self.tracker.classify_fill(fill.oid) {
                FillClass::Exit => exits.push(fill.clone()),
                FillClass::Entry => tracing::info!(
                    "{}: entry order {} filled {} @ {}",
                    self.pair.coin,
                    fill.oid,
                    fill.sz,
                    fill.px
                ),
                FillClass::Untracked => tracing::debug!(
                    "{}: ignoring fill for untracked order {}",
                    self.pair.coin,
                    fill.oid
                ),
            }
        }

        if exits.is_empty() {
            return false;
        }

        self.performance.record_exit(&exits);
        self.tracker.close();

        let record = &self.performance;
        tracing::info!(
            "{}: position closed by order {} | trades {} wins {} losses {} net pnl {:.4} win rate {:.1}%",
            self.pair.coin,
            exits[0].oid,
            record.total_trades,
            record.total_wins,
            record.total_losses,
            record.net_pnl,
            record.win_rate()
        );
        true
    }
}

/// Book query, precision lookup, planning and submission for one entry
///
/// Never panics or returns early with an error; every failure becomes
/// [`EntryOutcome::Failed`].
pub async fn execute_entry(
    market: &dyn MarketData,
    gateway: &dyn OrderGateway,
    request: &EntryRequest,
    settings: EntrySettings,
) -> EntryOutcome {
    let coin = request.pair.coin.as_str();

    let book = match market.l2_book(coin).await {
        Ok(book) => book,
        Err(e) => return EntryOutcome::Failed(format!("order book query failed: {}", e)),
    };
    let reference = match reference_price(&book, request.is_long, settings.book_depth) {
        Ok(px) => px,
        Err(e) => return EntryOutcome::Failed(e.to_string()),
    };

    let precision = resolve_precision(market, coin).await;

    let plan = match plan_bracket(request.is_long, reference, &request.pair, precision) {
        Ok(plan) => plan,
        Err(e) => return EntryOutcome::Failed(e.to_string()),
    };

    match submit_bracket(gateway, plan.orders(coin), settings.use_grouping).await {
        Ok(status) => EntryOutcome::Acknowledged { status, plan },
        Err(e) => EntryOutcome::Failed(format!("bracket submission failed: {}", e)),
    }
}
