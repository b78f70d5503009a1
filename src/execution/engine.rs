use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::executor::{execute_entry, EntryOutcome, EntrySettings, Executor};
use super::performance::PerformanceRecord;
use crate::api::{MarketData, OrderGateway};
use crate::config::PairConfig;
use crate::models::{Candle, CandleEvent, Fill, FillBatch};

const ACTOR_QUEUE: usize = 256;

/// Event routed to one instrument's actor
#[derive(Debug)]
enum InstrumentEvent {
    Candle(Candle),
    Fills(Vec<Fill>),
}

struct ActorHandle {
    coin: String,
    pair: PairConfig,
    events: mpsc::Sender<InstrumentEvent>,
    task: JoinHandle<PerformanceRecord>,
}

/// Strategy loop: routes exchange events to one actor per instrument
pub struct Engine {
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    settings: EntrySettings,
}

impl Engine {
    pub fn new(
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        settings: EntrySettings,
    ) -> Self {
        Self {
            market,
            gateway,
            settings,
        }
    }

    /// Run until both inbound channels close
    ///
    /// Returns each instrument's performance record keyed by coin.
    pub async fn run(
        self,
        executors: Vec<Executor>,
        candles: mpsc::Receiver<CandleEvent>,
        fills: mpsc::Receiver<FillBatch>,
    ) -> HashMap<String, PerformanceRecord> {
        self.run_until(executors, candles, fills, std::future::pending())
            .await
    }

    /// Like [`Engine::run`], but also stops dispatching once `shutdown` resolves
    pub async fn run_until(
        self,
        executors: Vec<Executor>,
        mut candles: mpsc::Receiver<CandleEvent>,
        mut fills: mpsc::Receiver<FillBatch>,
        shutdown: impl Future<Output = ()>,
    ) -> HashMap<String, PerformanceRecord> {
        let actors: Vec<ActorHandle> = executors
            .into_iter()
            .map(|executor| self.spawn_actor(executor))
            .collect();

        tracing::info!("Strategy loop started for {} instruments", actors.len());

        tokio::pin!(shutdown);
        let mut candles_open = true;
        let mut fills_open = true;
        while candles_open || fills_open {
            tokio::select! {
                _ = &mut shutdown => break,
                event = candles.recv(), if candles_open => match event {
                    Some(event) => route_candle(&actors, event).await,
                    None => candles_open = false,
                },
                batch = fills.recv(), if fills_open => match batch {
                    Some(batch) => route_fills(&actors, batch).await,
                    None => fills_open = false,
                },
            }
        }

        tracing::info!("Dispatch stopped, settling instruments");

        let mut records = HashMap::new();
        for actor in actors {
            drop(actor.events);
            match actor.task.await {
                Ok(record) => {
                    records.insert(actor.coin, record);
                }
                Err(e) => tracing::error!("{} actor terminated abnormally: {}", actor.coin, e),
            }
        }
        records
    }

    fn spawn_actor(&self, executor: Executor) -> ActorHandle {
        let (tx, rx) = mpsc::channel(ACTOR_QUEUE);
        let coin = executor.coin().to_string();
        let pair = executor.pair().clone();
        let task = tokio::spawn(run_actor(
            executor,
            rx,
            self.market.clone(),
            self.gateway.clone(),
            self.settings,
        ));

        ActorHandle {
            coin,
            pair,
            events: tx,
            task,
        }
    }
}

fn find_actor<'a>(actors: &'a [ActorHandle], symbol: &str) -> Option<&'a ActorHandle> {
    actors.iter().find(|a| a.pair.matches(symbol))
}

async fn route_candle(actors: &[ActorHandle], event: CandleEvent) {
    if event.is_snapshot {
        tracing::debug!("Ignoring candle snapshot for {}", event.coin);
        return;
    }
    let Some(actor) = find_actor(actors, &event.coin) else {
        tracing::debug!("Candle for unknown instrument {}", event.coin);
        return;
    };
    if actor.events.send(InstrumentEvent::Candle(event.candle)).await.is_err() {
        tracing::warn!("{} actor gone, candle dropped", actor.coin);
    }
}

async fn route_fills(actors: &[ActorHandle], batch: FillBatch) {
    if batch.is_snapshot {
        tracing::debug!("Ignoring fill snapshot ({} fills)", batch.fills.len());
        return;
    }

    let mut grouped: HashMap<&str, Vec<Fill>> = HashMap::new();
    for fill in batch.fills {
        match find_actor(actors, &fill.coin) {
            Some(actor) => grouped.entry(actor.coin.as_str()).or_default().push(fill),
            None => tracing::debug!("Fill for unknown instrument {}", fill.coin),
        }
    }

    for (coin, fills) in grouped {
        let Some(actor) = find_actor(actors, coin) else {
            continue;
        };
        if actor.events.send(InstrumentEvent::Fills(fills)).await.is_err() {
            tracing::warn!("{} actor gone, fills dropped", actor.coin);
        }
    }
}

/// Owns one executor and handles its events strictly one at a time
///
/// Entry I/O runs in a separate task so fills keep flowing while a
/// submission is pending.
async fn run_actor(
    mut executor: Executor,
    mut events: mpsc::Receiver<InstrumentEvent>,
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    settings: EntrySettings,
) -> PerformanceRecord {
    let (outcome_tx, mut outcomes) = mpsc::channel::<EntryOutcome>(1);
    let mut events_open = true;

    loop {
        if !events_open && !executor.is_entering() {
            break;
        }

        tokio::select! {
            Some(outcome) = outcomes.recv() => executor.on_entry_outcome(outcome),
            event = events.recv(), if events_open => match event {
                Some(InstrumentEvent::Candle(candle)) => {
                    if let Some(request) = executor.on_candle(candle) {
                        let market = market.clone();
                        let gateway = gateway.clone();
                        let outcome_tx = outcome_tx.clone();
                        tokio::spawn(async move {
                            let outcome =
                                execute_entry(market.as_ref(), gateway.as_ref(), &request, settings)
                                    .await;
                            let _ = outcome_tx.send(outcome).await;
                        });
                    }
                }
                Some(InstrumentEvent::Fills(fills)) => {
                    executor.on_fills(&fills);
                }
                None => events_open = false,
            },
        }
    }

    tracing::info!(
        "{}: final performance {:?}",
        executor.coin(),
        executor.performance()
    );
    executor.performance().clone()
}
