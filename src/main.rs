use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use perpbot::api::{HyperliquidClient, HyperliquidFeed, MarketData, PaperGateway};
use perpbot::config::BotConfig;
use perpbot::execution::{
    plan_bracket, reference_price, resolve_precision, Engine, EntrySettings, Executor,
};
use perpbot::models::{CandleEvent, FillBatch};
use perpbot::strategy;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

const EVENT_QUEUE: usize = 1024;

#[derive(Parser)]
#[command(name = "perpbot", version, about = "Single-position bracket trading bot for perpetual futures")]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the strategy loop against live market data with paper execution
    Run,
    /// Print the resolved price/size precision for a coin
    Precision {
        #[arg(long)]
        coin: String,
    },
    /// Plan a bracket from the current book and print its orders without submitting
    Plan {
        #[arg(long)]
        coin: String,
        #[arg(long, value_enum)]
        side: Side,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Long,
    Short,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = BotConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Precision { coin } => print_precision(&config, &coin).await,
        Command::Plan { coin, side } => print_plan(&config, &coin, side).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("perpbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn info_client(config: &BotConfig) -> anyhow::Result<HyperliquidClient> {
    HyperliquidClient::new(&config.exchange.info_url, config.exchange.requests_per_minute)
        .context("Failed to build exchange client")
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    tracing::info!("🚀 perpbot starting (paper execution)");

    let client = Arc::new(info_client(&config)?);
    let strategy = strategy::from_config(&config.strategy);

    tracing::info!("📊 Configuration:");
    tracing::info!("  Strategy: {}", strategy.name());
    tracing::info!(
        "  Candles: {} x {}",
        config.candles.count,
        config.candles.interval
    );
    for pair in &config.trading.pairs {
        tracing::info!(
            "  {} ({}): size ${:.2}, TP {:.2}%, R:R {}",
            pair.coin,
            pair.pair,
            pair.position_size,
            pair.take_profit_percentage * 100.0,
            pair.risk_reward_ratio
        );
    }

    let mut executors = Vec::with_capacity(config.trading.pairs.len());
    for pair in &config.trading.pairs {
        let history = client
            .candle_history(&pair.coin, &config.candles.interval, config.candles.count)
            .await
            .with_context(|| format!("Failed to fetch candle history for {}", pair.coin))?;

        let mut executor = Executor::new(pair.clone(), strategy.clone(), config.candles.count);
        executor.initialize(history);
        executors.push(executor);
    }

    let (feed_candle_tx, mut feed_candle_rx) = mpsc::channel::<CandleEvent>(EVENT_QUEUE);
    let (candle_tx, candle_rx) = mpsc::channel::<CandleEvent>(EVENT_QUEUE);
    let (fill_tx, fill_rx) = mpsc::channel::<FillBatch>(EVENT_QUEUE);

    let (account_fill_tx, mut account_fill_rx) = mpsc::channel::<FillBatch>(EVENT_QUEUE);

    let paper = Arc::new(PaperGateway::new(config.paper.fee_rate, fill_tx));

    let feed = HyperliquidFeed::from_config(&config);
    let feed_task = tokio::spawn(feed.run(feed_candle_tx, account_fill_tx));

    // Positions are paper positions; live account fills must not close them
    if let Some(user) = &config.exchange.user_address {
        tracing::info!("  Account fills for {}: logged only", user);
    }
    let account_task = tokio::spawn(async move {
        while let Some(batch) = account_fill_rx.recv().await {
            if batch.is_snapshot {
                tracing::debug!("Account fill snapshot with {} fills", batch.fills.len());
                continue;
            }
            for fill in &batch.fills {
                tracing::info!(
                    "👤 Account fill {} {} {} @ {} (order {}, closed pnl {:.4}) not routed to paper positions",
                    fill.coin,
                    fill.side,
                    fill.sz,
                    fill.px,
                    fill.oid,
                    fill.closed_pnl
                );
            }
        }
    });

    // Candles reach the strategy first, then drive the simulated fills
    let paper_observer = paper.clone();
    let tee_task = tokio::spawn(async move {
        while let Some(event) = feed_candle_rx.recv().await {
            let candle = event.candle.clone();
            let is_snapshot = event.is_snapshot;
            if candle_tx.send(event).await.is_err() {
                break;
            }
            if !is_snapshot {
                paper_observer.observe(&candle).await;
            }
        }
    });

    let engine = Engine::new(
        client,
        paper,
        EntrySettings {
            book_depth: config.exchange.book_depth,
            use_grouping: config.exchange.use_grouping,
        },
    );

    tracing::info!("Press Ctrl+C to stop...");

    let records = engine
        .run_until(executors, candle_rx, fill_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    feed_task.abort();
    tee_task.abort();
    account_task.abort();

    tracing::info!("📈 Session summary:");
    for pair in &config.trading.pairs {
        if let Some(record) = records.get(&pair.coin) {
            tracing::info!(
                "  {}: trades {} | wins {} | losses {} | net pnl {:.4} | win rate {:.1}%",
                pair.coin,
                record.total_trades,
                record.total_wins,
                record.total_losses,
                record.net_pnl,
                record.win_rate()
            );
        }
    }

    Ok(())
}

async fn print_precision(config: &BotConfig, coin: &str) -> anyhow::Result<()> {
    let client = info_client(config)?;
    let precision = resolve_precision(&client, coin).await;

    println!(
        "{}: size decimals {}, max price decimals {}",
        coin, precision.size_decimals, precision.max_price_decimals
    );
    if let Some(pair) = config.pair(coin) {
        println!(
            "configured: size decimals {:?}, price decimals {:?}",
            pair.size_decimals, pair.price_decimals
        );
    }
    Ok(())
}

async fn print_plan(config: &BotConfig, coin: &str, side: Side) -> anyhow::Result<()> {
    let pair = config
        .pair(coin)
        .ok_or_else(|| anyhow!("{} is not a configured instrument", coin))?;
    let is_long = matches!(side, Side::Long);

    let client = info_client(config)?;
    let book = client.l2_book(&pair.coin).await?;
    let reference = reference_price(&book, is_long, config.exchange.book_depth)?;
    let precision = resolve_precision(&client, &pair.coin).await;
    let plan = plan_bracket(is_long, reference, pair, precision)?;

    tracing::info!(
        "{} {} bracket: entry {} SL {} TP {} size {}",
        pair.coin,
        if is_long { "LONG" } else { "SHORT" },
        plan.entry_price,
        plan.stop_loss,
        plan.take_profit,
        plan.size
    );
    println!("{}", serde_json::to_string_pretty(&plan.orders(&pair.coin))?);
    Ok(())
}
