//! Fatecast Agent CLI
//!
//! Creates and resolves prediction events on the Fatecast market.

use alloy::primitives::{utils::format_units, U256};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fatecast_agent::services::event_creator::{plan_from_idea, CreatorSettings};
use fatecast_agent::types::{format_compact, format_usd, truncate_address};
use fatecast_agent::{
    guess_asset_from_text, parse_question, AgentMetrics, Asset, AsiOneClient, Config,
    EventCreator, EventResolver, FeedConfig, MarketClient, PriceBook, PythClient, Scheduler, Side,
};
use rust_decimal::Decimal;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Below this native balance the agent may not afford gas
const LOW_BALANCE_ETH: f64 = 0.01;

const MAX_BATCH: usize = 10;

#[derive(Parser)]
#[command(name = "fatecast-agent")]
#[command(about = "Creates and resolves Fatecast prediction events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent continuously (scheduled creation and resolution)
    Run,

    /// Create events now: one from a template, or an AI-generated batch
    Create {
        /// Number of events (1-10)
        #[arg(default_value = "1")]
        count: usize,
    },

    /// Resolve every event whose deadline has passed
    Resolve,

    /// Show balances, prices and active events
    Monitor,

    /// Show how a free-text question would be read
    Parse {
        /// Question text, e.g. "Will ETH hit $4,000 by Dec 31?"
        question: String,
    },

    /// Ask ASI:One whether now is a good time for an event on ASSET
    Analyze {
        /// BTC, ETH or SOL
        asset: Asset,
    },

    /// Place a bet from the agent wallet
    Bet {
        event_id: u64,
        /// yes or no
        side: Side,
        /// Amount in settlement token units, e.g. 12.5
        amount: Decimal,
    },

    /// Claim winnings for a resolved event
    Claim { event_id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    init_logging(&config.log_level, config.log_file.as_deref(), cli.verbose);

    let result = match cli.command {
        Commands::Run => run_agent(&config).await,
        Commands::Create { count } => create_events(&config, count).await,
        Commands::Resolve => resolve_events(&config).await,
        Commands::Monitor => monitor(&config).await,
        Commands::Parse { question } => parse(&config, &question).await,
        Commands::Analyze { asset } => analyze(&config, asset).await,
        Commands::Bet {
            event_id,
            side,
            amount,
        } => bet(&config, U256::from(event_id), side, amount).await,
        Commands::Claim { event_id } => claim(&config, U256::from(event_id)).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Stdout plus an optional plain-text file. `RUST_LOG` overrides the level.
///
/// An unwritable log file only costs the file copy; stdout logging still starts.
fn init_logging(level: &str, log_file: Option<&str>, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file, file_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let file_layer = file.map(|file| fmt::layer().with_ansi(false).with_writer(Arc::new(file)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("{:#}; logging to stdout only", e);
    }
}

/// Append handle for `path`, creating parent directories as needed
fn open_log_file(path: &str) -> Result<File> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path))
}

fn connect(config: &Config) -> Result<MarketClient> {
    config.validate()?;
    let market = MarketClient::connect(config)?;
    info!("Agent address: {}", market.agent_address());
    Ok(market)
}

fn pyth_client(config: &Config, metrics: &AgentMetrics) -> Result<Arc<PythClient>> {
    Ok(Arc::new(PythClient::new(
        &config.pyth_hermes_url,
        config.feeds.clone(),
        metrics.clone(),
    )?))
}

fn asi_client(config: &Config, metrics: &AgentMetrics) -> Result<Arc<AsiOneClient>> {
    if config.asi_one_api_key.is_none() {
        warn!("AGENT_API_KEY is not set; ASI:One calls will fail");
    }
    let supported = config.feeds.iter().map(|f| f.asset).collect();
    Ok(Arc::new(AsiOneClient::new(
        &config.asi_one_api_url,
        config.asi_one_api_key.clone(),
        supported,
        metrics.clone(),
    )?))
}

fn event_creator(
    config: &Config,
    market: Arc<MarketClient>,
    metrics: &AgentMetrics,
) -> Result<EventCreator> {
    Ok(EventCreator::new(
        pyth_client(config, metrics)?,
        asi_client(config, metrics)?,
        market,
        config.feeds.clone(),
        CreatorSettings::from_config(config),
        metrics.clone(),
    ))
}

fn event_resolver(
    config: &Config,
    market: Arc<MarketClient>,
    metrics: &AgentMetrics,
) -> Result<EventResolver> {
    let resolver = EventResolver::new(market, pyth_client(config, metrics)?, metrics.clone());
    if config.verify_resolutions {
        info!("AI verification of resolutions enabled");
        return Ok(resolver.with_verifier(asi_client(config, metrics)?));
    }
    Ok(resolver)
}

async fn check_balance(market: &MarketClient) {
    match market.native_balance().await {
        Ok(balance) => {
            info!("Agent balance: {} ETH", balance);
            if balance.parse::<f64>().is_ok_and(|b| b < LOW_BALANCE_ETH) {
                warn!("Low balance! Please fund the agent wallet.");
            }
        }
        Err(e) => warn!("Could not read agent balance: {:#}", e),
    }
}

async fn run_agent(config: &Config) -> Result<()> {
    let market = Arc::new(connect(config)?);
    check_balance(&market).await;

    println!("\n{}", "=".repeat(70));
    println!("  FATECAST AGENT");
    println!("  Network: {} (chain {})", config.network, config.chain_id);
    println!("  Pyth: {} ({})", config.pyth_hermes_url, config.pyth_network);
    println!(
        "  Market: {} | Agent: {}",
        truncate_address(&market.market_address().to_string(), 4),
        truncate_address(&market.agent_address().to_string(), 4)
    );
    println!(
        "  Creation every {}s | Resolution every {}s",
        config.event_creation_interval().as_secs(),
        config.event_resolution_interval().as_secs()
    );
    println!(
        "  Max events/day: {} | Duration: {}h - {}d",
        config.max_events_per_day,
        config.min_event_duration_secs / 3600,
        config.max_event_duration_secs / 86_400
    );
    println!(
        "  AI verification: {}",
        if config.verify_resolutions { "ENABLED" } else { "DISABLED" }
    );
    println!("{}\n", "=".repeat(70));

    let metrics = AgentMetrics::new();
    let scheduler = Scheduler::new(
        event_creator(config, market.clone(), &metrics)?,
        event_resolver(config, market, &metrics)?,
        config.event_creation_interval(),
        config.event_resolution_interval(),
        metrics,
    );

    println!("Agent running (Ctrl+C to stop)...\n");
    scheduler.run(shutdown_signal()).await;
    info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

async fn create_events(config: &Config, count: usize) -> Result<()> {
    if !(1..=MAX_BATCH).contains(&count) {
        bail!("Count must be between 1 and {}", MAX_BATCH);
    }

    let market = Arc::new(connect(config)?);
    let metrics = AgentMetrics::new();
    let mut creator = event_creator(config, market, &metrics)?;

    if count == 1 {
        let Some(event) = creator.create_prediction_event().await else {
            bail!("Event creation failed");
        };
        println!("Created event {} (tx {})", event.id_display(), event.tx_hash);
        return Ok(());
    }

    let events = creator.create_batch_events(count).await;
    println!("\nCreated {} of {} events", events.len(), count);
    for event in &events {
        println!("  Event {} (tx {})", event.id_display(), event.tx_hash);
    }
    Ok(())
}

async fn resolve_events(config: &Config) -> Result<()> {
    let market = Arc::new(connect(config)?);
    let metrics = AgentMetrics::new();
    let resolver = event_resolver(config, market, &metrics)?;

    let resolved = resolver.process_resolutions().await;
    println!("Resolved {} events", resolved);
    Ok(())
}

async fn monitor(config: &Config) -> Result<()> {
    let market = connect(config)?;
    let metrics = AgentMetrics::new();
    let pyth = pyth_client(config, &metrics)?;

    println!("\n{}", "=".repeat(70));
    println!("  FATECAST MONITOR");
    println!("{}\n", "=".repeat(70));

    let native = market.native_balance().await?;
    let token = market.token_balance().await?;
    println!("Agent {}", market.agent_address());
    println!("  Balance: {} ETH | {}", native, token.display());

    let prices = pyth.all_prices().await;
    println!("\nPrices ({}/{} feeds):", prices.len(), config.feeds.len());
    if prices.is_empty() {
        warn!("No oracle prices available");
    }
    for feed in &config.feeds {
        println!("{}", price_line(feed, &prices));
    }

    let total = market.event_counter().await?;
    let active = market.active_event_ids().await?;
    println!("\nEvents: {} total, {} active", total, active.len());

    let now = Utc::now();
    for id in active {
        let event = match market.get_event(id).await {
            Ok(event) => event,
            Err(e) => {
                warn!("Could not fetch event {}: {:#}", id, e);
                continue;
            }
        };
        let status = if event.resolved {
            "RESOLVED"
        } else if now.timestamp() >= event.deadline as i64 {
            "READY TO RESOLVE"
        } else {
            "ACTIVE"
        };
        let pool = pool_display(event.total_pool, token.decimals);

        println!("\n  #{} \"{}\"", event.id, event.question);
        println!(
            "     Target: ${} | Pool: {} {} | Time left: {} | {}",
            format_usd(event.target_price_f64()),
            pool,
            token.symbol,
            event.time_remaining_display(now),
            status
        );
    }
    println!();
    Ok(())
}

/// One `monitor` price row: symbol, price, feed description
fn price_line(feed: &FeedConfig, prices: &PriceBook) -> String {
    let price = prices
        .get(feed.asset)
        .map(|p| format!("${}", format_usd(p)))
        .unwrap_or_else(|| "unavailable".to_string());
    format!("  {:<8} {:>14}  {}", feed.symbol, price, feed.description)
}

/// Pool size in token units, compacted: 1500 tokens -> "1.5K"
fn pool_display(total_pool: U256, decimals: u8) -> String {
    format_units(total_pool, decimals)
        .ok()
        .and_then(|units| units.parse::<f64>().ok())
        .map(format_compact)
        .unwrap_or_else(|| total_pool.to_string())
}

async fn parse(config: &Config, question: &str) -> Result<()> {
    let now = Utc::now();

    let mut prices = PriceBook::new();
    if parse_question(question, &prices, now).is_none() {
        if let Some(asset) = guess_asset_from_text(question) {
            // No explicit number; the heuristic needs the current price
            let pyth = pyth_client(config, &AgentMetrics::new())?;
            if let Some(feed) = config.feed_for(asset) {
                if let Some(price) = pyth.latest_price(feed.feed_id()?).await {
                    prices.insert(asset, price);
                }
            }
        }
    }

    println!("Question: {}", question);
    match parse_question(question, &prices, now) {
        Some(parsed) => {
            println!("  Asset:    {}", parsed.asset);
            println!("  Target:   ${}", format_usd(parsed.target_price));
            println!("  Duration: {} days", parsed.duration_days);
        }
        None => println!("  Could not parse question"),
    }

    if let Some((asset, target, days, final_question)) = plan_from_idea(question, &prices, now) {
        if final_question != question {
            println!(
                "  Would create with fallback: {} ${} in {} days",
                asset,
                format_usd(target),
                days
            );
            println!("  As: \"{}\"", final_question);
        }
    }
    Ok(())
}

async fn analyze(config: &Config, asset: Asset) -> Result<()> {
    let metrics = AgentMetrics::new();
    let feed = config
        .feed_for(asset)
        .with_context(|| format!("No price feed configured for {}", asset))?;
    let pyth = pyth_client(config, &metrics)?;
    let asi = asi_client(config, &metrics)?;

    let price = pyth
        .latest_price(feed.feed_id()?)
        .await
        .with_context(|| format!("Could not fetch {} price", asset))?;
    println!("{} current price: ${}", asset, format_usd(price));

    let analysis = asi.analyze_market_trends(asset, price, None).await?;
    println!(
        "  Create event: {}",
        if analysis.create_event { "YES" } else { "NO" }
    );
    println!("  Suggested target: ${}", format_usd(analysis.suggested_target));
    println!("  Reasoning: {}", analysis.reasoning);
    Ok(())
}

async fn bet(config: &Config, event_id: U256, side: Side, amount: Decimal) -> Result<()> {
    let market = connect(config)?;
    let event = market.get_event(event_id).await?;
    if event.resolved {
        bail!("Event {} is already resolved", event_id);
    }

    println!("Betting {} {} on \"{}\"", amount, side, event.question);
    let tx = market.enter_market(event_id, side, amount).await?;
    println!("Bet placed (tx {})", tx);

    let position = market.user_bet(event_id).await?;
    let token = market.token_balance().await?;
    println!(
        "Position: {} {} on {}",
        format_units(position.amount, token.decimals)
            .unwrap_or_else(|_| position.amount.to_string()),
        token.symbol,
        position.prediction
    );
    Ok(())
}

async fn claim(config: &Config, event_id: U256) -> Result<()> {
    let market = connect(config)?;
    let event = market.get_event(event_id).await?;
    if !event.resolved {
        bail!("Event {} is not resolved yet", event_id);
    }

    let position = market.user_bet(event_id).await?;
    if position.amount.is_zero() {
        bail!("No bet on event {}", event_id);
    }
    if position.prediction.as_bool() != event.outcome {
        bail!(
            "Bet {} lost; event resolved {}",
            position.prediction,
            if event.outcome { "YES" } else { "NO" }
        );
    }

    let tx = market.claim_winnings(event_id).await?;
    println!("Winnings claimed (tx {})", tx);
    println!("Balance: {}", market.token_balance().await?.display());
    Ok(())
}
