//! Polymarket near-expiry favorite sniper.

use clap::{Parser, Subcommand};
use polysniper::{
    client::PolymarketClient,
    config::Config,
    executor,
    ledger::Ledger,
    monitor, scanner,
    storage::TradeLog,
    watcher::{StopLossWatcher, WatcherHandle},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polysniper")]
#[command(about = "Automated near-expiry favorite sniper for Polymarket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine
    Run,
    /// Print the persisted ledger state and exit
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run_engine(config).await,
        Commands::Status => show_status(config).await,
    }
}

async fn run_engine(config: Config) -> anyhow::Result<()> {
    // Unknown state is fatal at startup; the engine must not trade blind.
    let ledger = Ledger::load(&config.storage.state_file, config.strategy.initial_capital).await?;
    let trade_log = TradeLog::connect(&config.storage.trade_db).await?;
    let client = Arc::new(PolymarketClient::new(
        &config.api,
        config.scanner.request_timeout_secs,
    )?);

    let watcher = StopLossWatcher::new(
        ledger.clone(),
        Some(trade_log.clone()),
        config.api.ws_url.clone(),
        config.storage.state_file.clone(),
        &config.strategy,
        &config.watcher,
    )
    .spawn();

    tracing::info!("🚀 Engine started");
    tracing::info!("💰 Starting balance: ${:.2}", ledger.balance().await);
    tracing::info!("📦 Open positions: {}", ledger.open_position_count().await);
    tracing::info!(
        "⏰ Scan every {}s, resolution poll every {}s",
        config.engine.scan_interval_secs,
        config.engine.monitor_interval_secs
    );

    // Resolution poll loop
    let monitor_task = {
        let client = Arc::clone(&client);
        let ledger = ledger.clone();
        let watcher = watcher.clone();
        let trade_log = trade_log.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config.engine.monitor_interval_secs));
            ticker.tick().await; // first poll after one full interval
            loop {
                ticker.tick().await;
                monitor_cycle(&*client, &ledger, &watcher, &trade_log, &config).await;
            }
        })
    };

    // Scan loop, first cycle immediately
    let scan_task = {
        let client = Arc::clone(&client);
        let ledger = ledger.clone();
        let watcher = watcher.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config.engine.scan_interval_secs));
            loop {
                ticker.tick().await;
                scan_cycle(&*client, &ledger, &watcher, &config).await;
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down...");

    monitor_task.abort();
    scan_task.abort();
    watcher.shutdown();

    if let Err(e) = ledger.save(&config.storage.state_file).await {
        tracing::error!("Final ledger save failed: {}", e);
    }
    Ok(())
}

/// One eligibility scan plus allocation. Failures never escape the cycle.
async fn scan_cycle(
    client: &PolymarketClient,
    ledger: &Ledger,
    watcher: &WatcherHandle,
    config: &Config,
) {
    let started = std::time::Instant::now();
    tracing::info!(
        "💰 Wallet: ${:.2} | Positions: {}",
        ledger.balance().await,
        ledger.open_position_count().await
    );

    let opportunities = scanner::scan(client, ledger, &config.strategy, &config.scanner).await;

    if !opportunities.is_empty() {
        let opened = executor::execute(&opportunities, ledger, watcher, &config.strategy).await;
        tracing::info!("📈 Opened {} of {} opportunities", opened, opportunities.len());
    }

    if let Err(e) = ledger.save(&config.storage.state_file).await {
        tracing::error!("Ledger save failed: {}", e);
    }

    let summary = ledger.summary().await;
    tracing::info!(
        "📊 State: Balance=${:.2} | Open={} | Closed={} | Locks={}",
        summary.balance,
        summary.open_positions,
        summary.closed_positions,
        summary.locked_events
    );
    tracing::info!("⏱️  Scan cycle completed in {:.1}s", started.elapsed().as_secs_f64());
}

async fn monitor_cycle(
    client: &PolymarketClient,
    ledger: &Ledger,
    watcher: &WatcherHandle,
    trade_log: &TradeLog,
    config: &Config,
) {
    let settled = monitor::poll(client, ledger, watcher, Some(trade_log)).await;
    if settled > 0 {
        tracing::info!("🏁 Settled {} positions this cycle", settled);
    }

    if let Err(e) = ledger.save(&config.storage.state_file).await {
        tracing::error!("Ledger save failed: {}", e);
    }
}

/// Read-only view over the persisted ledger; no engine required.
async fn show_status(config: Config) -> anyhow::Result<()> {
    let ledger = Ledger::load(&config.storage.state_file, config.strategy.initial_capital).await?;
    let summary = ledger.summary().await;

    println!("\n💰 Ledger Status\n");
    println!("Balance:       ${:.2}", summary.balance);
    println!("Total value:   ${:.2}", summary.total_value);
    println!("Realized P&L:  ${:.2}", summary.realized_pnl);
    println!("Open:          {}", summary.open_positions);
    println!("Closed:        {}", summary.closed_positions);
    println!("Locked events: {}", summary.locked_events);

    let open = ledger.open_positions().await;
    if !open.is_empty() {
        println!("\nOpen positions:");
        for p in &open {
            println!(
                "  {} {} @ {:.3} | size {:.2} | cost ${:.2}",
                p.slug, p.side, p.entry_price, p.size, p.cost
            );
        }
    }

    let closed = ledger.closed_positions().await;
    if !closed.is_empty() {
        println!("\nClosed positions:");
        for c in &closed {
            println!(
                "  {} {} -> {} | P&L ${:.2} | {}",
                c.position.slug, c.position.side, c.resolution, c.pnl, c.closed_at
            );
        }
    }

    Ok(())
}
