//! Binary-pair arbitrage engine entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pairarb::api::{create_router, AppState};
use pairarb::catalog::{CatalogSettings, MarketCatalog};
use pairarb::config::Config;
use pairarb::engine::{Engine, ExecSettings, OrderExecutor};
use pairarb::limiter::RateBudget;
use pairarb::metrics;
use pairarb::quotes::{PollSource, QuoteFeed, QuoteSource, ReconnectConfig, StreamSource};
use pairarb::risk::{DedupSet, RiskGate, TradingHalt};
use pairarb::settlement::{SettlementManager, SettlementSettings};
use pairarb::utils::shutdown_signal;
use pairarb::venue::{
    DeferredSettler, L2Credentials, MarketDataSource, OrderVenue, PolymarketVenue, Settler,
};

/// Binary-pair arbitrage engine for YES/NO prediction markets.
#[derive(Parser, Debug)]
#[command(name = "pairarb")]
#[command(about = "Automated two-leg arbitrage engine for binary prediction markets")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Run in dry-run mode (no real orders).
    #[arg(long)]
    dry_run: Option<bool>,

    /// HTTP server port for health/status.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scan-evaluate-execute loop (default).
    Run {
        /// Run in dry-run mode (no real orders).
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/status.
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Use WebSocket for market data (lower latency).
        #[arg(long)]
        websocket: bool,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Run one catalog discovery pass and print the markets found.
    DiscoverMarkets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("pairarb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::DiscoverMarkets) => cmd_discover_markets().await,
        Some(Command::Run {
            dry_run,
            port,
            websocket,
        }) => cmd_run(dry_run, port, websocket).await,
        None => cmd_run(args.dry_run, args.port, false).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("PAIRARB - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Check API credentials
    print!("Checking API credentials... ");
    match L2Credentials::from_config(&config) {
        Some(creds) => {
            println!("OK");
            println!("  Funder address: {}", creds.address);
        }
        None => {
            println!("ABSENT");
            if config.dry_run {
                println!("  Dry-run mode: credentials not required");
            }
        }
    }

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Scan Mode: {}", config.scan_mode);
    println!("  Spread Target: < ${}", config.min_spread_target);
    println!("  Bet Size: ${}", config.bet_size);
    println!("  Min Shares: {}", config.min_shares);
    println!("  Slippage Tolerance: {}", config.slippage_tolerance);
    println!("  Dry Run: {}", config.dry_run);
    println!(
        "  Market Data: {}",
        if config.use_wss { "WebSocket" } else { "REST polling" }
    );
    println!(
        "  Rate Budgets: {}/s quotes, {}/s orders",
        config.quote_rate_per_sec, config.order_rate_per_sec
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run one catalog discovery pass and print the markets found.
async fn cmd_discover_markets() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("PAIRARB - MARKET DISCOVERY");
    println!("======================================================================");

    let config = Config::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let catalog = MarketCatalog::new(http_client, CatalogSettings::from_config(&config));

    println!("\nScan mode: {}\n", config.scan_mode);

    match catalog.refresh().await {
        Ok(count) => {
            println!("MARKETS FOUND: {}", count);
            println!("----------------------------------------------------------------------");
            for market in catalog.markets().await {
                println!(
                    "  [{} {}] {} (resolves in {}s)",
                    market.coin,
                    market.timeframe,
                    market.slug,
                    market.seconds_to_resolution()
                );
            }
            println!("======================================================================");
        }
        Err(e) => {
            println!("DISCOVERY FAILED");
            println!("  Error: {}", e);
            println!("======================================================================");
        }
    }

    Ok(())
}

/// Run the scan-evaluate-execute loop.
async fn cmd_run(
    dry_run_override: Option<bool>,
    port: u16,
    websocket_override: bool,
) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    // Override with CLI args if provided
    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    if websocket_override {
        config.use_wss = true;
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!(
        "Mode: {}",
        if config.dry_run { "SIMULATION" } else { "LIVE TRADING" }
    );
    info!("Scan mode: {}", config.scan_mode);
    info!("Spread target: < ${}", config.min_spread_target);
    info!("Bet size: ${}", config.bet_size);

    // Install the Prometheus exporter before any metric is touched
    if config.metrics_enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("failed to install metrics exporter: {}", e))?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::init_metrics();

    // Shared shutdown switch: flipped once, observed everywhere
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared risk and pacing state
    let budget = RateBudget::from_config(&config);
    let dedup = Arc::new(DedupSet::new());
    let halt = Arc::new(TradingHalt::new(config.unwind_failure_halt_threshold));
    let feed = Arc::new(QuoteFeed::new(Duration::from_millis(
        config.max_quote_staleness_ms,
    )));

    // Discovery gets its own client with a longer timeout than the trading path
    let discovery_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let catalog = Arc::new(MarketCatalog::new(
        discovery_client,
        CatalogSettings::from_config(&config),
    ));

    // Venue, settlement, executor
    let venue = Arc::new(PolymarketVenue::new(&config));
    if !config.dry_run && !venue.can_trade() {
        return Err(anyhow::anyhow!("live trading requires API credentials"));
    }

    let settler: Arc<dyn Settler> = Arc::new(DeferredSettler);
    let (settlement_tx, settlement_manager) =
        SettlementManager::new(settler, SettlementSettings::from_config(&config));

    let executor = Arc::new(OrderExecutor::new(
        Arc::clone(&venue) as Arc<dyn OrderVenue>,
        Arc::clone(&dedup),
        Arc::clone(&halt),
        Arc::clone(&budget),
        settlement_tx,
        ExecSettings::from_config(&config),
        config.sim_balance,
    ));

    let gate = Arc::new(RiskGate::new(
        Arc::clone(&dedup),
        Arc::clone(&halt),
        Arc::clone(&budget),
        config.min_shares,
    ));

    let engine = Engine::new(
        Arc::clone(&catalog),
        Arc::clone(&feed),
        gate,
        Arc::clone(&executor),
        &config,
    );
    let stats = engine.stats();

    // HTTP server for health and status
    let mut app_state = AppState::new();
    app_state.stats = Arc::clone(&stats);
    app_state.halt = Arc::clone(&halt);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let mut server_shutdown = shutdown_rx.clone();
    let _server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    // First catalog snapshot before scanning starts
    match catalog.refresh().await {
        Ok(count) => info!("Initial catalog: {} markets", count),
        Err(e) => warn!("Initial catalog refresh failed: {}. Retrying on schedule.", e),
    }
    app_state.set_ready(true);

    // Background tasks: catalog refresh, quote source, settlement, engine
    let _catalog_handle = tokio::spawn(Arc::clone(&catalog).run(shutdown_rx.clone()));

    let poll_source = Arc::new(PollSource::new(
        Arc::clone(&venue) as Arc<dyn MarketDataSource>,
        Arc::clone(&feed),
        Arc::clone(&budget),
        Duration::from_millis(config.poll_interval_ms),
    ));
    let source: Arc<dyn QuoteSource> = if config.use_wss {
        // REST polling covers the feed whenever the socket is down.
        Arc::new(
            StreamSource::new(
                config.ws_url.clone(),
                Arc::clone(&feed),
                ReconnectConfig {
                    initial_delay_ms: config.ws_reconnect_initial_ms,
                    max_delay_s: config.ws_reconnect_max_s,
                    backoff_multiplier: 2.0,
                },
            )
            .with_fallback(poll_source),
        )
    } else {
        poll_source
    };
    info!("Market data source: {}", source.name());
    let source_catalog = Arc::clone(&catalog);
    let source_shutdown = shutdown_rx.clone();
    let _source_handle =
        tokio::spawn(async move { source.run(source_catalog, source_shutdown).await });

    let settlement_handle = tokio::spawn(settlement_manager.run(shutdown_rx.clone()));
    let engine_handle = tokio::spawn(engine.run(shutdown_rx.clone()));

    // Slow housekeeping: status snapshot refresh and dedup slot purge
    {
        let state = app_state.clone();
        let catalog = Arc::clone(&catalog);
        let executor = Arc::clone(&executor);
        let dedup = Arc::clone(&dedup);
        let feed = Arc::clone(&feed);
        let dry_run = config.dry_run;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                dedup.purge_expired();

                // Drop quotes for tokens the catalog rotated out.
                let live: std::collections::HashSet<String> =
                    catalog.token_ids().await.into_iter().collect();
                feed.retain_tokens(&live);

                let mut snapshot = state.snapshot.write().await;
                snapshot.scan_mode = catalog.current_mode().await.to_string();
                snapshot.markets_monitored = catalog.len().await;
                snapshot.trades_completed = executor.trades_completed().await;
                snapshot.sim_balance = if dry_run {
                    Some(executor.sim_balance().await.to_string())
                } else {
                    None
                };
                drop(snapshot);

                state.set_ready(!catalog.is_stale());
            }
        });
    }

    info!("Engine started. Waiting for shutdown signal.");
    shutdown_signal().await;

    // Stop admission, then wait for in-flight executions and queued merges
    info!("Shutting down: draining in-flight work...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = engine_handle.await {
        warn!("Engine task ended abnormally: {}", e);
    }
    executor_summary(&executor).await;
    if let Err(e) = settlement_handle.await {
        warn!("Settlement task ended abnormally: {}", e);
    }
    info!("Shutdown complete");

    Ok(())
}

/// Log a final trade summary at shutdown.
async fn executor_summary(executor: &OrderExecutor) {
    let ledger = executor.ledger().await;
    let completed = executor.trades_completed().await;
    info!("========================================");
    info!("FINAL SUMMARY");
    info!("----------------------------------------");
    info!("Executions attempted: {}", ledger.len());
    info!("Trades completed: {}", completed);
    let realized: rust_decimal::Decimal = ledger.iter().filter_map(|r| r.realized_pnl).sum();
    info!("Expected profit locked in: ${}", realized);
    info!("========================================");
}
