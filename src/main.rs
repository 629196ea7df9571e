use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::time::Instant;
use tracing::{info, warn};

use polybook::config::Settings;
use polybook::market_data::adapters::polymarket::PolymarketRest;
use polybook::telemetry;
use polybook::{ConnectionState, InstrumentId, MarketTracker, OrderBookSnapshot};

/// Track the live order book of one Polymarket outcome token.
#[derive(Debug, Parser)]
#[command(name = "polybook", version)]
struct Cli {
    /// CLOB token id of the outcome to track
    #[arg(long)]
    token_id: String,

    /// Optional settings file (toml, yaml, json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How often to print the book
    #[arg(long, default_value_t = 1000)]
    refresh_ms: u64,

    /// Levels shown per side
    #[arg(long, default_value_t = 5)]
    depth: usize,

    /// Prometheus exporter port (only with the `metrics-exporter` feature)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

// Helper function to print state summary
fn print_state_summary(book: &OrderBookSnapshot, depth: usize, live_price: Option<f64>, state: ConnectionState) {
    println!("\n=== Book State Summary ({:?}) ===", state);
    for level in book.asks.iter().take(depth).rev() {
        println!("  ASK {:.4} x {:.2}", level.price, level.size);
    }
    println!("  ---");
    for level in book.bids.iter().take(depth) {
        println!("  BID {:.4} x {:.2}", level.price, level.size);
    }

    match book.spread() {
        Some(spread) => println!("Spread: {:.4}", spread),
        None => println!("Spread: N/A"),
    }
    match live_price {
        Some(price) => println!("Live price: {:.4}", price),
        None => println!("Live price: N/A"),
    }
    println!("Observed at: {} ms", book.observed_at_ms);
    println!("========================");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    telemetry::init_tracing(&settings.log_filter);
    telemetry::init_metrics(cli.metrics_port)?;

    let source = PolymarketRest::new(&settings.rest.base_url);
    let mut tracker = MarketTracker::new(source, settings.stream_config(), settings.reconcile_config());

    let token = InstrumentId::new(cli.token_id.clone());
    if let Err(e) = tracker.select_instrument(token.clone()).await {
        warn!(error = %e, "Starting without a live stream");
    }

    let mut refresh = tokio::time::interval(Duration::from_millis(cli.refresh_ms.max(100)));
    let mut disconnected_since: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = refresh.tick() => {
                let state = tracker.connection_state();
                print_state_summary(&tracker.current_book(), cli.depth, tracker.live_price(), state);

                // Reconnecting is the consumer's call; the engine never retries by itself
                if !settings.auto_reconnect || state != ConnectionState::Disconnected {
                    disconnected_since = None;
                    continue;
                }
                let since = *disconnected_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= settings.reconnect_delay() {
                    info!(instrument = %token, "Reconnecting stream");
                    if let Err(e) = tracker.reconnect_stream().await {
                        warn!(error = %e, "Reconnect failed");
                    }
                    disconnected_since = None;
                }
            }
        }
    }

    tracker.teardown().await;
    Ok(())
}
