//! Polling backstop for the stream.
//!
//! A [`Reconciler`] re-pulls the book and last trade price on a fixed cadence
//! (and the price history every `history_every` cycles) and writes the results
//! into a [`FallbackState`]. Failed fetches leave the previous values in place.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::engine::types::{InstrumentId, OrderBookSnapshot, PricePoint};
use crate::market_data::adapters::MarketDataSource;

// Floor for the poll period; a zero period would spin on the REST endpoints
const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub interval: Duration,
    pub history_every: u64,
    pub history_interval: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(15), history_every: 4, history_interval: "1d".to_string() }
    }
}

/// Cells written only by the reconciliation loop. Each cell is independent.
#[derive(Debug, Default)]
pub struct FallbackState {
    book: RwLock<Option<Arc<OrderBookSnapshot>>>,
    last_trade: RwLock<Option<f64>>,
    history: RwLock<Arc<Vec<PricePoint>>>,
}

impl FallbackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn book(&self) -> Option<Arc<OrderBookSnapshot>> {
        self.book.read().clone()
    }

    pub fn last_trade_price(&self) -> Option<f64> {
        *self.last_trade.read()
    }

    pub fn history(&self) -> Arc<Vec<PricePoint>> {
        self.history.read().clone()
    }
}

pub struct Reconciler<S: MarketDataSource> {
    source: Arc<S>,
    instrument: InstrumentId,
    fallback: Arc<FallbackState>,
    config: ReconcileConfig,
}

impl<S: MarketDataSource> Reconciler<S> {
    pub fn new(source: Arc<S>, instrument: InstrumentId, fallback: Arc<FallbackState>, config: ReconcileConfig) -> Self {
        Self { source, instrument, fallback, config }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Cycle forever; only cancellation of the task ends it.
    pub async fn run(self) {
        let interval = self.config.interval.max(MIN_INTERVAL);
        let mut cycle: u64 = 0;
        loop {
            self.run_cycle(cycle).await;
            cycle = cycle.wrapping_add(1);
            tokio::time::sleep(interval).await;
        }
    }

    /// One poll. Cycle 0 doubles as the initial parallel fetch of book,
    /// history and last trade price.
    #[instrument(skip(self), fields(instrument = %self.instrument))]
    pub async fn run_cycle(&self, cycle: u64) {
        let token = self.instrument.as_str();
        let with_history = self.config.history_every == 0 || cycle % self.config.history_every == 0;

        let history = async {
            if with_history {
                Some(self.source.fetch_price_history(token, &self.config.history_interval).await)
            } else {
                None
            }
        };
        let (book, last_trade, history) = tokio::join!(
            self.source.fetch_order_book(token),
            self.source.fetch_last_trade_price(token),
            history,
        );

        match book {
            Ok(snapshot) => {
                debug!(bids = snapshot.bids.len(), asks = snapshot.asks.len(), "Fallback book refreshed");
                *self.fallback.book.write() = Some(Arc::new(snapshot));
                metrics::counter!("polybook_reconcile_success", "kind" => "book").increment(1);
            }
            Err(err) => {
                warn!(error = %err, "Fallback book fetch failed, keeping previous");
                metrics::counter!("polybook_reconcile_failure", "kind" => "book").increment(1);
            }
        }

        match last_trade {
            Ok(price) => {
                *self.fallback.last_trade.write() = price;
                metrics::counter!("polybook_reconcile_success", "kind" => "last_trade").increment(1);
            }
            Err(err) => {
                warn!(error = %err, "Last trade fetch failed, keeping previous");
                metrics::counter!("polybook_reconcile_failure", "kind" => "last_trade").increment(1);
            }
        }

        match history {
            Some(Ok(points)) => {
                debug!(points = points.len(), "Price history refreshed");
                *self.fallback.history.write() = Arc::new(points);
                metrics::counter!("polybook_reconcile_success", "kind" => "history").increment(1);
            }
            Some(Err(err)) => {
                warn!(error = %err, "Price history fetch failed, keeping previous");
                metrics::counter!("polybook_reconcile_failure", "kind" => "history").increment(1);
            }
            None => {}
        }
    }
}
