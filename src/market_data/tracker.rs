// Consumer-facing facade: one instrument at a time, live stream preferred,
// polled fallback when the stream has nothing.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::engine::types::{ConnectionState, InstrumentId, OrderBookSnapshot, PricePoint};
use crate::error::StreamError;
use crate::market_data::adapters::MarketDataSource;
use crate::market_data::reconcile::{FallbackState, ReconcileConfig, Reconciler};
use crate::market_data::stream::{StreamConfig, StreamSession};

pub struct MarketTracker<S: MarketDataSource> {
    source: Arc<S>,
    reconcile_config: ReconcileConfig,
    session: StreamSession,
    fallback: Arc<FallbackState>,
    poller: Option<JoinHandle<()>>,
    instrument: Option<InstrumentId>,
}

impl<S: MarketDataSource> MarketTracker<S> {
    pub fn new(source: S, stream_config: StreamConfig, reconcile_config: ReconcileConfig) -> Self {
        Self {
            source: Arc::new(source),
            reconcile_config,
            session: StreamSession::new(stream_config),
            fallback: Arc::new(FallbackState::new()),
            poller: None,
            instrument: None,
        }
    }

    /// Switch to `id`: fully stop everything for the previous instrument,
    /// then start the poller and the stream for the new one.
    ///
    /// A failed stream connect is returned but the poller keeps running, so
    /// the fallback book still fills in.
    #[instrument(skip(self), fields(instrument = %id))]
    pub async fn select_instrument(&mut self, id: InstrumentId) -> Result<(), StreamError> {
        self.teardown().await;

        info!("Tracking instrument");
        self.instrument = Some(id.clone());
        let reconciler = Reconciler::new(
            Arc::clone(&self.source),
            id.clone(),
            Arc::clone(&self.fallback),
            self.reconcile_config.clone(),
        );
        self.poller = Some(reconciler.spawn());

        self.session.connect(&id).await.inspect_err(|err| {
            warn!(error = %err, "Stream unavailable, relying on polled book");
        })
    }

    /// Reconnect the stream for the current instrument. The poller is untouched.
    pub async fn reconnect_stream(&mut self) -> Result<(), StreamError> {
        match self.instrument.clone() {
            Some(id) => self.session.connect(&id).await,
            None => Ok(()),
        }
    }

    /// Stop the stream and the poller and wait for both, then drop every
    /// value that belonged to the old instrument.
    #[instrument(skip(self))]
    pub async fn teardown(&mut self) {
        self.session.disconnect().await;
        if let Some(poller) = self.poller.take() {
            poller.abort();
            let _ = poller.await;
        }
        self.fallback = Arc::new(FallbackState::new());
        if let Some(id) = self.instrument.take() {
            info!(instrument = %id, "Stopped tracking instrument");
        }
    }

    /// Live book if it has any level, else the polled book, else an empty book.
    pub fn current_book(&self) -> Arc<OrderBookSnapshot> {
        let live = self.session.current_snapshot();
        if !live.is_empty() {
            return live;
        }
        match self.fallback.book() {
            Some(polled) => polled,
            None => Arc::new(OrderBookSnapshot::empty()),
        }
    }

    pub fn last_trade_price(&self) -> Option<f64> {
        self.session.last_trade_price().or_else(|| self.fallback.last_trade_price())
    }

    /// Mid of the current book, else the last trade price.
    pub fn live_price(&self) -> Option<f64> {
        self.current_book().mid().or_else(|| self.last_trade_price())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    pub fn price_history(&self) -> Arc<Vec<PricePoint>> {
        self.fallback.history()
    }

    pub fn instrument(&self) -> Option<&InstrumentId> {
        self.instrument.as_ref()
    }
}

impl<S: MarketDataSource> Drop for MarketTracker<S> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}
