//! Push-side session: one websocket connection scoped to one instrument.
//!
//! A connection attempt walks `Disconnected -> Connecting -> Connected ->
//! Disconnected` and never resumes; reconnecting is a fresh [`StreamSession::connect`].
//! Every attempt gets its own [`LiveState`], so a pump task that outlives its
//! connection can only ever write into state nobody reads any more.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, trace, warn};

use crate::engine::book::Book;
use crate::engine::types::{ConnectionState, InstrumentId, OrderBookSnapshot, PriceChange};
use crate::error::StreamError;
use crate::market_data::adapters::polymarket_types::{decode_ws_frame, SubscribeFrame, WsEvent};
use crate::market_data::normaliser::{parse_change, parse_levels, parse_number};

pub const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

// Floor for the keep-alive period; a zero period would stall the timer
const MIN_KEEPALIVE: Duration = Duration::from_millis(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub keepalive: Duration,
    pub close_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            keepalive: Duration::from_secs(15),
            close_timeout: Duration::from_millis(2000),
        }
    }
}

/// Engine-owned state of one connection attempt.
///
/// Only the pump task of that attempt writes here; readers get whole
/// published snapshots.
#[derive(Debug)]
pub struct LiveState {
    instrument: Option<InstrumentId>,
    book: Mutex<Book>,
    snapshot: RwLock<Arc<OrderBookSnapshot>>,
    last_trade: RwLock<Option<f64>>,
    state: RwLock<ConnectionState>,
}

impl LiveState {
    fn idle() -> Self {
        Self::new(None)
    }

    pub fn new(instrument: Option<InstrumentId>) -> Self {
        Self {
            instrument,
            book: Mutex::new(Book::new()),
            snapshot: RwLock::new(Arc::new(OrderBookSnapshot::empty())),
            last_trade: RwLock::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    pub fn snapshot(&self) -> Arc<OrderBookSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn last_trade_price(&self) -> Option<f64> {
        *self.last_trade.read()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Stream state transition");
            *state = next;
        }
        metrics::gauge!("polybook_stream_state").set(next.as_gauge());
    }

    /// Decode one inbound text frame and apply every event it carries.
    ///
    /// Returns how many events changed state. Undecodable frames and unknown
    /// event kinds are dropped; they never affect the connection.
    pub fn handle_text(&self, text: &str) -> usize {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("PONG") {
            return 0;
        }

        let events = match decode_ws_frame(text) {
            Ok(v) => v,
            Err(err) => {
                metrics::counter!("polybook_stream_messages_dropped").increment(1);
                let preview = text.chars().take(120).collect::<String>();
                debug!(%err, %preview, "Dropping undecodable stream frame");
                return 0;
            }
        };

        let mut applied = 0;
        for event in events {
            match event {
                Some(event) if self.apply_event(&event) => applied += 1,
                Some(_) => {
                    metrics::counter!("polybook_stream_messages_dropped").increment(1);
                }
                None => {
                    trace!("Dropping malformed event in frame");
                    metrics::counter!("polybook_stream_messages_dropped").increment(1);
                }
            }
        }
        metrics::counter!("polybook_stream_messages_applied").increment(applied as u64);
        applied
    }

    fn is_foreign(&self, asset_id: Option<&str>) -> bool {
        match (&self.instrument, asset_id) {
            (Some(ours), Some(theirs)) => ours.as_str() != theirs,
            _ => false,
        }
    }

    fn apply_event(&self, event: &WsEvent) -> bool {
        if self.is_foreign(event.asset_id.as_deref()) {
            trace!(asset_id = ?event.asset_id, "Ignoring event for another asset");
            return false;
        }

        match event.event_type.as_deref() {
            Some("book") => {
                let bids = parse_levels(event.buys.as_ref().or(event.bids.as_ref()).map_or(&[][..], Vec::as_slice));
                let asks = parse_levels(event.sells.as_ref().or(event.asks.as_ref()).map_or(&[][..], Vec::as_slice));
                let published = self.book.lock().apply_snapshot(&bids, &asks);
                *self.snapshot.write() = published;
                true
            }
            Some("price_change") => {
                let raw = event.changes.as_ref().or(event.price_changes.as_ref()).map_or(&[][..], Vec::as_slice);
                let changes: Vec<PriceChange> = raw
                    .iter()
                    .filter(|c| !self.is_foreign(c.get("asset_id").and_then(|v| v.as_str())))
                    .filter_map(parse_change)
                    .collect();
                let published = self.book.lock().apply_changes(&changes);
                *self.snapshot.write() = published;
                true
            }
            Some("last_trade_price") => match event.price.as_ref().and_then(parse_number) {
                Some(price) => {
                    *self.last_trade.write() = Some(price);
                    true
                }
                None => false,
            },
            other => {
                trace!(event_type = ?other, "Ignoring unrecognised event");
                false
            }
        }
    }
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct StreamSession {
    config: StreamConfig,
    live: Arc<LiveState>,
    worker: Option<Worker>,
}

impl StreamSession {
    pub fn new(config: StreamConfig) -> Self {
        Self { config, live: Arc::new(LiveState::idle()), worker: None }
    }

    /// Tear down any current connection, then open, subscribe and start pumping.
    ///
    /// On any failure the session is left `Disconnected` with an empty book.
    #[instrument(skip(self), fields(url = %self.config.url))]
    pub async fn connect(&mut self, instrument: &InstrumentId) -> Result<(), StreamError> {
        self.disconnect().await;

        let live = Arc::new(LiveState::new(Some(instrument.clone())));
        live.set_state(ConnectionState::Connecting);
        self.live = Arc::clone(&live);

        let (mut ws, _response) = match connect_async(self.config.url.as_str()).await {
            Ok(v) => v,
            Err(source) => {
                live.set_state(ConnectionState::Disconnected);
                warn!(error = %source, "Stream connect failed");
                return Err(StreamError::Connect { url: self.config.url.clone(), source });
            }
        };

        let frame = match serde_json::to_string(&SubscribeFrame::market(instrument.as_str())) {
            Ok(v) => v,
            Err(err) => {
                live.set_state(ConnectionState::Disconnected);
                return Err(err.into());
            }
        };
        if let Err(err) = ws.send(Message::Text(frame)).await {
            live.set_state(ConnectionState::Disconnected);
            warn!(error = %err, "Stream subscribe failed");
            return Err(StreamError::Subscribe(err));
        }
        live.set_state(ConnectionState::Connected);
        info!(%instrument, "Stream subscribed");

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(pump(ws, live, self.config.keepalive, shutdown_rx));
        self.worker = Some(Worker { shutdown, handle });
        Ok(())
    }

    /// Stop the keep-alive and pump, close with a normal closure code, and
    /// drop all engine-owned book and trade state.
    ///
    /// Returns only once the pump task has finished.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        if let Some(Worker { shutdown, mut handle }) = self.worker.take() {
            let _ = shutdown.send(());
            if tokio::time::timeout(self.config.close_timeout, &mut handle).await.is_err() {
                warn!("Stream pump did not close in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
            info!("Stream disconnected");
        }
        self.live.set_state(ConnectionState::Disconnected);
        self.live = Arc::new(LiveState::idle());
    }

    pub fn current_snapshot(&self) -> Arc<OrderBookSnapshot> {
        self.live.snapshot()
    }

    pub fn last_trade_price(&self) -> Option<f64> {
        self.live.last_trade_price()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.live.connection_state()
    }

    pub fn instrument(&self) -> Option<&InstrumentId> {
        self.live.instrument.as_ref()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.handle.abort();
        }
    }
}

// Receive loop of one connection: keep-alive, inbound dispatch, shutdown
// Marks the attempt Disconnected however the pump ends, including abort or panic
struct DisconnectOnExit(Arc<LiveState>);

impl Drop for DisconnectOnExit {
    fn drop(&mut self) {
        self.0.set_state(ConnectionState::Disconnected);
    }
}

async fn pump(mut ws: WsStream, live: Arc<LiveState>, keepalive: Duration, mut shutdown: oneshot::Receiver<()>) {
    let live = DisconnectOnExit(live);
    let keepalive = keepalive.max(MIN_KEEPALIVE);
    let mut ping = interval_at(Instant::now() + keepalive, keepalive);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                if let Err(err) = ws.close(Some(frame)).await {
                    debug!(error = %err, "Close handshake failed");
                }
                break;
            }
            _ = ping.tick() => {
                if let Err(err) = ws.send(Message::Text("PING".to_string())).await {
                    warn!(error = %err, "Keep-alive send failed");
                    break;
                }
                metrics::counter!("polybook_stream_pings_sent").increment(1);
            }
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        live.0.handle_text(&text);
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            live.0.handle_text(text);
                        }
                        Err(_) => {
                            metrics::counter!("polybook_stream_messages_dropped").increment(1);
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = ws.send(Message::Pong(payload)).await {
                            warn!(error = %err, "Pong send failed");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Stream closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "Stream receive failed");
                        break;
                    }
                    None => {
                        info!("Stream ended");
                        break;
                    }
                }
            }
        }
    }
}
