#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use polybook::market_data::adapters::MarketDataSource;
use polybook::{FetchError, OrderBookSnapshot, PricePoint};

pub enum Command {
    Send(Message),
    Drop,
}

/// Local market channel. Replies to a subscribe frame with the canned book
/// for each subscribed asset, records every client frame, and lets the test
/// push frames into (or cut) the most recent connection.
pub struct MockFeed {
    pub url: String,
    inbound: mpsc::UnboundedReceiver<(usize, Message)>,
    commands: mpsc::UnboundedSender<Command>,
}

impl MockFeed {
    pub async fn start(books: HashMap<String, String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel::<Command>();
        let books = Arc::new(books);

        tokio::spawn(async move {
            let mut current: Option<mpsc::UnboundedSender<Command>> = None;
            let mut idx = 0usize;
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let (tx, rx) = mpsc::unbounded_channel();
                        current = Some(tx);
                        tokio::spawn(serve(idx, stream, rx, inbound_tx.clone(), Arc::clone(&books)));
                        idx += 1;
                    }
                    cmd = command_rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        if let Some(tx) = &current {
                            let _ = tx.send(cmd);
                        }
                    }
                }
            }
        });

        Self { url, inbound, commands }
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.commands.send(Command::Send(Message::Text(text.to_string())));
    }

    pub fn drop_connection(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    /// Next frame the client sent, on any connection.
    pub async fn next_inbound(&mut self) -> (usize, Message) {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("feed stopped")
    }
}

async fn serve(
    idx: usize,
    stream: TcpStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    inbound: mpsc::UnboundedSender<(usize, Message)>,
    books: Arc<HashMap<String, String>>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else { return };
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Send(msg)) => {
                    if ws.send(msg).await.is_err() {
                        break;
                    }
                }
                // Cut the TCP stream without a close handshake
                Some(Command::Drop) | None => break,
            },
            msg = ws.next() => {
                let Some(Ok(msg)) = msg else { break };
                if let Message::Text(text) = &msg {
                    for frame in canned_replies(text, &books) {
                        let _ = ws.send(Message::Text(frame)).await;
                    }
                }
                let closing = matches!(msg, Message::Close(_));
                let _ = inbound.send((idx, msg));
                if closing {
                    break;
                }
            }
        }
    }
}

fn canned_replies(text: &str, books: &HashMap<String, String>) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(text) else { return Vec::new() };
    value
        .get("assets_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(|id| id.as_str().and_then(|id| books.get(id)).cloned()).collect())
        .unwrap_or_default()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Canned REST source keyed by token id. Unknown tokens fail with a 404.
#[derive(Default)]
pub struct StubSource {
    pub books: Mutex<HashMap<String, OrderBookSnapshot>>,
    pub trades: Mutex<HashMap<String, Option<f64>>>,
    pub history: Mutex<HashMap<String, Vec<PricePoint>>>,
    pub failing: Mutex<bool>,
    pub book_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub trade_calls: AtomicUsize,
}

impl StubSource {
    pub fn with_book(token: &str, book: OrderBookSnapshot) -> Self {
        let stub = Self::default();
        stub.books.lock().insert(token.to_string(), book);
        stub
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    fn not_found(&self, path: &str) -> FetchError {
        FetchError::Status { endpoint: format!("stub/{path}"), status: 404 }
    }
}

#[async_trait::async_trait]
impl MarketDataSource for StubSource {
    async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBookSnapshot, FetchError> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(self.not_found("book"));
        }
        self.books.lock().get(token_id).cloned().ok_or_else(|| self.not_found("book"))
    }

    async fn fetch_price_history(&self, token_id: &str, _interval: &str) -> Result<Vec<PricePoint>, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(self.not_found("prices-history"));
        }
        self.history.lock().get(token_id).cloned().ok_or_else(|| self.not_found("prices-history"))
    }

    async fn fetch_last_trade_price(&self, token_id: &str) -> Result<Option<f64>, FetchError> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(self.not_found("last-trade-price"));
        }
        self.trades.lock().get(token_id).copied().ok_or_else(|| self.not_found("last-trade-price"))
    }
}

/// Wrapper so a test keeps a handle on the stub the tracker owns.
pub struct SharedStub(pub Arc<StubSource>);

#[async_trait::async_trait]
impl MarketDataSource for SharedStub {
    async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBookSnapshot, FetchError> {
        self.0.fetch_order_book(token_id).await
    }

    async fn fetch_price_history(&self, token_id: &str, interval: &str) -> Result<Vec<PricePoint>, FetchError> {
        self.0.fetch_price_history(token_id, interval).await
    }

    async fn fetch_last_trade_price(&self, token_id: &str) -> Result<Option<f64>, FetchError> {
        self.0.fetch_last_trade_price(token_id).await
    }
}
