// Wire shapes for the CLOB REST endpoints and the market websocket channel.
// Items are kept as raw JSON values and normalised one by one, so a single
// malformed level or point never fails the enclosing payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::book::Book;
use crate::engine::types::{OrderBookSnapshot, PricePoint};
use crate::market_data::normaliser::{parse_history, parse_levels, parse_number};

// GET /book?token_id=...
#[derive(Debug, Default, Deserialize)]
pub struct BookResponse {
    #[serde(default)]
    pub bids: Option<Vec<Value>>,
    #[serde(default)]
    pub asks: Option<Vec<Value>>,
    #[serde(default)]
    pub buys: Option<Vec<Value>>,
    #[serde(default)]
    pub sells: Option<Vec<Value>>,
}

impl BookResponse {
    /// Canonically ordered snapshot. Duplicated prices keep the last size seen.
    pub fn into_snapshot(self) -> OrderBookSnapshot {
        let bids = parse_levels(self.bids.or(self.buys).as_deref().unwrap_or_default());
        let asks = parse_levels(self.asks.or(self.sells).as_deref().unwrap_or_default());
        let mut book = Book::new();
        let snapshot = book.apply_snapshot(&bids, &asks);
        (*snapshot).clone()
    }
}

// GET /prices-history?market=...&interval=...
#[derive(Debug, Deserialize)]
pub struct PriceHistoryResponse {
    pub history: Vec<Value>,
}

impl PriceHistoryResponse {
    pub fn into_points(self) -> Vec<PricePoint> {
        parse_history(&self.history)
    }
}

// GET /last-trade-price?token_id=...
#[derive(Debug, Default, Deserialize)]
pub struct LastTradePriceResponse {
    #[serde(default)]
    pub price: Option<Value>,
}

impl LastTradePriceResponse {
    pub fn price(&self) -> Option<f64> {
        self.price.as_ref().and_then(parse_number)
    }
}

pub fn decode_book(body: &str) -> serde_json::Result<OrderBookSnapshot> {
    serde_json::from_str::<BookResponse>(body).map(BookResponse::into_snapshot)
}

pub fn decode_price_history(body: &str) -> serde_json::Result<Vec<PricePoint>> {
    serde_json::from_str::<PriceHistoryResponse>(body).map(PriceHistoryResponse::into_points)
}

pub fn decode_last_trade_price(body: &str) -> serde_json::Result<Option<f64>> {
    serde_json::from_str::<LastTradePriceResponse>(body).map(|r| r.price())
}

// Outbound subscribe frame for the market channel
#[derive(Debug, Serialize)]
pub struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub assets_ids: Vec<&'a str>,
}

impl<'a> SubscribeFrame<'a> {
    pub fn market(token_id: &'a str) -> Self {
        Self { kind: "market", assets_ids: vec![token_id] }
    }
}

// Inbound market channel frame: one event object or an array of them.
// Array elements decode independently; `None` marks an element of the wrong shape.
pub fn decode_ws_frame(text: &str) -> serde_json::Result<Vec<Option<WsEvent>>> {
    let items = match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items.into_iter().map(|item| serde_json::from_value::<WsEvent>(item).ok()).collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct WsEvent {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default, alias = "assetId")]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub buys: Option<Vec<Value>>,
    #[serde(default)]
    pub sells: Option<Vec<Value>>,
    #[serde(default)]
    pub bids: Option<Vec<Value>>,
    #[serde(default)]
    pub asks: Option<Vec<Value>>,
    #[serde(default)]
    pub changes: Option<Vec<Value>>,
    #[serde(default)]
    pub price_changes: Option<Vec<Value>>,
    #[serde(default)]
    pub price: Option<Value>,
}
