use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    BUY,
    SELL
}

impl Side {
    /// Resolve a wire side tag ("buy"/"sell", any case). Unknown tags give `None`.
    pub fn from_tag(tag: &str) -> Option<Side> {
        let tag = tag.trim();
        if tag.eq_ignore_ascii_case("buy") {
            Some(Side::BUY)
        } else if tag.eq_ignore_ascii_case("sell") {
            Some(Side::SELL)
        } else {
            None
        }
    }
}

// One aggregated level of a book side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

// Incremental delta against the live book. `side` is None when the wire tag was not recognised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceChange {
    pub price: f64,
    pub side: Option<Side>,
    pub size: f64,
}

impl PriceChange {
    pub fn new(price: f64, side: Side, size: f64) -> Self {
        Self { price, side: Some(side), size }
    }
}

/// Immutable view of both book sides at one instant.
///
/// Bids are strictly descending by price, asks strictly ascending, and no
/// level has a zero size. A new value is built for every mutation; consumers
/// hold it behind an `Arc` and never see it change.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub observed_at_ms: u64,
}

impl OrderBookSnapshot {
    pub fn empty() -> Self {
        Self { bids: Vec::new(), asks: Vec::new(), observed_at_ms: now_ms() }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        // ask - bid
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

// Point of the price-history series; timestamp is unix seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_gauge(self) -> f64 {
        match self {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
        }
    }
}

/// Opaque token id of one outcome of one market.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
