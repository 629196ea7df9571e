//! Live order book and last trade price for a single prediction-market
//! outcome token, kept in sync from a websocket stream and backstopped by
//! periodic REST polling.

pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod telemetry;

pub use engine::types::{ConnectionState, InstrumentId, OrderBookSnapshot, PriceChange, PriceLevel, PricePoint, Side};
pub use error::{FetchError, StreamError};
pub use market_data::tracker::MarketTracker;
