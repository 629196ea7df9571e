// Shared trait for pull-side market data sources

use crate::engine::types::{OrderBookSnapshot, PricePoint};
use crate::error::FetchError;

/// The three pull requests the tracker needs. Implementations must be
/// maximally tolerant per item and fail only when a whole response is
/// unusable.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync + 'static {
    async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBookSnapshot, FetchError>;

    async fn fetch_price_history(&self, token_id: &str, interval: &str) -> Result<Vec<PricePoint>, FetchError>;

    /// `Ok(None)` when the upstream has no usable trade price.
    async fn fetch_last_trade_price(&self, token_id: &str) -> Result<Option<f64>, FetchError>;
}

// Make the Polymarket adapter visible
pub mod polymarket;
pub mod polymarket_types;
