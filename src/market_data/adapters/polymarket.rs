// Polymarket CLOB REST adapter: book, price history and last trade price

use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::polymarket_types::{BookResponse, LastTradePriceResponse, PriceHistoryResponse};
use super::MarketDataSource;
use crate::engine::types::{OrderBookSnapshot, PricePoint};
use crate::error::FetchError;

pub const DEFAULT_REST_URL: &str = "https://clob.polymarket.com";

#[derive(Debug, Clone)]
pub struct PolymarketRest {
    pub base_url: String, // "https://clob.polymarket.com"
    client: reqwest::Client,
}

impl Default for PolymarketRest {
    fn default() -> Self {
        Self::new(DEFAULT_REST_URL)
    }
}

impl PolymarketRest {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    // GET `path` with `query`, then decode the whole body as `T`
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, FetchError> {
        let endpoint = self.endpoint(path);
        let res = self
            .client
            .get(&endpoint)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport { endpoint: endpoint.clone(), source })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%endpoint, status = status.as_u16(), "Upstream returned error status");
            return Err(FetchError::Status { endpoint, status: status.as_u16() });
        }

        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { endpoint: endpoint.clone(), source })?;

        serde_json::from_str::<T>(&body).map_err(|source| FetchError::Decode { endpoint, source })
    }
}

#[async_trait::async_trait]
impl MarketDataSource for PolymarketRest {
    #[instrument(skip(self))]
    async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBookSnapshot, FetchError> {
        let raw: BookResponse = self.get_json("book", &[("token_id", token_id)]).await?;
        let snapshot = raw.into_snapshot();
        debug!(bids = snapshot.bids.len(), asks = snapshot.asks.len(), "Fetched order book");
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn fetch_price_history(&self, token_id: &str, interval: &str) -> Result<Vec<PricePoint>, FetchError> {
        let raw: PriceHistoryResponse = self
            .get_json("prices-history", &[("market", token_id), ("interval", interval)])
            .await?;
        let total = raw.history.len();
        let points = raw.into_points();
        debug!(points = points.len(), dropped = total - points.len(), "Fetched price history");
        Ok(points)
    }

    #[instrument(skip(self))]
    async fn fetch_last_trade_price(&self, token_id: &str) -> Result<Option<f64>, FetchError> {
        let raw: LastTradePriceResponse = self.get_json("last-trade-price", &[("token_id", token_id)]).await?;
        Ok(raw.price())
    }
}
