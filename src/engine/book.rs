use std::collections::BTreeMap;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::{debug, instrument, trace};

use crate::engine::types::{now_ms, OrderBookSnapshot, PriceChange, PriceLevel, Side};

type Price = OrderedFloat<f64>;

/// Canonical price -> size maps for one instrument.
///
/// Mutation happens only through [`Book::apply_snapshot`] and
/// [`Book::apply_changes`]; each call rebuilds one immutable
/// [`OrderBookSnapshot`] after the whole batch, so readers holding the
/// published `Arc` never observe a half-applied batch.
#[derive(Debug)]
pub struct Book {
    bids: BTreeMap<Price, f64>, // highest price = best bid
    asks: BTreeMap<Price, f64>, // lowest price  = best ask
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    pub fn new() -> Self {
        Book { bids: BTreeMap::new(), asks: BTreeMap::new() }
    }

    /// Replace both sides wholesale. Levels with a zero size are skipped.
    #[instrument(level = "debug", skip_all, fields(bids = bids.len(), asks = asks.len()))]
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) -> Arc<OrderBookSnapshot> {
        self.bids.clear();
        self.asks.clear();

        for level in bids {
            Self::upsert(&mut self.bids, level.price, level.size);
        }
        for level in asks {
            Self::upsert(&mut self.asks, level.price, level.size);
        }

        debug!(bid_levels = self.bids.len(), ask_levels = self.asks.len(), "Applied book snapshot");
        self.publish()
    }

    /// Apply a batch of deltas, then publish once.
    ///
    /// Size zero deletes the price; entries without a recognised side are ignored.
    #[instrument(level = "debug", skip_all, fields(changes = changes.len()))]
    pub fn apply_changes(&mut self, changes: &[PriceChange]) -> Arc<OrderBookSnapshot> {
        for change in changes {
            let side_map = match change.side {
                Some(Side::BUY) => &mut self.bids,
                Some(Side::SELL) => &mut self.asks,
                None => {
                    trace!(price = change.price, "Ignoring change with unknown side");
                    continue;
                }
            };
            Self::upsert(side_map, change.price, change.size);
        }
        self.publish()
    }

    fn upsert(side: &mut BTreeMap<Price, f64>, price: f64, size: f64) {
        if !price.is_finite() || !size.is_finite() || size < 0.0 {
            trace!(price, size, "Dropping malformed level");
            return;
        }
        if size == 0.0 {
            side.remove(&OrderedFloat(price));
        } else {
            side.insert(OrderedFloat(price), size);
        }
    }

    fn publish(&self) -> Arc<OrderBookSnapshot> {
        let bids = self.bids.iter().rev().map(|(p, s)| PriceLevel::new(p.0, *s)).collect();
        let asks = self.asks.iter().map(|(p, s)| PriceLevel::new(p.0, *s)).collect();
        Arc::new(OrderBookSnapshot { bids, asks, observed_at_ms: now_ms() })
    }
}
