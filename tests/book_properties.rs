use proptest::prelude::*;

use polybook::engine::book::Book;
use polybook::{OrderBookSnapshot, PriceChange, PriceLevel, Side};

// Prices on a cent grid like the real venue, sizes including zero
fn price() -> impl Strategy<Value = f64> {
    (1u32..100).prop_map(|c| c as f64 / 100.0)
}

fn size() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), (1u32..10_000).prop_map(|s| s as f64 / 10.0)]
}

fn level() -> impl Strategy<Value = PriceLevel> {
    (price(), size()).prop_map(|(p, s)| PriceLevel::new(p, s))
}

fn change() -> impl Strategy<Value = PriceChange> {
    (price(), prop_oneof![Just(Some(Side::BUY)), Just(Some(Side::SELL)), Just(None)], size())
        .prop_map(|(price, side, size)| PriceChange { price, side, size })
}

enum Op {
    Snapshot(Vec<PriceLevel>, Vec<PriceLevel>),
    Changes(Vec<PriceChange>),
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Snapshot(b, a) => write!(f, "Snapshot({} bids, {} asks)", b.len(), a.len()),
            Op::Changes(c) => write!(f, "Changes({})", c.len()),
        }
    }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (prop::collection::vec(level(), 0..20), prop::collection::vec(level(), 0..20))
            .prop_map(|(b, a)| Op::Snapshot(b, a)),
        prop::collection::vec(change(), 0..20).prop_map(Op::Changes),
    ]
}

fn assert_canonical(snap: &OrderBookSnapshot) {
    assert!(snap.bids.windows(2).all(|w| w[0].price > w[1].price), "bids not strictly descending");
    assert!(snap.asks.windows(2).all(|w| w[0].price < w[1].price), "asks not strictly ascending");
    assert!(snap.bids.iter().chain(snap.asks.iter()).all(|l| l.size > 0.0), "zero-size level emitted");
}

proptest! {
    #[test]
    fn every_snapshot_is_canonically_ordered(ops in prop::collection::vec(op(), 1..30)) {
        let mut book = Book::new();
        for op in &ops {
            let snap = match op {
                Op::Snapshot(b, a) => book.apply_snapshot(b, a),
                Op::Changes(c) => book.apply_changes(c),
            };
            assert_canonical(&snap);
        }
    }

    #[test]
    fn zero_size_change_removes_price(
        seed in prop::collection::vec(level(), 0..20),
        p in price(),
        buy in any::<bool>(),
    ) {
        let mut book = Book::new();
        book.apply_snapshot(&seed, &seed);
        let side = if buy { Side::BUY } else { Side::SELL };
        let snap = book.apply_changes(&[PriceChange::new(p, side, 0.0)]);
        let levels = if buy { &snap.bids } else { &snap.asks };
        prop_assert!(levels.iter().all(|l| l.price != p));
    }

    #[test]
    fn snapshot_fully_replaces_prior_state(
        before_bids in prop::collection::vec(level(), 0..20),
        before_asks in prop::collection::vec(level(), 0..20),
        changes in prop::collection::vec(change(), 0..20),
        bids in prop::collection::vec(level(), 0..20),
        asks in prop::collection::vec(level(), 0..20),
    ) {
        let mut book = Book::new();
        book.apply_snapshot(&before_bids, &before_asks);
        book.apply_changes(&changes);
        let snap = book.apply_snapshot(&bids, &asks);

        let mut fresh = Book::new();
        let expected = fresh.apply_snapshot(&bids, &asks);
        prop_assert_eq!(&snap.bids, &expected.bids);
        prop_assert_eq!(&snap.asks, &expected.asks);
    }

    #[test]
    fn reapplying_a_batch_is_idempotent(
        seed in prop::collection::vec(level(), 0..20),
        changes in prop::collection::vec(change(), 0..20),
    ) {
        let mut book = Book::new();
        book.apply_snapshot(&seed, &seed);
        let once = book.apply_changes(&changes);
        let twice = book.apply_changes(&changes);
        prop_assert_eq!(&once.bids, &twice.bids);
        prop_assert_eq!(&once.asks, &twice.asks);
    }
}
