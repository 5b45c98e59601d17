use crate::orders::{Price, Quantity, RestingOrder, Side};
use std::collections::{BTreeMap, VecDeque, btree_map};

/// An [`OrderBook`] stores the **resting** liquidity of one instrument in two
/// separate [`BTreeMap`]s:
/// - `bids` (buy orders)
/// - `asks` (sell orders)
///
/// Each price level (key) holds a queue of orders kept sorted by ascending
/// sequence, so the front of a level is always the earliest arrival at that price.
/// The order within a level is decided by the sequence number, never by the
/// moment an entry was pushed: a partially filled order that is pushed back
/// goes straight to the front of its level again.
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Buy orders, keyed by price in ascending order.
    ///
    /// The best bid is the **last** key.
    pub bids: BTreeMap<Price, VecDeque<RestingOrder>>,

    /// Sell orders, keyed by price in ascending order.
    ///
    /// The best ask is the **first** key.
    pub asks: BTreeMap<Price, VecDeque<RestingOrder>>,
}

/// Internal enum to unify forward (`Iter`) and reverse (`Rev<Iter>`) BTreeMap iteration.
///
/// - [`LevelIter::Fwd`] walks asks from the lowest price up.
/// - [`LevelIter::Rev`] walks bids from the highest price down.
enum LevelIter<'a> {
    Fwd(btree_map::Iter<'a, Price, VecDeque<RestingOrder>>),
    Rev(std::iter::Rev<btree_map::Iter<'a, Price, VecDeque<RestingOrder>>>),
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = (&'a Price, &'a VecDeque<RestingOrder>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            LevelIter::Fwd(iter) => iter.next(),
            LevelIter::Rev(iter) => iter.next(),
        }
    }
}

impl OrderBook {
    /// Creates a new, empty [`OrderBook`], with no resting bids or asks.
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<Price, VecDeque<RestingOrder>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn levels(&self, side: Side) -> LevelIter<'_> {
        match side {
            Side::Buy => LevelIter::Rev(self.bids.iter().rev()),
            Side::Sell => LevelIter::Fwd(self.asks.iter()),
        }
    }

    /// Returns the top-priority resting order of `side` without removing it.
    ///
    /// Priority is best price first, then lowest sequence.
    pub fn peek_best(&self, side: Side) -> Option<&RestingOrder> {
        let level = match side {
            Side::Buy => self.bids.last_key_value(),
            Side::Sell => self.asks.first_key_value(),
        };
        level.and_then(|(_, orders)| orders.front())
    }

    /// Removes and returns the top-priority resting order of `side`.
    ///
    /// A price level emptied by the pop is removed from the map.
    pub fn pop_best(&mut self, side: Side) -> Option<RestingOrder> {
        let mut level = match side {
            Side::Buy => self.bids.last_entry()?,
            Side::Sell => self.asks.first_entry()?,
        };
        let order = level.get_mut().pop_front();
        if level.get().is_empty() {
            level.remove();
        }
        order
    }

    /// Inserts a resting order, keeping its level sorted by sequence.
    pub fn push(&mut self, side: Side, order: RestingOrder) {
        debug_assert!(order.remaining_quantity > 0, "resting quantity must be positive");
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = book_side.entry(order.price).or_default();
        let at = level.partition_point(|o| o.sequence < order.sequence);
        level.insert(at, order);
    }

    /// Highest resting bid price, if any.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.last_key_value().map(|(price, _)| *price)
    }

    /// Lowest resting ask price, if any.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(price, _)| *price)
    }

    /// True when a bid sits at or above the best ask, i.e. a match was missed.
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    /// Aggregated `(price, total remaining)` per level, best level first.
    /// A level whose total does not fit reports `Quantity::MAX`.
    pub fn depth(&self, side: Side) -> Vec<(Price, Quantity)> {
        self.levels(side)
            .map(|(price, orders)| {
                let total = orders
                    .iter()
                    .fold(0, |acc: Quantity, o| acc.saturating_add(o.remaining_quantity));
                (*price, total)
            })
            .collect()
    }

    /// Every resting order of `side` in matching priority order.
    pub fn resting(&self, side: Side) -> impl Iterator<Item = &RestingOrder> + '_ {
        self.levels(side).flat_map(|(_, orders)| orders.iter())
    }

    /// Number of resting orders on `side`.
    pub fn len(&self, side: Side) -> usize {
        self.side(side).values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
