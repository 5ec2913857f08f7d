//! One side of a resting order book
//!
//! Price levels live in a `BTreeMap` for deterministic iteration; bids are
//! read from the top of the map, asks from the bottom.

use std::collections::BTreeMap;

use exchange_types::ids::OrderHash;
use rust_decimal::Decimal;

use super::cursor::SnapshotCursor;
use super::price_level::{PriceLevel, PriceLevelQueue};
use super::LimitBookOrder;

#[derive(Debug, Clone)]
pub struct SideBook<O> {
    is_buy: bool,
    levels: BTreeMap<Decimal, PriceLevelQueue<O>>,
    /// Order hash to price, for cancellation and fill updates
    prices: BTreeMap<OrderHash, Decimal>,
}

impl<O: LimitBookOrder> SideBook<O> {
    pub fn new(is_buy: bool) -> Self {
        Self {
            is_buy,
            levels: BTreeMap::new(),
            prices: BTreeMap::new(),
        }
    }

    pub fn is_buy(&self) -> bool {
        self.is_buy
    }

    /// Insert at the back of its price level
    pub fn insert(&mut self, order: O) {
        let price = order.price();
        self.prices.insert(order.order_hash(), price);
        self.levels.entry(price).or_default().push_back(order);
    }

    pub fn remove(&mut self, order_hash: &OrderHash) -> Option<O> {
        let price = self.prices.remove(order_hash)?;
        let level = self.levels.get_mut(&price)?;
        let order = level.remove(order_hash);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        order
    }

    pub fn get(&self, order_hash: &OrderHash) -> Option<&O> {
        let price = self.prices.get(order_hash)?;
        self.levels.get(price)?.get(order_hash)
    }

    pub fn contains(&self, order_hash: &OrderHash) -> bool {
        self.prices.contains_key(order_hash)
    }

    /// Apply a post-fill remainder; zero removes the order.
    ///
    /// Returns false if the order is not in this book.
    pub fn update_fillable(&mut self, order_hash: &OrderHash, fillable: Decimal) -> bool {
        let Some(price) = self.prices.get(order_hash).copied() else {
            return false;
        };
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };

        let updated = level.update_fillable(order_hash, fillable);
        if fillable.is_zero() {
            self.prices.remove(order_hash);
        }
        if level.is_empty() {
            self.levels.remove(&price);
        }
        updated
    }

    /// Best price: highest bid or lowest ask
    pub fn best_price(&self) -> Option<Decimal> {
        if self.is_buy {
            self.levels.keys().next_back().copied()
        } else {
            self.levels.keys().next().copied()
        }
    }

    pub fn best_level(&self) -> Option<PriceLevel> {
        let mut levels = self.levels_best_first();
        levels.next().map(|(price, level)| PriceLevel {
            price: *price,
            quantity: level.total_fillable(),
        })
    }

    fn levels_best_first(&self) -> Box<dyn Iterator<Item = (&Decimal, &PriceLevelQueue<O>)> + '_> {
        if self.is_buy {
            Box::new(self.levels.iter().rev())
        } else {
            Box::new(self.levels.iter())
        }
    }

    /// All orders best price first, then insertion order
    pub fn orders_best_first(&self) -> Vec<O> {
        self.levels_best_first()
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// Cursor over a snapshot of this side for one matching pass
    pub fn cursor(&self) -> SnapshotCursor<O> {
        SnapshotCursor::new(self.orders_best_first())
    }

    /// Top `depth` levels, best first
    pub fn depth_snapshot(&self, depth: usize) -> Vec<PriceLevel> {
        self.levels_best_first()
            .take(depth)
            .map(|(price, level)| PriceLevel {
                price: *price,
                quantity: level.total_fillable(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
