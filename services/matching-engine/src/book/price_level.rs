//! Price levels
//!
//! [`PriceLevel`] is the best price and remaining quantity a book offers to
//! the matcher. [`PriceLevelQueue`] holds the resting orders at one price in
//! FIFO order for time priority.

use std::collections::VecDeque;

use exchange_types::ids::OrderHash;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::LimitBookOrder;

/// Best available price and its unmatched quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Resting orders at a single price
#[derive(Debug, Clone)]
pub struct PriceLevelQueue<O> {
    orders: VecDeque<O>,
    total_fillable: Decimal,
}

impl<O: LimitBookOrder> PriceLevelQueue<O> {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_fillable: Decimal::ZERO,
        }
    }

    /// Insert at the back of the queue (time priority)
    pub fn push_back(&mut self, order: O) {
        self.total_fillable += order.fillable();
        self.orders.push_back(order);
    }

    /// Remove an order by hash, returning it
    pub fn remove(&mut self, order_hash: &OrderHash) -> Option<O> {
        let position = self.orders.iter().position(|o| &o.order_hash() == order_hash)?;
        let order = self.orders.remove(position)?;
        self.total_fillable -= order.fillable();
        Some(order)
    }

    /// Set the remaining quantity of an order; a zero remainder removes it.
    ///
    /// Returns false if the order is not at this level.
    pub fn update_fillable(&mut self, order_hash: &OrderHash, fillable: Decimal) -> bool {
        let Some(position) = self.orders.iter().position(|o| &o.order_hash() == order_hash) else {
            return false;
        };

        if fillable.is_zero() {
            if let Some(order) = self.orders.remove(position) {
                self.total_fillable -= order.fillable();
            }
        } else if let Some(order) = self.orders.get_mut(position) {
            self.total_fillable += fillable - order.fillable();
            order.set_fillable(fillable);
        }
        true
    }

    pub fn get(&self, order_hash: &OrderHash) -> Option<&O> {
        self.orders.iter().find(|o| &o.order_hash() == order_hash)
    }

    pub fn front(&self) -> Option<&O> {
        self.orders.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &O> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_fillable(&self) -> Decimal {
        self.total_fillable
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl<O: LimitBookOrder> Default for PriceLevelQueue<O> {
    fn default() -> Self {
        Self::new()
    }
}
