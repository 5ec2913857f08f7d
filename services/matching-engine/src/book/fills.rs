//! Orders touched in one matching pass and how much of each was matched

use rust_decimal::Decimal;

use super::LimitBookOrder;

/// Parallel order and fill-quantity lists
#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookFills<O> {
    pub orders: Vec<O>,
    pub fill_quantities: Vec<Decimal>,
}

impl<O> OrderbookFills<O> {
    pub fn empty() -> Self {
        Self {
            orders: Vec::new(),
            fill_quantities: Vec::new(),
        }
    }

    /// Every order starts with a zero fill
    pub fn with_orders(orders: Vec<O>) -> Self {
        let fill_quantities = vec![Decimal::ZERO; orders.len()];
        Self {
            orders,
            fill_quantities,
        }
    }

    pub fn push(&mut self, order: O) {
        self.orders.push(order);
        self.fill_quantities.push(Decimal::ZERO);
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&O, Decimal)> {
        self.orders.iter().zip(self.fill_quantities.iter().copied())
    }

    /// Iterate with mutable access to each order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&mut O, Decimal)> {
        self.orders.iter_mut().zip(self.fill_quantities.iter().copied())
    }

    pub fn total_filled(&self) -> Decimal {
        self.fill_quantities.iter().copied().sum()
    }
}

impl<O: LimitBookOrder> OrderbookFills<O> {
    /// Unmatched quantity of the order at `idx`
    pub fn remaining(&self, idx: usize) -> Decimal {
        match (self.orders.get(idx), self.fill_quantities.get(idx)) {
            (Some(order), Some(filled)) => order.fillable() - *filled,
            _ => Decimal::ZERO,
        }
    }
}

impl<O> Default for OrderbookFills<O> {
    fn default() -> Self {
        Self::empty()
    }
}
