//! Market order queue
//!
//! Market orders of one side, already in price priority, consumed front to
//! back. Unlike resting orders they are matched against their full quantity.

use exchange_types::errors::FillError;
use rust_decimal::Decimal;

use super::price_level::PriceLevel;
use super::BookOrder;

pub struct MarketOrderbook<'a, O: BookOrder> {
    orders: &'a [O],
    fill_quantities: Vec<Decimal>,
    order_idx: usize,
    notional: Decimal,
    total_quantity: Decimal,
}

impl<'a, O: BookOrder> MarketOrderbook<'a, O> {
    /// `None` when there is nothing to match
    pub fn new(orders: &'a [O]) -> Option<Self> {
        if orders.is_empty() {
            return None;
        }
        Some(Self {
            orders,
            fill_quantities: vec![Decimal::ZERO; orders.len()],
            order_idx: 0,
            notional: Decimal::ZERO,
            total_quantity: Decimal::ZERO,
        })
    }

    pub fn is_done(&self) -> bool {
        self.order_idx >= self.orders.len()
    }

    /// First order with quantity left; fully matched orders are skipped
    pub fn peek(&mut self) -> Option<PriceLevel> {
        while let Some(order) = self.orders.get(self.order_idx) {
            let filled = self.fill_quantities[self.order_idx];
            if filled < order.quantity() {
                return Some(PriceLevel {
                    price: order.price(),
                    quantity: order.quantity() - filled,
                });
            }
            self.order_idx += 1;
        }
        None
    }

    pub fn fill(&mut self, quantity: Decimal) -> Result<(), FillError> {
        let order = self.orders.get(self.order_idx).ok_or(FillError::Exhausted)?;
        let filled = &mut self.fill_quantities[self.order_idx];

        let cumulative = *filled + quantity;
        if cumulative > order.quantity() {
            return Err(FillError::ExceedsFillable {
                requested: quantity.to_string(),
                remaining: (order.quantity() - *filled).to_string(),
            });
        }

        *filled = cumulative;
        self.notional += quantity * order.price();
        self.total_quantity += quantity;
        Ok(())
    }

    pub fn notional(&self) -> Decimal {
        self.notional
    }

    pub fn total_quantity_filled(&self) -> Decimal {
        self.total_quantity
    }

    /// Per-order fills, index-aligned with the input orders
    pub fn into_fill_quantities(self) -> Vec<Decimal> {
        self.fill_quantities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::test_support::market;
    use exchange_types::numeric::dec;

    #[test]
    fn test_empty_orders_yield_no_book() {
        let orders: Vec<exchange_types::order::SpotMarketOrder> = vec![];
        assert!(MarketOrderbook::new(&orders).is_none());
    }

    #[test]
    fn test_peek_skips_filled_orders() {
        let orders = vec![market(1, true, "105", "2"), market(2, true, "104", "3")];
        let mut book = MarketOrderbook::new(&orders).unwrap();

        assert_eq!(book.peek().unwrap().quantity, dec("2"));
        book.fill(dec("2")).unwrap();

        let level = book.peek().unwrap();
        assert_eq!(level.price, dec("104"));
        assert_eq!(level.quantity, dec("3"));
        book.fill(dec("1")).unwrap();

        assert_eq!(book.notional(), dec("314"));
        assert_eq!(book.total_quantity_filled(), dec("3"));
        assert_eq!(book.into_fill_quantities(), vec![dec("2"), dec("1")]);
    }

    #[test]
    fn test_overfill_rejected() {
        let orders = vec![market(1, false, "90", "1")];
        let mut book = MarketOrderbook::new(&orders).unwrap();
        book.peek();
        assert!(matches!(book.fill(dec("2")), Err(FillError::ExceedsFillable { .. })));
    }

    #[test]
    fn test_done_after_last_order() {
        let orders = vec![market(1, false, "90", "1")];
        let mut book = MarketOrderbook::new(&orders).unwrap();
        book.peek();
        book.fill(dec("1")).unwrap();
        assert!(book.peek().is_none());
        assert!(book.is_done());
        assert_eq!(book.fill(dec("1")), Err(FillError::Exhausted));
    }
}
