//! Limit orderbook iterator
//!
//! Merges the resting cursor of one (market, side) with the block's
//! transient orders for that side and yields the best remaining order
//! through `peek`/`fill`. Resting orders are pulled from the cursor lazily,
//! one at a time, so only orders that actually participate are loaded.

use exchange_types::errors::FillError;
use rust_decimal::Decimal;
use tracing::trace;

use super::cursor::RestingCursor;
use super::fills::OrderbookFills;
use super::price_level::PriceLevel;
use super::{sort_by_price_priority, LimitBookOrder};

/// Order currently offered by the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Empty,
    Resting(usize),
    Transient(usize),
}

/// Result of a finished matching pass over one side
#[derive(Debug, Clone)]
pub struct LimitOrderbookOutcome<O> {
    /// Resting orders pulled from the cursor, `None` if the cursor was empty
    pub resting: Option<OrderbookFills<O>>,
    /// Transient orders, `None` if the side had none
    pub transient: Option<OrderbookFills<O>>,
    /// `Σ fill × order price` over every fill
    pub notional: Decimal,
    pub total_quantity: Decimal,
}

pub struct LimitOrderbook<O: LimitBookOrder, C: RestingCursor<O>> {
    is_buy: bool,
    notional: Decimal,
    total_quantity: Decimal,
    transient: Option<OrderbookFills<O>>,
    transient_idx: usize,
    resting: Option<OrderbookFills<O>>,
    cursor: C,
    current: Current,
    closed: bool,
}

impl<O: LimitBookOrder, C: RestingCursor<O>> LimitOrderbook<O, C> {
    /// Returns `None` (closing the cursor) when neither source has orders.
    ///
    /// Transient orders are put into price priority; equal prices keep their
    /// submission order.
    pub fn new(mut cursor: C, mut transient_orders: Vec<O>, is_buy: bool) -> Option<Self> {
        if transient_orders.is_empty() && !cursor.has_next() {
            cursor.close();
            return None;
        }
        sort_by_price_priority(&mut transient_orders, is_buy);

        let transient = if transient_orders.is_empty() {
            None
        } else {
            Some(OrderbookFills::with_orders(transient_orders))
        };
        let resting = cursor.has_next().then(OrderbookFills::empty);

        Some(Self {
            is_buy,
            notional: Decimal::ZERO,
            total_quantity: Decimal::ZERO,
            transient,
            transient_idx: 0,
            resting,
            cursor,
            current: Current::Empty,
            closed: false,
        })
    }

    pub fn notional(&self) -> Decimal {
        self.notional
    }

    pub fn total_quantity_filled(&self) -> Decimal {
        self.total_quantity
    }

    /// Best remaining order across both sources, without consuming it
    pub fn peek(&mut self) -> Option<PriceLevel> {
        if self.closed {
            return None;
        }
        self.select_current();

        let (fills, idx) = match self.current {
            Current::Empty => return None,
            Current::Resting(idx) => (self.resting.as_ref()?, idx),
            Current::Transient(idx) => (self.transient.as_ref()?, idx),
        };
        let order = fills.orders.get(idx)?;
        Some(PriceLevel {
            price: order.price(),
            quantity: fills.remaining(idx),
        })
    }

    /// Check that `quantity` fits the order selected by the last `peek`,
    /// without committing anything
    pub fn check_fill(&self, quantity: Decimal) -> Result<(), FillError> {
        if self.closed {
            return Err(FillError::Closed);
        }
        if quantity.is_sign_negative() {
            return Err(FillError::NegativeQuantity(quantity.to_string()));
        }

        let (fills, idx) = match self.current {
            Current::Empty => return Err(FillError::Exhausted),
            Current::Resting(idx) => (self.resting.as_ref(), idx),
            Current::Transient(idx) => (self.transient.as_ref(), idx),
        };
        let fills = fills.ok_or(FillError::Exhausted)?;
        let (Some(order), Some(filled)) = (fills.orders.get(idx), fills.fill_quantities.get(idx)) else {
            return Err(FillError::Exhausted);
        };
        if *filled + quantity > order.fillable() {
            return Err(FillError::ExceedsFillable {
                requested: quantity.to_string(),
                remaining: (order.fillable() - *filled).to_string(),
            });
        }
        Ok(())
    }

    /// Commit `quantity` against the order selected by the last `peek`
    pub fn fill(&mut self, quantity: Decimal) -> Result<(), FillError> {
        self.check_fill(quantity)?;

        let (fills, idx) = match self.current {
            Current::Empty => return Err(FillError::Exhausted),
            Current::Resting(idx) => (self.resting.as_mut(), idx),
            Current::Transient(idx) => (self.transient.as_mut(), idx),
        };
        let fills = fills.ok_or(FillError::Exhausted)?;
        let (Some(order), Some(filled)) = (fills.orders.get(idx), fills.fill_quantities.get_mut(idx)) else {
            return Err(FillError::Exhausted);
        };

        let cumulative = *filled + quantity;
        *filled = cumulative;
        self.notional += quantity * order.price();
        self.total_quantity += quantity;

        if cumulative == order.fillable() {
            trace!(order_hash = %order.order_hash(), "order fully matched");
            self.current = Current::Empty;
        }
        Ok(())
    }

    /// Release the resting cursor; safe to call more than once
    pub fn close(&mut self) {
        if !self.closed {
            self.cursor.close();
            self.closed = true;
        }
    }

    /// Close the book and hand back what was matched
    pub fn finish(mut self) -> LimitOrderbookOutcome<O> {
        self.close();
        LimitOrderbookOutcome {
            resting: self.resting.take(),
            transient: self.transient.take(),
            notional: self.notional,
            total_quantity: self.total_quantity,
        }
    }

    /// Pick the next order when none is selected.
    ///
    /// Between a resting and a transient candidate, the transient order wins
    /// only with a strictly better price; ties go to the resting order.
    fn select_current(&mut self) {
        if self.current != Current::Empty {
            return;
        }

        let resting = self.resting_candidate();
        let transient = self.transient_candidate();

        self.current = match (resting, transient) {
            (Some((r_idx, r_price)), Some((t_idx, t_price))) => {
                let transient_better = if self.is_buy {
                    r_price < t_price
                } else {
                    r_price > t_price
                };
                if transient_better {
                    Current::Transient(t_idx)
                } else {
                    Current::Resting(r_idx)
                }
            }
            (Some((r_idx, _)), None) => Current::Resting(r_idx),
            (None, Some((t_idx, _))) => Current::Transient(t_idx),
            (None, None) => Current::Empty,
        };
    }

    /// Last pulled resting order if it still has quantity, else the next
    /// order from the cursor
    fn resting_candidate(&mut self) -> Option<(usize, Decimal)> {
        let resting = self.resting.as_mut()?;

        if let Some(last) = resting.len().checked_sub(1) {
            if resting.remaining(last) > Decimal::ZERO {
                return resting.orders.get(last).map(|o| (last, o.price()));
            }
        }

        if !self.cursor.has_next() {
            return None;
        }
        let order = self.cursor.peek_value()?.clone();
        self.cursor.advance();

        let price = order.price();
        resting.push(order);
        Some((resting.len() - 1, price))
    }

    /// First transient order with quantity left
    fn transient_candidate(&mut self) -> Option<(usize, Decimal)> {
        let transient = self.transient.as_ref()?;
        while self.transient_idx < transient.len() {
            if transient.remaining(self.transient_idx) > Decimal::ZERO {
                let order = transient.orders.get(self.transient_idx)?;
                return Some((self.transient_idx, order.price()));
            }
            self.transient_idx += 1;
        }
        None
    }
}

impl<O: LimitBookOrder, C: RestingCursor<O>> Drop for LimitOrderbook<O, C> {
    fn drop(&mut self) {
        self.close();
    }
}
