//! Market order matching pass
//!
//! Market orders of one direction consume the opposite resting side until
//! their worst prices no longer reach it. The pass clears at the average
//! price of the limit orders it consumed.

use exchange_types::ids::MarketId;
use rust_decimal::Decimal;
use tracing::{debug, error};

use super::clearing::{average_fill_price, ClearingResult};
use super::crossing::can_match;
use crate::book::{BookOrder, LimitBookOrder, LimitOrderbook, MarketOrderbook, OrderbookFills, RestingCursor};

#[derive(Debug, Clone)]
pub struct MarketMatchingResult<L> {
    pub clearing: ClearingResult,
    /// Resting limit orders pulled during the pass, `None` for an empty side
    pub resting_fills: Option<OrderbookFills<L>>,
    /// Index-aligned with the market orders passed in
    pub market_fill_quantities: Vec<Decimal>,
}

/// Match `market_orders` (already in price priority) against the resting
/// limit orders behind `limit_cursor`, which must be the opposite side.
pub fn match_market_orders<L, C, M>(
    market_id: &MarketId,
    is_market_buy: bool,
    limit_cursor: C,
    market_orders: &[M],
) -> MarketMatchingResult<L>
where
    L: LimitBookOrder,
    C: RestingCursor<L>,
    M: BookOrder,
{
    let unmatched = || MarketMatchingResult {
        clearing: ClearingResult::none(),
        resting_fills: None,
        market_fill_quantities: vec![Decimal::ZERO; market_orders.len()],
    };

    let Some(mut limit_book) = LimitOrderbook::<L, C>::new(limit_cursor, Vec::new(), !is_market_buy) else {
        debug!(market_id = %market_id, is_market_buy, "no resting liquidity for market orders");
        return unmatched();
    };
    let Some(mut market_book) = MarketOrderbook::new(market_orders) else {
        return unmatched();
    };

    loop {
        let (Some(market_level), Some(limit_level)) = (market_book.peek(), limit_book.peek()) else {
            break;
        };
        let (buy, sell) = if is_market_buy {
            (market_level, limit_level)
        } else {
            (limit_level, market_level)
        };

        let quantity = buy.quantity.min(sell.quantity);
        if !can_match(buy.price, sell.price) || quantity.is_zero() {
            break;
        }

        let market_fill = market_book.fill(quantity);
        let limit_fill = limit_book.fill(quantity);
        if let Err(e) = market_fill.as_ref().and(limit_fill.as_ref()) {
            error!(market_id = %market_id, fill = %quantity, error = %e, "market order fill failed, ending pass");
            break;
        }
    }

    let clearing = average_fill_price(limit_book.notional(), limit_book.total_quantity_filled());
    debug!(
        market_id = %market_id,
        is_market_buy,
        clearing_price = ?clearing.price,
        clearing_quantity = %clearing.quantity,
        "market order pass done"
    );

    MarketMatchingResult {
        clearing,
        resting_fills: limit_book.finish().resting,
        market_fill_quantities: market_book.into_fill_quantities(),
    }
}
