//! Limit order matching pass
//!
//! Pairs the best buy against the best sell of one market, each side merging
//! its resting cursor with the block's new orders, until the book no longer
//! crosses. Every matched order then clears at one uniform price.

use exchange_types::ids::MarketId;
use rust_decimal::Decimal;
use tracing::{debug, error};

use super::clearing::{select_clearing_price, ClearingResult};
use super::crossing::can_match;
use crate::book::{LimitBookOrder, LimitOrderbook, OrderbookFills, RestingCursor};

/// Fills of both sides of one limit matching pass
#[derive(Debug, Clone)]
pub struct LimitMatchingResult<O> {
    pub clearing: ClearingResult,
    pub resting_buys: Option<OrderbookFills<O>>,
    pub resting_sells: Option<OrderbookFills<O>>,
    pub transient_buys: Option<OrderbookFills<O>>,
    pub transient_sells: Option<OrderbookFills<O>>,
}

impl<O> LimitMatchingResult<O> {
    /// New orders untouched; used when one side of the book is empty
    fn unmatched(transient_buys: Vec<O>, transient_sells: Vec<O>) -> Self {
        let fills = |orders: Vec<O>| (!orders.is_empty()).then(|| OrderbookFills::with_orders(orders));
        Self {
            clearing: ClearingResult::none(),
            resting_buys: None,
            resting_sells: None,
            transient_buys: fills(transient_buys),
            transient_sells: fills(transient_sells),
        }
    }
}

/// Run the limit matching pass of one market.
///
/// `mid_price` is the resting book's mid price (or best price) before the
/// pass; it steers the clearing price.
pub fn match_limit_orders<O, C>(
    market_id: &MarketId,
    buy_cursor: C,
    sell_cursor: C,
    transient_buys: Vec<O>,
    transient_sells: Vec<O>,
    mid_price: Option<Decimal>,
) -> LimitMatchingResult<O>
where
    O: LimitBookOrder,
    C: RestingCursor<O>,
{
    let mut buy_cursor = buy_cursor;
    let mut sell_cursor = sell_cursor;
    let buy_side_empty = transient_buys.is_empty() && !buy_cursor.has_next();
    let sell_side_empty = transient_sells.is_empty() && !sell_cursor.has_next();
    if buy_side_empty || sell_side_empty {
        buy_cursor.close();
        sell_cursor.close();
        return LimitMatchingResult::unmatched(transient_buys, transient_sells);
    }

    let (Some(mut buy_book), Some(mut sell_book)) = (
        LimitOrderbook::new(buy_cursor, transient_buys, true),
        LimitOrderbook::new(sell_cursor, transient_sells, false),
    ) else {
        return LimitMatchingResult::unmatched(Vec::new(), Vec::new());
    };

    let mut last_buy_price = Decimal::ZERO;
    let mut last_sell_price = Decimal::ZERO;

    loop {
        let (Some(buy), Some(sell)) = (buy_book.peek(), sell_book.peek()) else {
            break;
        };
        if !can_match(buy.price, sell.price) {
            break;
        }

        last_buy_price = buy.price;
        last_sell_price = sell.price;
        let quantity = buy.quantity.min(sell.quantity);

        // both sides must accept the fill before either commits it
        let fill = buy_book
            .check_fill(quantity)
            .and_then(|()| sell_book.check_fill(quantity))
            .and_then(|()| buy_book.fill(quantity))
            .and_then(|()| sell_book.fill(quantity));
        if let Err(e) = fill {
            error!(market_id = %market_id, fill = %quantity, error = %e, "limit orderbook fill failed, ending pass");
            break;
        }
    }

    let clearing_quantity = sell_book.total_quantity_filled();
    let clearing = if clearing_quantity > Decimal::ZERO {
        ClearingResult {
            price: Some(select_clearing_price(last_buy_price, last_sell_price, mid_price)),
            quantity: clearing_quantity,
        }
    } else {
        ClearingResult::none()
    };

    debug!(
        market_id = %market_id,
        clearing_price = ?clearing.price,
        clearing_quantity = %clearing.quantity,
        "limit matching pass done"
    );

    let buys = buy_book.finish();
    let sells = sell_book.finish();
    LimitMatchingResult {
        clearing,
        resting_buys: buys.resting,
        resting_sells: sells.resting,
        transient_buys: buys.transient,
        transient_sells: sells.transient,
    }
}
