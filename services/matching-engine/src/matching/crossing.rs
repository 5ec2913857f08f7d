//! Crossing detection
//!
//! Determines when a bid and an ask are compatible, and when an incoming
//! order would take liquidity from the top of book.

use rust_decimal::Decimal;

/// A buy and a sell level match when the spread `sell - buy` is not positive
pub fn can_match(buy_price: Decimal, sell_price: Decimal) -> bool {
    sell_price - buy_price <= Decimal::ZERO
}

/// Whether an incoming order at `price` crosses the best opposite price
pub fn incoming_can_match(is_buy: bool, price: Decimal, best_opposite_price: Decimal) -> bool {
    if is_buy {
        can_match(price, best_opposite_price)
    } else {
        can_match(best_opposite_price, price)
    }
}

/// Top-of-book check for post-only orders; an empty opposite side never crosses
pub fn crosses_top_of_book(is_buy: bool, price: Decimal, best_opposite_price: Option<Decimal>) -> bool {
    best_opposite_price.is_some_and(|best| incoming_can_match(is_buy, price, best))
}

/// Whether a market order's worst price reaches the best opposite price
pub fn worst_price_reaches(is_buy: bool, worst_price: Decimal, best_opposite_price: Decimal) -> bool {
    incoming_can_match(is_buy, worst_price, best_opposite_price)
}
