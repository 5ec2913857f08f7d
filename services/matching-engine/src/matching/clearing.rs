//! Clearing price selection

use exchange_types::numeric::{midpoint, quo};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome price and volume of one matching pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClearingResult {
    /// `None` when nothing traded
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

impl ClearingResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_trades(&self) -> bool {
        self.price.is_some() && self.quantity > Decimal::ZERO
    }
}

/// Mid price of the resting book, or the best price of the only non-empty side
pub fn mid_price_or_best_price(best_buy: Option<Decimal>, best_sell: Option<Decimal>) -> Option<Decimal> {
    match (best_buy, best_sell) {
        (Some(buy), Some(sell)) => Some(midpoint(buy, sell)),
        (Some(buy), None) => Some(buy),
        (None, Some(sell)) => Some(sell),
        (None, None) => None,
    }
}

/// Uniform price for a limit matching pass.
///
/// Prefers the last matched buy price when it is at or below the resting
/// mid price, then the last matched sell price when it is at or above it,
/// then the mid price itself. Without a resting book the last prices are
/// averaged.
pub fn select_clearing_price(last_buy_price: Decimal, last_sell_price: Decimal, mid_price: Option<Decimal>) -> Decimal {
    match mid_price {
        Some(mid) if last_buy_price <= mid => last_buy_price,
        Some(mid) if last_sell_price >= mid => last_sell_price,
        Some(mid) => mid,
        None => midpoint(last_buy_price, last_sell_price),
    }
}

/// Clearing of a market order pass: the limit side's average fill price
pub fn average_fill_price(notional: Decimal, quantity: Decimal) -> ClearingResult {
    if quantity <= Decimal::ZERO {
        return ClearingResult { price: None, quantity };
    }
    ClearingResult {
        price: quo(notional, quantity),
        quantity,
    }
}
