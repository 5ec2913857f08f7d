//! Order book infrastructure module
//!
//! Resting books keep orders per price level in FIFO order. Matching walks
//! them through a [`RestingCursor`] merged with the block's transient orders
//! by [`LimitOrderbook`], or consumes a list of market orders through
//! [`MarketOrderbook`].

pub mod cursor;
pub mod fills;
pub mod limit_orderbook;
pub mod market_orderbook;
pub mod price_level;
pub mod side_book;

pub use cursor::{RestingCursor, SnapshotCursor};
pub use fills::OrderbookFills;
pub use limit_orderbook::{LimitOrderbook, LimitOrderbookOutcome};
pub use market_orderbook::MarketOrderbook;
pub use price_level::{PriceLevel, PriceLevelQueue};
pub use side_book::SideBook;

use exchange_types::ids::{OrderHash, SubaccountId};
use exchange_types::order::{
    DerivativeLimitOrder, DerivativeMarketOrder, OrderInfo, SpotLimitOrder, SpotMarketOrder,
};
use rust_decimal::Decimal;

/// Any order that can sit in a matching queue
pub trait BookOrder {
    fn order_info(&self) -> &OrderInfo;
    fn is_buy(&self) -> bool;
    fn order_hash(&self) -> OrderHash;

    fn price(&self) -> Decimal {
        self.order_info().price
    }

    fn quantity(&self) -> Decimal {
        self.order_info().quantity
    }

    fn subaccount_id(&self) -> SubaccountId {
        self.order_info().subaccount_id
    }
}

/// Limit orders carry a fillable remainder that fills reduce
pub trait LimitBookOrder: BookOrder + Clone {
    fn fillable(&self) -> Decimal;
    fn set_fillable(&mut self, fillable: Decimal);
}

impl BookOrder for SpotLimitOrder {
    fn order_info(&self) -> &OrderInfo {
        &self.order_info
    }

    fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    fn order_hash(&self) -> OrderHash {
        self.order_hash
    }
}

impl LimitBookOrder for SpotLimitOrder {
    fn fillable(&self) -> Decimal {
        self.fillable
    }

    fn set_fillable(&mut self, fillable: Decimal) {
        self.fillable = fillable;
    }
}

impl BookOrder for DerivativeLimitOrder {
    fn order_info(&self) -> &OrderInfo {
        &self.order_info
    }

    fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    fn order_hash(&self) -> OrderHash {
        self.order_hash
    }
}

impl LimitBookOrder for DerivativeLimitOrder {
    fn fillable(&self) -> Decimal {
        self.fillable
    }

    fn set_fillable(&mut self, fillable: Decimal) {
        self.fillable = fillable;
    }
}

impl BookOrder for SpotMarketOrder {
    fn order_info(&self) -> &OrderInfo {
        &self.order_info
    }

    fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    fn order_hash(&self) -> OrderHash {
        self.order_hash
    }
}

impl BookOrder for DerivativeMarketOrder {
    fn order_info(&self) -> &OrderInfo {
        &self.order_info
    }

    fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    fn order_hash(&self) -> OrderHash {
        self.order_hash
    }
}

/// Price priority: higher bids first, lower asks first
pub fn has_price_priority(is_buy: bool, a: Decimal, b: Decimal) -> bool {
    if is_buy {
        a > b
    } else {
        a < b
    }
}

/// Stable sort into price priority; equal prices keep submission order
pub fn sort_by_price_priority<O: BookOrder>(orders: &mut [O], is_buy: bool) {
    if is_buy {
        orders.sort_by(|a, b| b.price().cmp(&a.price()));
    } else {
        orders.sort_by(|a, b| a.price().cmp(&b.price()));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use exchange_types::ids::{Address, OrderHash, SubaccountId};
    use exchange_types::numeric::dec;
    use exchange_types::order::{OrderInfo, OrderType, SpotLimitOrder, SpotMarketOrder};

    pub fn hash(n: u8) -> OrderHash {
        OrderHash::from_bytes([n; 32])
    }

    pub fn info(trader: u8, price: &str, quantity: &str) -> OrderInfo {
        OrderInfo {
            subaccount_id: SubaccountId::new(Address::repeat(trader), 0),
            fee_recipient: Address::repeat(0xfe),
            price: dec(price),
            quantity: dec(quantity),
            cid: format!("cid-{trader}"),
        }
    }

    pub fn limit(n: u8, is_buy: bool, price: &str, quantity: &str) -> SpotLimitOrder {
        let order_type = if is_buy { OrderType::Buy } else { OrderType::Sell };
        SpotLimitOrder::new(info(n, price, quantity), order_type, hash(n))
    }

    pub fn market(n: u8, is_buy: bool, price: &str, quantity: &str) -> SpotMarketOrder {
        let order_type = if is_buy { OrderType::Buy } else { OrderType::Sell };
        SpotMarketOrder {
            order_info: info(n, price, quantity),
            order_type,
            balance_hold: dec("0"),
            order_hash: hash(n),
        }
    }
}
