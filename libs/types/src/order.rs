//! Order model
//!
//! Every order shares an [`OrderInfo`]; kind-specific fields live on the
//! per-kind structs and [`OrderKind`] ties them together as a tagged variant.

use crate::ids::{Address, OrderHash, SubaccountId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    BUY,
    SELL,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::BUY)
    }
}

/// Order type as submitted by the trader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Buy,
    Sell,
    /// Rests on the book or is rejected; never takes liquidity
    BuyPostOnly,
    SellPostOnly,
    /// Market order executed immediately at submission
    BuyAtomic,
    SellAtomic,
}

impl OrderType {
    pub fn side(&self) -> Side {
        match self {
            OrderType::Buy | OrderType::BuyPostOnly | OrderType::BuyAtomic => Side::BUY,
            OrderType::Sell | OrderType::SellPostOnly | OrderType::SellAtomic => Side::SELL,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side().is_buy()
    }

    pub fn is_post_only(&self) -> bool {
        matches!(self, OrderType::BuyPostOnly | OrderType::SellPostOnly)
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, OrderType::BuyAtomic | OrderType::SellAtomic)
    }
}

/// Fields common to every order kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub subaccount_id: SubaccountId,
    /// Relayer credited with the fee share; zero routes to the auction
    pub fee_recipient: Address,
    /// Limit price, or the worst acceptable price for market orders
    pub price: Decimal,
    pub quantity: Decimal,
    /// Client order id, unique per subaccount and market
    pub cid: String,
}

impl OrderInfo {
    /// Price times quantity. Only call on admitted orders, whose notional
    /// is known to fit.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    pub fn checked_notional(&self) -> Option<Decimal> {
        self.price.checked_mul(self.quantity)
    }

    pub fn trader(&self) -> Address {
        self.subaccount_id.address()
    }
}

/// Spot limit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotLimitOrder {
    pub order_info: OrderInfo,
    pub order_type: OrderType,
    /// Remaining unmatched quantity; `0 <= fillable <= quantity`
    pub fillable: Decimal,
    pub trigger_price: Option<Decimal>,
    pub order_hash: OrderHash,
    /// First block height at which the order is void; 0 means none
    pub expiration_block: i64,
}

impl SpotLimitOrder {
    pub fn new(order_info: OrderInfo, order_type: OrderType, order_hash: OrderHash) -> Self {
        let fillable = order_info.quantity;
        Self {
            order_info,
            order_type,
            fillable,
            trigger_price: None,
            order_hash,
            expiration_block: 0,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    pub fn price(&self) -> Decimal {
        self.order_info.price
    }

    pub fn subaccount_id(&self) -> SubaccountId {
        self.order_info.subaccount_id
    }

    /// Terminal orders must leave the book
    pub fn is_fully_filled(&self) -> bool {
        self.fillable.is_zero()
    }
}

/// Spot market order; holds funds for the worst acceptable price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotMarketOrder {
    pub order_info: OrderInfo,
    pub order_type: OrderType,
    pub balance_hold: Decimal,
    pub order_hash: OrderHash,
}

impl SpotMarketOrder {
    pub fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    pub fn subaccount_id(&self) -> SubaccountId {
        self.order_info.subaccount_id
    }
}

/// Derivative limit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeLimitOrder {
    pub order_info: OrderInfo,
    pub order_type: OrderType,
    /// Zero margin marks a reduce-only order
    pub margin: Decimal,
    pub fillable: Decimal,
    pub trigger_price: Option<Decimal>,
    pub order_hash: OrderHash,
}

impl DerivativeLimitOrder {
    pub fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }

    pub fn price(&self) -> Decimal {
        self.order_info.price
    }
}

/// Derivative market order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeMarketOrder {
    pub order_info: OrderInfo,
    pub order_type: OrderType,
    pub margin: Decimal,
    pub margin_hold: Decimal,
    pub trigger_price: Option<Decimal>,
    pub order_hash: OrderHash,
}

impl DerivativeMarketOrder {
    pub fn is_buy(&self) -> bool {
        self.order_type.is_buy()
    }
}

/// Any order accepted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "order")]
pub enum OrderKind {
    SpotLimit(SpotLimitOrder),
    SpotMarket(SpotMarketOrder),
    DerivativeLimit(DerivativeLimitOrder),
    DerivativeMarket(DerivativeMarketOrder),
}

impl OrderKind {
    pub fn info(&self) -> &OrderInfo {
        match self {
            OrderKind::SpotLimit(o) => &o.order_info,
            OrderKind::SpotMarket(o) => &o.order_info,
            OrderKind::DerivativeLimit(o) => &o.order_info,
            OrderKind::DerivativeMarket(o) => &o.order_info,
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::SpotLimit(o) => o.order_type,
            OrderKind::SpotMarket(o) => o.order_type,
            OrderKind::DerivativeLimit(o) => o.order_type,
            OrderKind::DerivativeMarket(o) => o.order_type,
        }
    }

    pub fn order_hash(&self) -> OrderHash {
        match self {
            OrderKind::SpotLimit(o) => o.order_hash,
            OrderKind::SpotMarket(o) => o.order_hash,
            OrderKind::DerivativeLimit(o) => o.order_hash,
            OrderKind::DerivativeMarket(o) => o.order_hash,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.order_type().is_buy()
    }

    pub fn is_market(&self) -> bool {
        matches!(self, OrderKind::SpotMarket(_) | OrderKind::DerivativeMarket(_))
    }

    pub fn is_derivative(&self) -> bool {
        matches!(self, OrderKind::DerivativeLimit(_) | OrderKind::DerivativeMarket(_))
    }

    /// Remaining quantity; market orders are all-or-remainder within a batch
    pub fn fillable(&self) -> Decimal {
        match self {
            OrderKind::SpotLimit(o) => o.fillable,
            OrderKind::DerivativeLimit(o) => o.fillable,
            OrderKind::SpotMarket(o) => o.order_info.quantity,
            OrderKind::DerivativeMarket(o) => o.order_info.quantity,
        }
    }

    /// Margin for derivative orders, `None` for spot
    pub fn margin(&self) -> Option<Decimal> {
        match self {
            OrderKind::DerivativeLimit(o) => Some(o.margin),
            OrderKind::DerivativeMarket(o) => Some(o.margin),
            OrderKind::SpotLimit(_) | OrderKind::SpotMarket(_) => None,
        }
    }
}
