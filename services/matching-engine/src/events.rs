//! Event structures emitted by matching passes
//!
//! Events are plain data handed to the caller's event bus. Field order is
//! stable so JSON renderings can be checksummed.

use exchange_types::ids::{Address, MarketId, OrderHash, SubaccountId};
use exchange_types::order::{DerivativeLimitOrder, SpotLimitOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a batch of trades came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    /// Market orders against the resting book
    Market,
    /// Resting limit orders filled by market orders
    LimitFill,
    /// Resting limit orders filled in a limit matching pass
    LimitMatchRestingOrder,
    /// Newly submitted limit orders filled in a limit matching pass
    LimitMatchNewOrder,
}

/// One side of one trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub quantity: Decimal,
    pub price: Decimal,
    pub subaccount_id: SubaccountId,
    /// Realized fee: auction share, plus the relayer share unless self-relayed
    pub fee: Decimal,
    pub order_hash: OrderHash,
    pub fee_recipient_address: Address,
    pub cid: String,
}

/// Derivative trade, with the position change it implies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeTradeLog {
    pub subaccount_id: SubaccountId,
    pub is_long: bool,
    pub execution_quantity: Decimal,
    pub execution_price: Decimal,
    pub execution_margin: Decimal,
    pub fee: Decimal,
    pub order_hash: OrderHash,
    pub fee_recipient_address: Address,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatchSpotExecution {
    pub market_id: MarketId,
    pub is_buy: bool,
    pub execution_type: ExecutionType,
    pub trades: Vec<TradeLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatchDerivativeExecution {
    pub market_id: MarketId,
    pub is_buy: bool,
    pub execution_type: ExecutionType,
    pub trades: Vec<DerivativeTradeLog>,
}

/// Orders that started resting on the book in this pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNewSpotOrders {
    pub market_id: MarketId,
    pub buy_orders: Vec<SpotLimitOrder>,
    pub sell_orders: Vec<SpotLimitOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNewDerivativeOrders {
    pub market_id: MarketId,
    pub buy_orders: Vec<DerivativeLimitOrder>,
    pub sell_orders: Vec<DerivativeLimitOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCancelSpotOrder {
    pub market_id: MarketId,
    pub order: SpotLimitOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCancelDerivativeOrder {
    pub market_id: MarketId,
    pub order: DerivativeLimitOrder,
}

/// Every event the engine emits, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event")]
pub enum ExchangeEvent {
    BatchSpotExecution(EventBatchSpotExecution),
    BatchDerivativeExecution(EventBatchDerivativeExecution),
    NewSpotOrders(EventNewSpotOrders),
    NewDerivativeOrders(EventNewDerivativeOrders),
    CancelSpotOrder(EventCancelSpotOrder),
    CancelDerivativeOrder(EventCancelDerivativeOrder),
}

impl ExchangeEvent {
    pub fn market_id(&self) -> &MarketId {
        match self {
            ExchangeEvent::BatchSpotExecution(e) => &e.market_id,
            ExchangeEvent::BatchDerivativeExecution(e) => &e.market_id,
            ExchangeEvent::NewSpotOrders(e) => &e.market_id,
            ExchangeEvent::NewDerivativeOrders(e) => &e.market_id,
            ExchangeEvent::CancelSpotOrder(e) => &e.market_id,
            ExchangeEvent::CancelDerivativeOrder(e) => &e.market_id,
        }
    }
}
