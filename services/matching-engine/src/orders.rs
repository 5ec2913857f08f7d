//! Order admission
//!
//! Validation that runs before an order reaches any book, the balance hold
//! taken at admission and the refund returned when an order is cancelled.
//! Amounts are human units unless a type says otherwise.

use exchange_types::errors::OrderError;
use exchange_types::ids::MarketId;
use exchange_types::market::Market;
use exchange_types::numeric::{is_multiple_of, positive_part};
use exchange_types::order::{DerivativeLimitOrder, OrderInfo, OrderType, SpotLimitOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::expansion::derivative::margin_share;
use crate::matching::crossing::{crosses_top_of_book, worst_price_reaches};

/// An order as submitted, before the engine assigns its hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market_id: MarketId,
    pub order_info: OrderInfo,
    pub order_type: OrderType,
    /// Derivative orders only
    #[serde(default)]
    pub margin: Decimal,
    /// First block height at which a spot limit order is void; 0 means none
    #[serde(default)]
    pub expiration_block: i64,
}

/// Best prices of both resting sides of a market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopOfBook {
    pub best_buy: Option<Decimal>,
    pub best_sell: Option<Decimal>,
}

impl TopOfBook {
    pub fn best_opposite(&self, is_buy: bool) -> Option<Decimal> {
        if is_buy {
            self.best_sell
        } else {
            self.best_buy
        }
    }
}

/// Funds locked or released in one denom, in chain units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHold {
    pub denom: String,
    pub amount: Decimal,
}

impl BalanceHold {
    /// Hold on the denom an order of this side locks
    pub fn for_side(market: &Market, is_buy: bool, amount: Decimal) -> Result<Self, OrderError> {
        let chain_amount = if market.is_spot() && !is_buy {
            market.quantity_to_chain_format(amount)
        } else {
            market.notional_to_chain_format(amount)
        };
        Ok(Self {
            denom: market.margin_denom(is_buy).to_string(),
            amount: chain_amount.ok_or_else(|| OrderError::AmountOverflow(format!("hold of {amount}")))?,
        })
    }
}

fn hold_overflow(info: &OrderInfo) -> OrderError {
    OrderError::AmountOverflow(format!("hold for {} at {}", info.quantity, info.price))
}

/// Price, quantity and notional checks shared by every order kind
pub fn validate_order_info(market: &Market, info: &OrderInfo) -> Result<(), OrderError> {
    if info.price <= Decimal::ZERO {
        return Err(OrderError::InvalidPrice(info.price.to_string()));
    }
    if info.quantity <= Decimal::ZERO {
        return Err(OrderError::InvalidQuantity(info.quantity.to_string()));
    }
    if !is_multiple_of(info.price, market.min_price_tick_size) {
        return Err(OrderError::PriceTick {
            price: info.price.to_string(),
            tick: market.min_price_tick_size.to_string(),
        });
    }
    if !is_multiple_of(info.quantity, market.min_quantity_tick_size) {
        return Err(OrderError::QuantityTick {
            quantity: info.quantity.to_string(),
            tick: market.min_quantity_tick_size.to_string(),
        });
    }
    let notional = info
        .checked_notional()
        .ok_or_else(|| OrderError::AmountOverflow(format!("notional of {} at {}", info.quantity, info.price)))?;
    if notional < market.min_notional {
        return Err(OrderError::BelowMinNotional {
            notional: notional.to_string(),
            min_notional: market.min_notional.to_string(),
        });
    }
    // every settlement amount of the order is converted to chain units later
    if market.quantity_to_chain_format(info.quantity).is_none() {
        return Err(OrderError::AmountOverflow(format!("quantity {} in chain units", info.quantity)));
    }
    if market.notional_to_chain_format(notional).is_none() {
        return Err(OrderError::AmountOverflow(format!("notional {notional} in chain units")));
    }
    Ok(())
}

/// Validate a limit order.
///
/// Checks performed (in order):
/// 1. Price, quantity and notional against the market
/// 2. Expiration block, when set, lies in the future
/// 3. Post-only orders, and every limit order in post-only mode, must not
///    cross the top of book
pub fn validate_limit_order(
    market: &Market,
    request: &OrderRequest,
    block_height: i64,
    config: &EngineConfig,
    top: TopOfBook,
) -> Result<(), OrderError> {
    validate_order_info(market, &request.order_info)?;

    if request.expiration_block != 0 && request.expiration_block <= block_height {
        return Err(OrderError::InvalidExpirationBlock {
            expiration_block: request.expiration_block,
            block_height,
        });
    }

    let is_buy = request.order_type.is_buy();
    let must_rest = request.order_type.is_post_only() || config.is_post_only_mode;
    if must_rest && crosses_top_of_book(is_buy, request.order_info.price, top.best_opposite(is_buy)) {
        return Err(OrderError::ExceedsTopOfBookPrice);
    }
    Ok(())
}

/// Validate a market order and return the best opposite price it will
/// trade against.
///
/// The worst price must reach the best opposite price; an empty opposite
/// side rejects the order outright.
pub fn validate_market_order(
    market: &Market,
    request: &OrderRequest,
    config: &EngineConfig,
    top: TopOfBook,
) -> Result<Decimal, OrderError> {
    if config.is_post_only_mode {
        return Err(OrderError::PostOnlyMode);
    }
    if request.expiration_block != 0 {
        return Err(OrderError::MarketOrderExpiration);
    }
    validate_order_info(market, &request.order_info)?;

    let is_buy = request.order_type.is_buy();
    let best_price = top.best_opposite(is_buy).ok_or(OrderError::NoLiquidity)?;
    let worst_price = request.order_info.price;
    if !worst_price_reaches(is_buy, worst_price, best_price) {
        return Err(OrderError::SlippageExceedsWorstPrice {
            worst_price: worst_price.to_string(),
            best_price: best_price.to_string(),
        });
    }
    Ok(best_price)
}

/// Margin checks for derivative orders.
///
/// Zero margin marks a reduce-only limit order; market orders must carry
/// margin. Margin must cover `price * quantity * initial_margin_ratio`.
pub fn validate_derivative_margin(market: &Market, request: &OrderRequest, is_market: bool) -> Result<(), OrderError> {
    let margin = request.margin;
    if margin < Decimal::ZERO {
        return Err(OrderError::InvalidMargin(format!("negative margin {margin}")));
    }
    if margin.is_zero() {
        if is_market {
            return Err(OrderError::InvalidMargin("market orders require margin".to_string()));
        }
        return Ok(());
    }

    let required = request
        .order_info
        .checked_notional()
        .and_then(|notional| notional.checked_mul(market.initial_margin_ratio))
        .ok_or_else(|| hold_overflow(&request.order_info))?;
    if margin < required {
        return Err(OrderError::InvalidMargin(format!("margin {margin} below required {required}")));
    }
    Ok(())
}

/// Fee rate a market order pays as taker; atomic orders pay the multiplier
pub fn market_order_fee_rate(market: &Market, order_type: OrderType, config: &EngineConfig) -> Decimal {
    if order_type.is_atomic() {
        market.taker_fee_rate * config.atomic_market_order_fee_multiplier
    } else {
        market.taker_fee_rate
    }
}

/// Fee rate a limit order holds for: the taker rate unless it can only
/// ever make, in which case only a positive maker rate
fn limit_hold_fee_rate(market: &Market, is_post_only: bool) -> Decimal {
    if is_post_only {
        positive_part(market.maker_fee_rate)
    } else {
        positive_part(market.taker_fee_rate)
    }
}

/// Hold for a new spot limit order: quote notional plus fee for buys, the
/// base quantity for sells
pub fn spot_limit_order_hold(market: &Market, order: &SpotLimitOrder) -> Result<Decimal, OrderError> {
    if !order.is_buy() {
        return Ok(order.order_info.quantity);
    }
    let rate = limit_hold_fee_rate(market, order.order_type.is_post_only());
    order
        .order_info
        .checked_notional()
        .and_then(|notional| notional.checked_mul(Decimal::ONE + rate))
        .ok_or_else(|| hold_overflow(&order.order_info))
}

/// Hold for a spot market order.
///
/// Buys hold quote for the whole quantity at the higher of the best and the
/// worst price plus the taker fee; sells hold the base quantity.
pub fn spot_market_order_hold(
    info: &OrderInfo,
    is_buy: bool,
    best_price: Decimal,
    fee_rate: Decimal,
) -> Result<Decimal, OrderError> {
    if !is_buy {
        return Ok(info.quantity);
    }
    best_price
        .max(info.price)
        .checked_mul(info.quantity)
        .and_then(|notional| notional.checked_mul(Decimal::ONE + fee_rate))
        .ok_or_else(|| hold_overflow(info))
}

/// Hold for a derivative limit order: its margin plus the fee on the full
/// notional
pub fn derivative_limit_order_hold(market: &Market, order: &DerivativeLimitOrder) -> Result<Decimal, OrderError> {
    let rate = limit_hold_fee_rate(market, order.order_type.is_post_only());
    order
        .order_info
        .checked_notional()
        .and_then(|notional| notional.checked_mul(rate))
        .and_then(|fee| order.margin.checked_add(fee))
        .ok_or_else(|| hold_overflow(&order.order_info))
}

/// Hold for a derivative market order.
///
/// The fee part is sized at the higher of the best and the worst price:
/// buys never trade above their worst price, sells never above the best bid.
pub fn derivative_market_order_hold(
    info: &OrderInfo,
    margin: Decimal,
    best_price: Decimal,
    fee_rate: Decimal,
) -> Result<Decimal, OrderError> {
    best_price
        .max(info.price)
        .checked_mul(info.quantity)
        .and_then(|notional| notional.checked_mul(positive_part(fee_rate)))
        .and_then(|fee| margin.checked_add(fee))
        .ok_or_else(|| hold_overflow(info))
}

/// Fee rate still held by an order's unfilled remainder
fn remaining_hold_fee_rate(market: &Market, is_transient: bool) -> Decimal {
    if is_transient {
        positive_part(market.taker_fee_rate)
    } else {
        positive_part(market.maker_fee_rate)
    }
}

/// Available balance returned by cancelling a spot limit order.
///
/// Orders still waiting for the block's matching pass release the taker
/// fee they held; resting orders release only the maker fee part.
pub fn spot_cancel_refund(market: &Market, order: &SpotLimitOrder, is_transient: bool) -> Decimal {
    if order.is_buy() {
        let rate = remaining_hold_fee_rate(market, is_transient);
        order.fillable * order.price() * (Decimal::ONE + rate)
    } else {
        order.fillable
    }
}

/// Available balance returned by cancelling a derivative limit order: the
/// unfilled share of its margin plus the fee held for that share
pub fn derivative_cancel_refund(market: &Market, order: &DerivativeLimitOrder, is_transient: bool) -> Decimal {
    let rate = remaining_hold_fee_rate(market, is_transient);
    margin_share(order.margin, order.fillable, order.order_info.quantity) + order.fillable * order.price() * rate
}
