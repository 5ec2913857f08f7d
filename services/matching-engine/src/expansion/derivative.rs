//! Derivative order state expansions
//!
//! Derivative markets settle in quote only. A fill moves the pro-rata share
//! of the order's margin into a position and charges the trade fee; the
//! position itself is settled by the caller from the emitted
//! [`PositionDelta`].

use exchange_types::deposit::DepositDelta;
use exchange_types::fee::TradeFeeData;
use exchange_types::ids::{Address, MarketId, OrderHash, SubaccountId};
use exchange_types::numeric::{positive_part, quo};
use exchange_types::order::{DerivativeLimitOrder, DerivativeMarketOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::OrderbookFills;
use crate::config::BatchContext;
use crate::fees::{trade_fee_data, FillFeeInput};

/// Position change implied by one derivative fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub subaccount_id: SubaccountId,
    pub market_id: MarketId,
    pub is_long: bool,
    pub execution_quantity: Decimal,
    pub execution_price: Decimal,
    pub execution_margin: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeOrderStateExpansion {
    pub subaccount_id: SubaccountId,
    /// `None` when the order did not fill
    pub position_delta: Option<PositionDelta>,
    /// Quote balance change of the trader, in human units
    pub deposit_delta: DepositDelta,
    pub trade_price: Decimal,
    pub margin_charge: Decimal,
    pub fee_recipient: Address,
    pub fee_recipient_reward: Decimal,
    pub auction_fee_reward: Decimal,
    pub trader_fee_reward: Decimal,
    pub trading_reward_points: Decimal,
    pub limit_order: Option<DerivativeLimitOrder>,
    pub fill_quantity: Decimal,
    pub is_buy: bool,
    pub order_hash: OrderHash,
    pub cid: String,
}

impl DerivativeOrderStateExpansion {
    pub fn realized_trade_fee(&self) -> Decimal {
        if self.fee_recipient == self.subaccount_id.address() {
            self.auction_fee_reward
        } else {
            self.fee_recipient_reward + self.auction_fee_reward
        }
    }
}

/// Margin attributable to `fill_quantity` of an order
pub(crate) fn margin_share(margin: Decimal, fill_quantity: Decimal, quantity: Decimal) -> Decimal {
    quo(fill_quantity * margin, quantity).unwrap_or_default()
}

struct FillOutcome {
    position_delta: Option<PositionDelta>,
    margin_charge: Decimal,
    fee: TradeFeeData,
}

#[allow(clippy::too_many_arguments)]
fn settle_fill(
    ctx: &mut BatchContext<'_>,
    subaccount_id: SubaccountId,
    is_buy: bool,
    margin: Decimal,
    quantity: Decimal,
    fill_quantity: Decimal,
    execution_price: Option<Decimal>,
    trade_fee_rate: Decimal,
    is_maker: bool,
) -> FillOutcome {
    let input = FillFeeInput {
        subaccount_id,
        fill_quantity,
        execution_price,
        trade_fee_rate,
        relayer_fee_share_rate: ctx.market.relayer_fee_share_rate,
        points_multiplier: ctx.points_multiplier.for_role(is_maker),
        is_maker,
    };
    let fee = trade_fee_data(&mut ctx.fee_discounts, &input);

    let (position_delta, margin_charge) = match execution_price {
        Some(price) if !fill_quantity.is_zero() => {
            let margin_charge = margin_share(margin, fill_quantity, quantity);
            let delta = PositionDelta {
                subaccount_id,
                market_id: ctx.market.market_id.clone(),
                is_long: is_buy,
                execution_quantity: fill_quantity,
                execution_price: price,
                execution_margin: margin_charge,
            };
            (Some(delta), margin_charge)
        }
        _ => (None, Decimal::ZERO),
    };

    FillOutcome {
        position_delta,
        margin_charge,
        fee,
    }
}

/// Limit order after a pass.
///
/// The fee part of the order's hold was sized with `max(maker, 0)` for
/// resting orders and `max(taker, 0)` for new ones. A new order that keeps a
/// remainder re-sizes that remainder's fee hold to the maker rate.
pub fn limit_order_expansion(
    ctx: &mut BatchContext<'_>,
    mut order: DerivativeLimitOrder,
    is_maker: bool,
    fill_quantity: Decimal,
    fill_price: Decimal,
) -> DerivativeOrderStateExpansion {
    let maker_fee_rate = ctx.market.maker_fee_rate;
    let taker_fee_rate = ctx.market.taker_fee_rate;
    let (trade_fee_rate, hold_fee_rate) = if is_maker {
        (maker_fee_rate, positive_part(maker_fee_rate))
    } else {
        (taker_fee_rate, positive_part(taker_fee_rate))
    };
    let price = order.price();

    let outcome = settle_fill(
        ctx,
        order.order_info.subaccount_id,
        order.is_buy(),
        order.margin,
        order.order_info.quantity,
        fill_quantity,
        Some(fill_price),
        trade_fee_rate,
        is_maker,
    );

    let total = -(outcome.margin_charge + outcome.fee.trader_fee);
    let mut available = fill_quantity * price * hold_fee_rate - outcome.fee.trader_fee;
    if !is_maker {
        let unfilled_quantity = order.fillable - fill_quantity;
        available += unfilled_quantity * price * (hold_fee_rate - positive_part(maker_fee_rate));
    }

    order.fillable -= fill_quantity;

    DerivativeOrderStateExpansion {
        subaccount_id: order.order_info.subaccount_id,
        position_delta: outcome.position_delta,
        deposit_delta: DepositDelta {
            available_balance_delta: available,
            total_balance_delta: total,
        },
        trade_price: fill_price,
        margin_charge: outcome.margin_charge,
        fee_recipient: order.order_info.fee_recipient,
        fee_recipient_reward: outcome.fee.fee_recipient_reward,
        auction_fee_reward: outcome.fee.auction_fee_reward,
        trader_fee_reward: if is_maker { outcome.fee.trader_fee } else { Decimal::ZERO },
        trading_reward_points: outcome.fee.trading_reward_points,
        fill_quantity,
        is_buy: order.is_buy(),
        order_hash: order.order_hash,
        cid: order.order_info.cid.clone(),
        limit_order: Some(order),
    }
}

/// Market order after a pass; the entire hold not used by the fill is
/// released.
pub fn market_order_expansion(
    ctx: &mut BatchContext<'_>,
    order: &DerivativeMarketOrder,
    fill_quantity: Decimal,
    clearing_price: Option<Decimal>,
    taker_fee_rate: Decimal,
) -> DerivativeOrderStateExpansion {
    let outcome = settle_fill(
        ctx,
        order.order_info.subaccount_id,
        order.is_buy(),
        order.margin,
        order.order_info.quantity,
        fill_quantity,
        clearing_price,
        taker_fee_rate,
        false,
    );

    let total = -(outcome.margin_charge + outcome.fee.trader_fee);
    DerivativeOrderStateExpansion {
        subaccount_id: order.order_info.subaccount_id,
        position_delta: outcome.position_delta,
        deposit_delta: DepositDelta {
            available_balance_delta: order.margin_hold + total,
            total_balance_delta: total,
        },
        trade_price: clearing_price.unwrap_or_default(),
        margin_charge: outcome.margin_charge,
        fee_recipient: order.order_info.fee_recipient,
        fee_recipient_reward: outcome.fee.fee_recipient_reward,
        auction_fee_reward: outcome.fee.auction_fee_reward,
        trader_fee_reward: Decimal::ZERO,
        trading_reward_points: outcome.fee.trading_reward_points,
        limit_order: None,
        fill_quantity,
        is_buy: order.is_buy(),
        order_hash: order.order_hash,
        cid: order.order_info.cid.clone(),
    }
}

/// Expand one side of limit fills. Each order fills at `clearing_price` when
/// set, else at its own price. New orders with a remainder are returned
/// separately as they start resting.
pub fn limit_order_expansions(
    ctx: &mut BatchContext<'_>,
    fills: OrderbookFills<DerivativeLimitOrder>,
    is_maker: bool,
    clearing_price: Option<Decimal>,
) -> (Vec<DerivativeOrderStateExpansion>, Vec<DerivativeLimitOrder>) {
    let mut expansions = Vec::with_capacity(fills.len());
    let mut new_resting_orders = Vec::new();

    for (order, fill_quantity) in fills.orders.into_iter().zip(fills.fill_quantities) {
        let fill_price = clearing_price.unwrap_or_else(|| order.price());
        let expansion = limit_order_expansion(ctx, order, is_maker, fill_quantity, fill_price);
        if !is_maker {
            if let Some(order) = expansion.limit_order.as_ref().filter(|o| o.fillable > Decimal::ZERO) {
                new_resting_orders.push(order.clone());
            }
        }
        expansions.push(expansion);
    }

    (expansions, new_resting_orders)
}

pub fn market_order_expansions(
    ctx: &mut BatchContext<'_>,
    orders: &[DerivativeMarketOrder],
    fill_quantities: &[Decimal],
    clearing_price: Option<Decimal>,
    taker_fee_rate: Decimal,
) -> Vec<DerivativeOrderStateExpansion> {
    orders
        .iter()
        .enumerate()
        .map(|(idx, order)| {
            let fill_quantity = fill_quantities.get(idx).copied().unwrap_or_default();
            market_order_expansion(ctx, order, fill_quantity, clearing_price, taker_fee_rate)
        })
        .collect()
}
