//! Spot order state expansions
//!
//! Every order touched by a matching pass is expanded into the balance
//! changes it implies. Nothing here writes to a ledger; the batch
//! aggregator folds expansions into deposit deltas.
//!
//! Sign conventions: "change" amounts settle the trade and move both the
//! available and total balance, "refund" amounts release held funds and move
//! the available balance only.

use exchange_types::fee::TradeFeeData;
use exchange_types::ids::{Address, OrderHash, SubaccountId};
use exchange_types::numeric::positive_part;
use exchange_types::order::{SpotLimitOrder, SpotMarketOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::OrderbookFills;
use crate::config::BatchContext;
use crate::fees::{trade_fee_data, FillFeeInput};

/// Balance outcome of one order in one matching pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotOrderStateExpansion {
    pub base_change_amount: Decimal,
    pub base_refund_amount: Decimal,
    pub quote_change_amount: Decimal,
    pub quote_refund_amount: Decimal,
    pub trade_price: Decimal,
    pub fee_recipient: Address,
    pub fee_recipient_reward: Decimal,
    pub auction_fee_reward: Decimal,
    pub trader_fee_reward: Decimal,
    pub trading_reward_points: Decimal,
    /// Limit order with its fillable already reduced; `None` for market orders
    pub limit_order: Option<SpotLimitOrder>,
    pub fill_quantity: Decimal,
    pub order_price: Decimal,
    pub order_hash: OrderHash,
    pub subaccount_id: SubaccountId,
    pub trader_address: Address,
    pub cid: String,
}

impl SpotOrderStateExpansion {
    fn for_limit_order(order: SpotLimitOrder, fill_quantity: Decimal, fee_data: &TradeFeeData) -> Self {
        Self {
            base_change_amount: Decimal::ZERO,
            base_refund_amount: Decimal::ZERO,
            quote_change_amount: Decimal::ZERO,
            quote_refund_amount: Decimal::ZERO,
            trade_price: Decimal::ZERO,
            fee_recipient: order.order_info.fee_recipient,
            fee_recipient_reward: fee_data.fee_recipient_reward,
            auction_fee_reward: fee_data.auction_fee_reward,
            trader_fee_reward: fee_data.trader_fee,
            trading_reward_points: fee_data.trading_reward_points,
            fill_quantity,
            order_price: order.order_info.price,
            order_hash: order.order_hash,
            subaccount_id: order.order_info.subaccount_id,
            trader_address: order.order_info.trader(),
            cid: order.order_info.cid.clone(),
            limit_order: Some(order),
        }
    }

    /// Fee shown in trade logs: a self-relayed trade does not count the
    /// relayer share it pays to itself
    pub fn realized_trade_fee(&self) -> Decimal {
        if self.is_self_relayed() {
            self.auction_fee_reward
        } else {
            self.fee_recipient_reward + self.auction_fee_reward
        }
    }

    pub fn is_self_relayed(&self) -> bool {
        self.fee_recipient == self.subaccount_id.address()
    }
}

fn fill_fee_input(
    ctx: &BatchContext<'_>,
    subaccount_id: SubaccountId,
    fill_quantity: Decimal,
    execution_price: Option<Decimal>,
    trade_fee_rate: Decimal,
    is_maker: bool,
) -> FillFeeInput {
    FillFeeInput {
        subaccount_id,
        fill_quantity,
        execution_price,
        trade_fee_rate,
        relayer_fee_share_rate: ctx.market.relayer_fee_share_rate,
        points_multiplier: ctx.points_multiplier.for_role(is_maker),
        is_maker,
    }
}

/// Resting buy filled at `fill_price` (its own price or the clearing price).
///
/// The order held quote for `price × (1 + max(maker, 0))`; whatever the fill
/// did not use, from price improvement or a fee discount, is refunded.
pub fn resting_limit_buy_expansion(
    ctx: &mut BatchContext<'_>,
    mut order: SpotLimitOrder,
    fill_quantity: Decimal,
    fill_price: Decimal,
) -> SpotOrderStateExpansion {
    let maker_fee_rate = ctx.market.maker_fee_rate;
    let input = fill_fee_input(ctx, order.subaccount_id(), fill_quantity, Some(fill_price), maker_fee_rate, true);
    let fee_data = trade_fee_data(&mut ctx.fee_discounts, &input);

    let order_notional = fill_quantity * fill_price;
    let order_price = order.price();

    let mut quote_refund = Decimal::ZERO;
    let quote_change = if fee_data.total_trade_fee < Decimal::ZERO {
        quote_refund = fee_data.trader_fee.abs();
        -order_notional + fee_data.trader_fee.abs()
    } else {
        -(order_notional + fee_data.total_trade_fee)
    };

    if fill_price != order_price {
        let price_delta = order_price - fill_price;
        let clearing_refund = fill_quantity * price_delta;
        let matched_fee_refund = positive_part(fee_data.discounted_trade_fee_rate) * fill_quantity * price_delta;
        quote_refund += clearing_refund + matched_fee_refund;
    }

    if fee_data.total_trade_fee > Decimal::ZERO {
        let maker_fee_rate_delta = positive_part(maker_fee_rate) - fee_data.discounted_trade_fee_rate;
        quote_refund += fill_quantity * order_price * maker_fee_rate_delta;
    }

    order.fillable -= fill_quantity;

    let mut expansion = SpotOrderStateExpansion::for_limit_order(order, fill_quantity, &fee_data);
    expansion.base_change_amount = fill_quantity;
    expansion.quote_change_amount = quote_change;
    expansion.quote_refund_amount = quote_refund;
    expansion.trade_price = fill_price;
    expansion
}

/// Limit sell filled at `fill_price`, as maker (resting) or taker (new).
///
/// Sells hold base only, so there is never a quote refund.
pub fn limit_sell_expansion(
    ctx: &mut BatchContext<'_>,
    mut order: SpotLimitOrder,
    is_maker: bool,
    fill_quantity: Decimal,
    fill_price: Decimal,
    trade_fee_rate: Decimal,
) -> SpotOrderStateExpansion {
    let input = fill_fee_input(ctx, order.subaccount_id(), fill_quantity, Some(fill_price), trade_fee_rate, is_maker);
    let fee_data = trade_fee_data(&mut ctx.fee_discounts, &input);

    let order_notional = fill_quantity * fill_price;
    order.fillable -= fill_quantity;

    let mut expansion = SpotOrderStateExpansion::for_limit_order(order, fill_quantity, &fee_data);
    expansion.base_change_amount = -fill_quantity;
    expansion.quote_change_amount = order_notional - fee_data.trader_fee;
    expansion.trade_price = fill_price;
    expansion
}

/// New limit buy after a matching pass.
///
/// The order held quote for `price × quantity × (1 + taker)`. The filled part
/// is charged at the clearing price with the discounted taker rate; the
/// unfilled part keeps a hold of `price × (1 + max(maker, 0))` since it will
/// rest as a maker.
pub fn transient_limit_buy_expansion(
    ctx: &mut BatchContext<'_>,
    mut order: SpotLimitOrder,
    clearing_price: Option<Decimal>,
    fill_quantity: Decimal,
) -> SpotOrderStateExpansion {
    let maker_fee_rate = ctx.market.maker_fee_rate;
    let taker_fee_rate = ctx.market.taker_fee_rate;
    let input = fill_fee_input(ctx, order.subaccount_id(), fill_quantity, clearing_price, taker_fee_rate, false);
    let fee_data = trade_fee_data(&mut ctx.fee_discounts, &input);

    let order_price = order.price();
    let mut order_notional = Decimal::ZERO;
    let mut clearing_refund = Decimal::ZERO;
    let mut matched_fee_refund = Decimal::ZERO;
    if let Some(clearing_price) = clearing_price.filter(|_| !fill_quantity.is_zero()) {
        let price_delta = order_price - clearing_price;
        order_notional = fill_quantity * clearing_price;
        clearing_refund = fill_quantity * price_delta;
        matched_fee_refund = fill_quantity * fee_data.discounted_trade_fee_rate * price_delta;
    }

    let quote_change = -(order_notional + fee_data.total_trade_fee);

    let unfilled_quantity = order.order_info.quantity - fill_quantity;
    let unmatched_fee_refund = unfilled_quantity * order_price * (taker_fee_rate - positive_part(maker_fee_rate));
    let matched_fee_discount_refund = fill_quantity * order_price * (taker_fee_rate - fee_data.discounted_trade_fee_rate);

    order.fillable -= fill_quantity;

    let mut expansion = SpotOrderStateExpansion::for_limit_order(order, fill_quantity, &fee_data);
    expansion.base_change_amount = fill_quantity;
    expansion.quote_change_amount = quote_change;
    expansion.quote_refund_amount = clearing_refund + matched_fee_refund + unmatched_fee_refund + matched_fee_discount_refund;
    expansion.trade_price = clearing_price.unwrap_or_default();
    expansion.trader_fee_reward = Decimal::ZERO;
    expansion
}

/// Market order after a market pass.
///
/// Buys release whatever part of their hold the fill did not use; sells get
/// their unfilled base back. Market orders never rest.
pub fn market_order_expansion(
    ctx: &mut BatchContext<'_>,
    order: &SpotMarketOrder,
    is_market_buy: bool,
    fill_quantity: Decimal,
    clearing_price: Option<Decimal>,
    taker_fee_rate: Decimal,
) -> SpotOrderStateExpansion {
    let input = fill_fee_input(ctx, order.subaccount_id(), fill_quantity, clearing_price, taker_fee_rate, false);
    let fee_data = trade_fee_data(&mut ctx.fee_discounts, &input);

    let mut base_refund = Decimal::ZERO;
    let mut quote_refund = Decimal::ZERO;
    let mut quote_change = Decimal::ZERO;
    let base_change;

    if is_market_buy {
        base_change = fill_quantity;
        if let Some(clearing_price) = clearing_price {
            quote_change = -(fill_quantity * clearing_price + fee_data.total_trade_fee);
        }
        quote_refund = order.balance_hold + quote_change;
    } else {
        base_change = -fill_quantity;
        if let Some(clearing_price) = clearing_price {
            quote_change = fill_quantity * clearing_price - fee_data.total_trade_fee;
        }
        if fill_quantity < order.order_info.quantity {
            base_refund = order.order_info.quantity - fill_quantity;
        }
    }

    SpotOrderStateExpansion {
        base_change_amount: base_change,
        base_refund_amount: base_refund,
        quote_change_amount: quote_change,
        quote_refund_amount: quote_refund,
        trade_price: clearing_price.unwrap_or_default(),
        fee_recipient: order.order_info.fee_recipient,
        fee_recipient_reward: fee_data.fee_recipient_reward,
        auction_fee_reward: fee_data.auction_fee_reward,
        trader_fee_reward: Decimal::ZERO,
        trading_reward_points: fee_data.trading_reward_points,
        limit_order: None,
        fill_quantity,
        order_price: order.order_info.price,
        order_hash: order.order_hash,
        subaccount_id: order.subaccount_id(),
        trader_address: order.order_info.trader(),
        cid: order.order_info.cid.clone(),
    }
}

/// Expand the resting orders of one side. Each fills at `clearing_price`
/// when set, else at its own price, and always pays the maker rate.
pub fn resting_limit_expansions(
    ctx: &mut BatchContext<'_>,
    fills: OrderbookFills<SpotLimitOrder>,
    is_buy: bool,
    clearing_price: Option<Decimal>,
) -> Vec<SpotOrderStateExpansion> {
    let maker_fee_rate = ctx.market.maker_fee_rate;
    fills
        .orders
        .into_iter()
        .zip(fills.fill_quantities)
        .map(|(order, fill_quantity)| {
            let fill_price = clearing_price.unwrap_or_else(|| order.price());
            if is_buy {
                resting_limit_buy_expansion(ctx, order, fill_quantity, fill_price)
            } else {
                limit_sell_expansion(ctx, order, true, fill_quantity, fill_price, maker_fee_rate)
            }
        })
        .collect()
}

/// Expand the new orders of one side; returns the expansions and the orders
/// that keep a fillable remainder and start resting.
pub fn transient_limit_expansions(
    ctx: &mut BatchContext<'_>,
    fills: OrderbookFills<SpotLimitOrder>,
    is_buy: bool,
    clearing_price: Option<Decimal>,
) -> (Vec<SpotOrderStateExpansion>, Vec<SpotLimitOrder>) {
    let taker_fee_rate = ctx.market.taker_fee_rate;
    let mut expansions = Vec::with_capacity(fills.len());
    let mut new_resting_orders = Vec::new();

    for (order, fill_quantity) in fills.orders.into_iter().zip(fills.fill_quantities) {
        let expansion = if is_buy {
            transient_limit_buy_expansion(ctx, order, clearing_price, fill_quantity)
        } else {
            let fill_price = clearing_price.unwrap_or_else(|| order.price());
            limit_sell_expansion(ctx, order, false, fill_quantity, fill_price, taker_fee_rate)
        };

        if let Some(order) = expansion.limit_order.as_ref().filter(|o| o.fillable > Decimal::ZERO) {
            new_resting_orders.push(order.clone());
        }
        expansions.push(expansion);
    }

    (expansions, new_resting_orders)
}

/// Expand every market order of one direction; `fill_quantities` is
/// index-aligned with `orders`.
pub fn market_order_expansions(
    ctx: &mut BatchContext<'_>,
    orders: &[SpotMarketOrder],
    is_market_buy: bool,
    fill_quantities: &[Decimal],
    clearing_price: Option<Decimal>,
    taker_fee_rate: Decimal,
) -> Vec<SpotOrderStateExpansion> {
    orders
        .iter()
        .enumerate()
        .map(|(idx, order)| {
            let fill_quantity = fill_quantities.get(idx).copied().unwrap_or_default();
            market_order_expansion(ctx, order, is_market_buy, fill_quantity, clearing_price, taker_fee_rate)
        })
        .collect()
}
