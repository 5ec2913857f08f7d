//! Spot batch execution data

use exchange_types::deposit::{DepositDelta, DepositDeltas};
use exchange_types::ids::{MarketId, SubaccountId};
use exchange_types::market::Market;
use exchange_types::order::{SpotLimitOrder, SpotMarketOrder};
use exchange_types::rewards::TradingRewardPoints;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{base_units, checksum, fee_recipient_subaccount, quote_units, CancelledOrder};
use crate::config::BatchContext;
use crate::events::{
    EventBatchSpotExecution, EventCancelSpotOrder, EventNewSpotOrders, ExchangeEvent, ExecutionType, TradeLog,
};
use crate::expansion::spot::{
    market_order_expansions, resting_limit_expansions, transient_limit_expansions, SpotOrderStateExpansion,
};
use crate::matching::{ClearingResult, LimitMatchingResult, MarketMatchingResult};
use crate::orders::spot_cancel_refund;
use crate::vwap::VwapData;

/// A resting order whose fillable went down in this pass, by a fill or by
/// a cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotLimitOrderDelta {
    /// Order with its fillable already reduced
    pub order: SpotLimitOrder,
    pub fill_quantity: Decimal,
    pub cancel_quantity: Decimal,
}

impl SpotLimitOrderDelta {
    /// Fully filled orders leave the book
    pub fn is_fully_filled(&self) -> bool {
        self.order.is_fully_filled()
    }
}

/// Output of one spot matching pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotBatchExecutionData {
    pub market_id: MarketId,
    pub base_denom: String,
    pub quote_denom: String,
    pub clearing: ClearingResult,
    /// Chain units
    pub base_denom_deposit_deltas: DepositDeltas,
    /// Chain units
    pub quote_denom_deposit_deltas: DepositDeltas,
    pub base_denom_deposit_subaccount_ids: Vec<SubaccountId>,
    pub quote_denom_deposit_subaccount_ids: Vec<SubaccountId>,
    pub limit_order_filled_deltas: Vec<SpotLimitOrderDelta>,
    /// Cancelled resting orders, fillable zeroed
    pub resting_limit_order_cancelled_deltas: Vec<SpotLimitOrderDelta>,
    /// Orders cancelled before their first matching pass, fillable zeroed
    pub transient_limit_order_cancelled_deltas: Vec<SpotLimitOrderDelta>,
    pub cancel_events: Vec<EventCancelSpotOrder>,
    pub market_order_execution_event: Option<EventBatchSpotExecution>,
    pub limit_order_execution_events: Vec<EventBatchSpotExecution>,
    pub new_orders_event: Option<EventNewSpotOrders>,
    pub trading_reward_points: TradingRewardPoints,
    pub vwap_data: VwapData,
}

impl SpotBatchExecutionData {
    fn new(market: &Market, clearing: ClearingResult, deltas: DenomDeltas) -> Self {
        Self {
            market_id: market.market_id.clone(),
            base_denom: market.base_denom.clone(),
            quote_denom: market.quote_denom.clone(),
            clearing,
            base_denom_deposit_subaccount_ids: deltas.base.sorted_subaccount_ids(),
            quote_denom_deposit_subaccount_ids: deltas.quote.sorted_subaccount_ids(),
            base_denom_deposit_deltas: deltas.base,
            quote_denom_deposit_deltas: deltas.quote,
            limit_order_filled_deltas: Vec::new(),
            resting_limit_order_cancelled_deltas: Vec::new(),
            transient_limit_order_cancelled_deltas: Vec::new(),
            cancel_events: Vec::new(),
            market_order_execution_event: None,
            limit_order_execution_events: Vec::new(),
            new_orders_event: None,
            trading_reward_points: TradingRewardPoints::new(),
            vwap_data: VwapData::new().apply_execution(clearing.price, clearing.quantity),
        }
    }

    /// Events in emission order: cancellations, executions, new orders
    pub fn events(&self) -> Vec<ExchangeEvent> {
        let mut events: Vec<ExchangeEvent> = self
            .cancel_events
            .iter()
            .cloned()
            .map(ExchangeEvent::CancelSpotOrder)
            .collect();
        events.extend(
            self.market_order_execution_event
                .iter()
                .chain(self.limit_order_execution_events.iter())
                .cloned()
                .map(ExchangeEvent::BatchSpotExecution),
        );
        if let Some(new_orders) = &self.new_orders_event {
            events.push(ExchangeEvent::NewSpotOrders(new_orders.clone()));
        }
        events
    }

    pub fn trade_count(&self) -> usize {
        self.market_order_execution_event
            .iter()
            .chain(self.limit_order_execution_events.iter())
            .map(|e| e.trades.len())
            .sum()
    }

    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        checksum(self)
    }
}

/// Base and quote accumulators of one pass
#[derive(Debug, Default)]
struct DenomDeltas {
    base: DepositDeltas,
    quote: DepositDeltas,
}

impl DenomDeltas {
    /// Fold one expansion in, converting to chain units
    fn apply(&mut self, market: &Market, expansion: &SpotOrderStateExpansion) {
        let mut base_delta = DepositDelta {
            available_balance_delta: base_units(market, expansion.base_refund_amount),
            total_balance_delta: base_units(market, expansion.base_change_amount),
        };
        let mut quote_delta = DepositDelta {
            available_balance_delta: quote_units(market, expansion.quote_refund_amount),
            total_balance_delta: quote_units(market, expansion.quote_change_amount),
        };

        if expansion.base_change_amount > Decimal::ZERO {
            base_delta.add_available(base_delta.total_balance_delta);
        }
        if expansion.quote_change_amount > Decimal::ZERO {
            quote_delta.add_available(quote_delta.total_balance_delta);
        }

        self.base.apply_deposit_delta(expansion.subaccount_id, base_delta);
        self.quote.apply_deposit_delta(expansion.subaccount_id, quote_delta);

        self.quote.apply_uniform_delta(
            fee_recipient_subaccount(expansion.fee_recipient),
            quote_units(market, expansion.fee_recipient_reward),
        );
        self.quote
            .apply_uniform_delta(SubaccountId::AUCTION, quote_units(market, expansion.auction_fee_reward));
    }

    /// Release what a cancelled order still holds back to available
    fn apply_cancellation(&mut self, market: &Market, cancelled: &CancelledOrder<SpotLimitOrder>) {
        let order = &cancelled.order;
        let refund = spot_cancel_refund(market, order, cancelled.is_transient);
        let (deltas, amount) = if order.is_buy() {
            (&mut self.quote, quote_units(market, refund))
        } else {
            (&mut self.base, base_units(market, refund))
        };
        let mut delta = DepositDelta::default();
        delta.add_available(amount);
        deltas.apply_deposit_delta(order.subaccount_id(), delta);
    }
}

fn trade_log(expansion: &SpotOrderStateExpansion) -> TradeLog {
    TradeLog {
        quantity: expansion.base_change_amount.abs(),
        price: expansion.trade_price,
        subaccount_id: expansion.subaccount_id,
        fee: expansion.realized_trade_fee(),
        order_hash: expansion.order_hash,
        fee_recipient_address: expansion.fee_recipient,
        cid: expansion.cid.clone(),
    }
}

/// Aggregate limit order expansions; orders that did not trade still move
/// balances (refunds) but produce no trade and no fill delta.
fn limit_expansion_events(
    is_buy: bool,
    market: &Market,
    execution_type: ExecutionType,
    expansions: &[SpotOrderStateExpansion],
    deltas: &mut DenomDeltas,
) -> (Option<EventBatchSpotExecution>, Vec<SpotLimitOrderDelta>, TradingRewardPoints) {
    let mut trades = Vec::with_capacity(expansions.len());
    let mut filled_deltas = Vec::with_capacity(expansions.len());
    let mut points = TradingRewardPoints::new();

    for expansion in expansions {
        deltas.apply(market, expansion);

        if expansion.base_change_amount.is_zero() {
            continue;
        }

        if let Some(order) = &expansion.limit_order {
            filled_deltas.push(SpotLimitOrderDelta {
                order: order.clone(),
                fill_quantity: expansion.fill_quantity,
                cancel_quantity: Decimal::ZERO,
            });
        }
        points.add_points(expansion.trader_address, expansion.trading_reward_points);
        trades.push(trade_log(expansion));
    }

    let event = (!trades.is_empty()).then(|| EventBatchSpotExecution {
        market_id: market.market_id.clone(),
        is_buy,
        execution_type,
        trades,
    });
    (event, filled_deltas, points)
}

/// Build the batch for market orders of one direction.
///
/// `market_orders` must be the orders the pass ran with, in the same order.
pub fn market_order_batch(
    ctx: &mut BatchContext<'_>,
    is_market_buy: bool,
    market_orders: &[SpotMarketOrder],
    result: MarketMatchingResult<SpotLimitOrder>,
    taker_fee_rate: Decimal,
) -> SpotBatchExecutionData {
    let market = ctx.market;
    let clearing = result.clearing;

    let limit_expansions = match result.resting_fills {
        Some(fills) => resting_limit_expansions(ctx, fills, !is_market_buy, None),
        None => Vec::new(),
    };
    let market_expansions = market_order_expansions(
        ctx,
        market_orders,
        is_market_buy,
        &result.market_fill_quantities,
        clearing.price,
        taker_fee_rate,
    );

    let mut deltas = DenomDeltas::default();
    let mut market_points = TradingRewardPoints::new();
    let mut market_trades = Vec::with_capacity(market_expansions.len());
    for expansion in &market_expansions {
        deltas.apply(market, expansion);
        if expansion.base_change_amount.is_zero() {
            continue;
        }
        market_trades.push(trade_log(expansion));
        market_points.add_points(expansion.trader_address, expansion.trading_reward_points);
    }

    let (limit_event, filled_deltas, limit_points) =
        limit_expansion_events(!is_market_buy, market, ExecutionType::LimitFill, &limit_expansions, &mut deltas);

    let mut batch = SpotBatchExecutionData::new(market, clearing, deltas);
    batch.market_order_execution_event = (!market_trades.is_empty()).then(|| EventBatchSpotExecution {
        market_id: market.market_id.clone(),
        is_buy: is_market_buy,
        execution_type: ExecutionType::Market,
        trades: market_trades,
    });
    batch.limit_order_execution_events = limit_event.into_iter().collect();
    batch.limit_order_filled_deltas = filled_deltas;
    batch.trading_reward_points = market_points;
    batch.trading_reward_points.merge(&limit_points);

    info!(
        market_id = %market.market_id,
        is_market_buy,
        clearing_price = ?clearing.price,
        clearing_quantity = %clearing.quantity,
        trades = batch.trade_count(),
        "spot market order batch"
    );
    batch
}

/// Build the batch of a limit matching pass
pub fn limit_matching_batch(
    ctx: &mut BatchContext<'_>,
    result: LimitMatchingResult<SpotLimitOrder>,
) -> SpotBatchExecutionData {
    let market = ctx.market;
    let clearing = result.clearing;
    let mut deltas = DenomDeltas::default();
    let mut events = Vec::new();
    let mut filled_deltas = Vec::new();
    let mut points = TradingRewardPoints::new();

    for (fills, is_buy) in [(result.resting_buys, true), (result.resting_sells, false)] {
        let Some(fills) = fills else { continue };
        let expansions = resting_limit_expansions(ctx, fills, is_buy, clearing.price);
        let (event, side_deltas, side_points) =
            limit_expansion_events(is_buy, market, ExecutionType::LimitMatchRestingOrder, &expansions, &mut deltas);
        events.extend(event);
        filled_deltas.extend(side_deltas);
        points.merge(&side_points);
    }

    let mut new_buy_orders = Vec::new();
    let mut new_sell_orders = Vec::new();
    for (fills, is_buy) in [(result.transient_buys, true), (result.transient_sells, false)] {
        let Some(fills) = fills else { continue };
        let (expansions, new_resting) = transient_limit_expansions(ctx, fills, is_buy, clearing.price);
        // new orders carry their remaining fillable in the new orders event instead
        let (event, _, side_points) =
            limit_expansion_events(is_buy, market, ExecutionType::LimitMatchNewOrder, &expansions, &mut deltas);
        events.extend(event);
        points.merge(&side_points);
        if is_buy {
            new_buy_orders = new_resting;
        } else {
            new_sell_orders = new_resting;
        }
    }

    let mut batch = SpotBatchExecutionData::new(market, clearing, deltas);
    batch.limit_order_execution_events = events;
    batch.limit_order_filled_deltas = filled_deltas;
    batch.trading_reward_points = points;
    if !new_buy_orders.is_empty() || !new_sell_orders.is_empty() {
        batch.new_orders_event = Some(EventNewSpotOrders {
            market_id: market.market_id.clone(),
            buy_orders: new_buy_orders,
            sell_orders: new_sell_orders,
        });
    }

    info!(
        market_id = %market.market_id,
        clearing_price = ?clearing.price,
        clearing_quantity = %clearing.quantity,
        trades = batch.trade_count(),
        "spot limit matching batch"
    );
    batch
}

/// Build the batch that cancels limit orders already taken off the book.
///
/// Each order's unfilled remainder releases its hold: orders cancelled
/// before matching release the taker fee part, resting orders the maker
/// part. Nothing trades.
pub fn cancellation_batch(market: &Market, cancelled: &[CancelledOrder<SpotLimitOrder>]) -> SpotBatchExecutionData {
    let mut deltas = DenomDeltas::default();
    let mut resting_deltas = Vec::new();
    let mut transient_deltas = Vec::new();
    let mut cancel_events = Vec::with_capacity(cancelled.len());

    for entry in cancelled {
        deltas.apply_cancellation(market, entry);

        let mut order = entry.order.clone();
        let cancel_quantity = std::mem::take(&mut order.fillable);
        let delta = SpotLimitOrderDelta {
            order,
            fill_quantity: Decimal::ZERO,
            cancel_quantity,
        };
        if entry.is_transient {
            transient_deltas.push(delta);
        } else {
            resting_deltas.push(delta);
        }
        cancel_events.push(EventCancelSpotOrder {
            market_id: market.market_id.clone(),
            order: entry.order.clone(),
        });
    }

    let mut batch = SpotBatchExecutionData::new(market, ClearingResult::none(), deltas);
    batch.resting_limit_order_cancelled_deltas = resting_deltas;
    batch.transient_limit_order_cancelled_deltas = transient_deltas;
    batch.cancel_events = cancel_events;
    batch
}
