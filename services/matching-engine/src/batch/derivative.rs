//! Derivative batch execution data

use exchange_types::deposit::{DepositDelta, DepositDeltas};
use exchange_types::ids::{MarketId, SubaccountId};
use exchange_types::market::Market;
use exchange_types::order::{DerivativeLimitOrder, DerivativeMarketOrder};
use exchange_types::rewards::TradingRewardPoints;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{checksum, fee_recipient_subaccount, quote_units, CancelledOrder};
use crate::config::BatchContext;
use crate::events::{
    DerivativeTradeLog, EventBatchDerivativeExecution, EventCancelDerivativeOrder, EventNewDerivativeOrders,
    ExchangeEvent, ExecutionType,
};
use crate::expansion::derivative::{limit_order_expansions, market_order_expansions};
use crate::expansion::{DerivativeOrderStateExpansion, PositionDelta};
use crate::matching::{ClearingResult, LimitMatchingResult, MarketMatchingResult};
use crate::orders::derivative_cancel_refund;
use crate::vwap::VwapData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeLimitOrderDelta {
    pub order: DerivativeLimitOrder,
    pub fill_quantity: Decimal,
    pub cancel_quantity: Decimal,
}

impl DerivativeLimitOrderDelta {
    pub fn is_fully_filled(&self) -> bool {
        self.order.fillable.is_zero()
    }
}

/// Output of one derivative matching pass. Everything settles in quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeBatchExecutionData {
    pub market_id: MarketId,
    pub quote_denom: String,
    pub clearing: ClearingResult,
    /// Chain units
    pub deposit_deltas: DepositDeltas,
    pub deposit_subaccount_ids: Vec<SubaccountId>,
    /// Human units, in fill order
    pub position_deltas: Vec<PositionDelta>,
    pub limit_order_filled_deltas: Vec<DerivativeLimitOrderDelta>,
    pub resting_limit_order_cancelled_deltas: Vec<DerivativeLimitOrderDelta>,
    pub transient_limit_order_cancelled_deltas: Vec<DerivativeLimitOrderDelta>,
    pub cancel_events: Vec<EventCancelDerivativeOrder>,
    pub market_order_execution_event: Option<EventBatchDerivativeExecution>,
    pub limit_order_execution_events: Vec<EventBatchDerivativeExecution>,
    pub new_orders_event: Option<EventNewDerivativeOrders>,
    pub trading_reward_points: TradingRewardPoints,
    pub vwap_data: VwapData,
}

impl DerivativeBatchExecutionData {
    pub fn events(&self) -> Vec<ExchangeEvent> {
        let mut events: Vec<ExchangeEvent> = self
            .cancel_events
            .iter()
            .cloned()
            .map(ExchangeEvent::CancelDerivativeOrder)
            .collect();
        events.extend(
            self.market_order_execution_event
                .iter()
                .chain(self.limit_order_execution_events.iter())
                .cloned()
                .map(ExchangeEvent::BatchDerivativeExecution),
        );
        if let Some(new_orders) = &self.new_orders_event {
            events.push(ExchangeEvent::NewDerivativeOrders(new_orders.clone()));
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

    /// Margin moved from balances into positions
    pub fn total_position_margin(&self) -> Decimal {
        self.position_deltas.iter().map(|p| p.execution_margin).sum()
    }

    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        checksum(self)
    }
}

/// Accumulates one pass
struct Aggregator<'m> {
    market: &'m Market,
    deposit_deltas: DepositDeltas,
    position_deltas: Vec<PositionDelta>,
    filled_deltas: Vec<DerivativeLimitOrderDelta>,
    points: TradingRewardPoints,
}

impl<'m> Aggregator<'m> {
    fn new(market: &'m Market) -> Self {
        Self {
            market,
            deposit_deltas: DepositDeltas::new(),
            position_deltas: Vec::new(),
            filled_deltas: Vec::new(),
            points: TradingRewardPoints::new(),
        }
    }

    /// Fold expansions in and return the trade event for them, if any traded
    fn apply(
        &mut self,
        is_buy: bool,
        execution_type: ExecutionType,
        expansions: &[DerivativeOrderStateExpansion],
        record_fills: bool,
    ) -> Option<EventBatchDerivativeExecution> {
        let market = self.market;
        let mut trades = Vec::with_capacity(expansions.len());

        for expansion in expansions {
            let trader_delta = DepositDelta {
                available_balance_delta: quote_units(market, expansion.deposit_delta.available_balance_delta),
                total_balance_delta: quote_units(market, expansion.deposit_delta.total_balance_delta),
            };
            self.deposit_deltas.apply_deposit_delta(expansion.subaccount_id, trader_delta);
            self.deposit_deltas.apply_uniform_delta(
                fee_recipient_subaccount(expansion.fee_recipient),
                quote_units(market, expansion.fee_recipient_reward),
            );
            self.deposit_deltas
                .apply_uniform_delta(SubaccountId::AUCTION, quote_units(market, expansion.auction_fee_reward));

            let Some(position_delta) = &expansion.position_delta else {
                continue;
            };

            if record_fills {
                if let Some(order) = &expansion.limit_order {
                    self.filled_deltas.push(DerivativeLimitOrderDelta {
                        order: order.clone(),
                        fill_quantity: expansion.fill_quantity,
                        cancel_quantity: Decimal::ZERO,
                    });
                }
            }
            self.points.add_points(expansion.subaccount_id.address(), expansion.trading_reward_points);
            self.position_deltas.push(position_delta.clone());
            trades.push(DerivativeTradeLog {
                subaccount_id: expansion.subaccount_id,
                is_long: expansion.is_buy,
                execution_quantity: expansion.fill_quantity,
                execution_price: expansion.trade_price,
                execution_margin: expansion.margin_charge,
                fee: expansion.realized_trade_fee(),
                order_hash: expansion.order_hash,
                fee_recipient_address: expansion.fee_recipient,
                cid: expansion.cid.clone(),
            });
        }

        (!trades.is_empty()).then(|| EventBatchDerivativeExecution {
            market_id: market.market_id.clone(),
            is_buy,
            execution_type,
            trades,
        })
    }

    fn finish(self, clearing: ClearingResult) -> DerivativeBatchExecutionData {
        DerivativeBatchExecutionData {
            market_id: self.market.market_id.clone(),
            quote_denom: self.market.quote_denom.clone(),
            clearing,
            deposit_subaccount_ids: self.deposit_deltas.sorted_subaccount_ids(),
            deposit_deltas: self.deposit_deltas,
            position_deltas: self.position_deltas,
            limit_order_filled_deltas: self.filled_deltas,
            resting_limit_order_cancelled_deltas: Vec::new(),
            transient_limit_order_cancelled_deltas: Vec::new(),
            cancel_events: Vec::new(),
            market_order_execution_event: None,
            limit_order_execution_events: Vec::new(),
            new_orders_event: None,
            trading_reward_points: self.points,
            vwap_data: VwapData::new().apply_execution(clearing.price, clearing.quantity),
        }
    }
}

pub fn market_order_batch(
    ctx: &mut BatchContext<'_>,
    is_market_buy: bool,
    market_orders: &[DerivativeMarketOrder],
    result: MarketMatchingResult<DerivativeLimitOrder>,
    taker_fee_rate: Decimal,
) -> DerivativeBatchExecutionData {
    let market = ctx.market;
    let clearing = result.clearing;

    let limit_expansions = match result.resting_fills {
        Some(fills) => limit_order_expansions(ctx, fills, true, None).0,
        None => Vec::new(),
    };
    let market_expansions =
        market_order_expansions(ctx, market_orders, &result.market_fill_quantities, clearing.price, taker_fee_rate);

    let mut aggregator = Aggregator::new(market);
    let market_event = aggregator.apply(is_market_buy, ExecutionType::Market, &market_expansions, false);
    let limit_event = aggregator.apply(!is_market_buy, ExecutionType::LimitFill, &limit_expansions, true);

    let mut batch = aggregator.finish(clearing);
    batch.market_order_execution_event = market_event;
    batch.limit_order_execution_events = limit_event.into_iter().collect();

    info!(
        market_id = %market.market_id,
        is_market_buy,
        clearing_price = ?clearing.price,
        clearing_quantity = %clearing.quantity,
        trades = batch.trade_count(),
        "derivative market order batch"
    );
    batch
}

pub fn limit_matching_batch(
    ctx: &mut BatchContext<'_>,
    result: LimitMatchingResult<DerivativeLimitOrder>,
) -> DerivativeBatchExecutionData {
    let market = ctx.market;
    let clearing = result.clearing;
    let mut aggregator = Aggregator::new(market);
    let mut events = Vec::new();

    for (fills, is_buy) in [(result.resting_buys, true), (result.resting_sells, false)] {
        let Some(fills) = fills else { continue };
        let (expansions, _) = limit_order_expansions(ctx, fills, true, clearing.price);
        events.extend(aggregator.apply(is_buy, ExecutionType::LimitMatchRestingOrder, &expansions, true));
    }

    let mut new_buy_orders = Vec::new();
    let mut new_sell_orders = Vec::new();
    for (fills, is_buy) in [(result.transient_buys, true), (result.transient_sells, false)] {
        let Some(fills) = fills else { continue };
        let (expansions, new_resting) = limit_order_expansions(ctx, fills, false, clearing.price);
        events.extend(aggregator.apply(is_buy, ExecutionType::LimitMatchNewOrder, &expansions, false));
        if is_buy {
            new_buy_orders = new_resting;
        } else {
            new_sell_orders = new_resting;
        }
    }

    let mut batch = aggregator.finish(clearing);
    batch.limit_order_execution_events = events;
    if !new_buy_orders.is_empty() || !new_sell_orders.is_empty() {
        batch.new_orders_event = Some(EventNewDerivativeOrders {
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
        "derivative limit matching batch"
    );
    batch
}

/// Build the batch that cancels limit orders already taken off the book.
///
/// Each order releases the unfilled share of its margin plus the fee held
/// for that share, at the taker rate before matching and the maker rate
/// once resting.
pub fn cancellation_batch(
    market: &Market,
    cancelled: &[CancelledOrder<DerivativeLimitOrder>],
) -> DerivativeBatchExecutionData {
    let mut aggregator = Aggregator::new(market);
    let mut resting_deltas = Vec::new();
    let mut transient_deltas = Vec::new();
    let mut cancel_events = Vec::with_capacity(cancelled.len());

    for entry in cancelled {
        let refund = derivative_cancel_refund(market, &entry.order, entry.is_transient);
        let mut release = DepositDelta::default();
        release.add_available(quote_units(market, refund));
        aggregator
            .deposit_deltas
            .apply_deposit_delta(entry.order.order_info.subaccount_id, release);

        let mut order = entry.order.clone();
        let cancel_quantity = std::mem::take(&mut order.fillable);
        let delta = DerivativeLimitOrderDelta {
            order,
            fill_quantity: Decimal::ZERO,
            cancel_quantity,
        };
        if entry.is_transient {
            transient_deltas.push(delta);
        } else {
            resting_deltas.push(delta);
        }
        cancel_events.push(EventCancelDerivativeOrder {
            market_id: market.market_id.clone(),
            order: entry.order.clone(),
        });
    }

    let mut batch = aggregator.finish(ClearingResult::none());
    batch.resting_limit_order_cancelled_deltas = resting_deltas;
    batch.transient_limit_order_cancelled_deltas = transient_deltas;
    batch.cancel_events = cancel_events;
    batch
}
