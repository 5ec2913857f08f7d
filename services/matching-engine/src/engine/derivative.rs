//! Derivative order entry, cancellation and the derivative passes of a block
//!
//! Positions are not kept here: batches report position deltas and only the
//! quote balances are settled.

use std::collections::BTreeSet;

use exchange_types::errors::{ExchangeError, OrderError};
use exchange_types::ids::{MarketId, OrderHash, SubaccountId};
use exchange_types::market::{Market, MarketType};
use exchange_types::order::{DerivativeLimitOrder, DerivativeMarketOrder};
use rust_decimal::Decimal;
use tracing::debug;

use super::{DerivativeOrders, ExchangeEngine, OrderLocation, PassEnv, SubmittedMarketOrder};
use crate::batch::derivative::{cancellation_batch, limit_matching_batch, market_order_batch};
use crate::batch::{CancelledOrder, DerivativeBatchExecutionData};
use crate::config::BatchContext;
use crate::events::{EventNewDerivativeOrders, ExchangeEvent};
use crate::fees::FeeDiscountStakingInfo;
use crate::ledger::BalanceLedger;
use crate::matching::{match_limit_orders, match_market_orders, mid_price_or_best_price};
use crate::orders::{
    derivative_limit_order_hold, derivative_market_order_hold, market_order_fee_rate, validate_derivative_margin, validate_limit_order, validate_market_order, BalanceHold, OrderRequest,
};

impl<L: BalanceLedger> ExchangeEngine<L> {
    fn derivative_book(&self, market_id: &MarketId) -> Result<&DerivativeOrders, ExchangeError> {
        self.derivative_orders
            .get(market_id)
            .ok_or_else(|| ExchangeError::MarketNotFound {
                market_id: market_id.to_string(),
            })
    }

    fn derivative_book_mut(&mut self, market_id: &MarketId) -> Result<&mut DerivativeOrders, ExchangeError> {
        self.derivative_orders
            .get_mut(market_id)
            .ok_or_else(|| ExchangeError::MarketNotFound {
                market_id: market_id.to_string(),
            })
    }

    /// Admit a derivative limit order; holds its margin plus the fee on the
    /// full notional
    pub fn submit_derivative_limit_order(&mut self, request: OrderRequest) -> Result<OrderHash, ExchangeError> {
        self.admit_derivative_limit_order(request)
            .inspect_err(|e| debug!(error = %e, "derivative limit order rejected"))
    }

    fn admit_derivative_limit_order(&mut self, request: OrderRequest) -> Result<OrderHash, ExchangeError> {
        let market = self.active_market(&request.market_id, MarketType::Derivative)?;
        if request.expiration_block != 0 {
            return Err(OrderError::DerivativeOrderExpiration.into());
        }
        let subaccount_id = request.order_info.subaccount_id;
        let (order_hash, nonce) = self.next_order_hash(subaccount_id, &market.market_id);

        let orders = self.derivative_book(&market.market_id)?;
        validate_limit_order(&market, &request, self.block_height, &self.config, orders.top_of_book())?;
        validate_derivative_margin(&market, &request, false)?;
        orders.ensure_cid_free(subaccount_id, &request.order_info.cid)?;

        let order = DerivativeLimitOrder {
            fillable: request.order_info.quantity,
            order_info: request.order_info,
            order_type: request.order_type,
            margin: request.margin,
            trigger_price: None,
            order_hash,
        };
        let hold = BalanceHold::for_side(&market, order.is_buy(), derivative_limit_order_hold(&market, &order)?)?;
        self.ledger.charge(subaccount_id, &hold.denom, hold.amount)?;
        self.commit_nonce(subaccount_id, nonce);

        debug!(
            market_id = %market.market_id,
            order_hash = %order_hash,
            order_type = ?order.order_type,
            price = %order.price(),
            quantity = %order.order_info.quantity,
            margin = %order.margin,
            hold = %hold.amount,
            "derivative limit order admitted"
        );

        let orders = self.derivative_book_mut(&market.market_id)?;
        orders.register_cid(subaccount_id, &order.order_info.cid, order_hash)?;
        if order.order_type.is_post_only() {
            orders.insert_resting(order.clone());
            let (buy_orders, sell_orders) = if order.is_buy() {
                (vec![order], Vec::new())
            } else {
                (Vec::new(), vec![order])
            };
            self.pending_events
                .push(ExchangeEvent::NewDerivativeOrders(EventNewDerivativeOrders {
                    market_id: market.market_id.clone(),
                    buy_orders,
                    sell_orders,
                }));
        } else {
            orders.push_transient(order);
        }
        Ok(order_hash)
    }

    /// Admit a derivative market order; atomic orders execute immediately
    pub fn submit_derivative_market_order(
        &mut self,
        request: OrderRequest,
    ) -> Result<SubmittedMarketOrder<DerivativeBatchExecutionData>, ExchangeError> {
        self.admit_derivative_market_order(request)
            .inspect_err(|e| debug!(error = %e, "derivative market order rejected"))
    }

    fn admit_derivative_market_order(
        &mut self,
        request: OrderRequest,
    ) -> Result<SubmittedMarketOrder<DerivativeBatchExecutionData>, ExchangeError> {
        let market = self.active_market(&request.market_id, MarketType::Derivative)?;
        let subaccount_id = request.order_info.subaccount_id;
        let (order_hash, nonce) = self.next_order_hash(subaccount_id, &market.market_id);

        let orders = self.derivative_book(&market.market_id)?;
        let best_price = validate_market_order(&market, &request, &self.config, orders.top_of_book())?;
        validate_derivative_margin(&market, &request, true)?;
        orders.ensure_cid_free(subaccount_id, &request.order_info.cid)?;

        let fee_rate = market_order_fee_rate(&market, request.order_type, &self.config);
        let margin_hold = derivative_market_order_hold(&request.order_info, request.margin, best_price, fee_rate)?;
        let hold = BalanceHold::for_side(&market, request.order_type.is_buy(), margin_hold)?;
        self.ledger.charge(subaccount_id, &hold.denom, hold.amount)?;
        self.commit_nonce(subaccount_id, nonce);

        let order = DerivativeMarketOrder {
            order_info: request.order_info,
            order_type: request.order_type,
            margin: request.margin,
            margin_hold,
            trigger_price: None,
            order_hash,
        };
        debug!(
            market_id = %market.market_id,
            order_hash = %order_hash,
            order_type = ?order.order_type,
            worst_price = %order.order_info.price,
            quantity = %order.order_info.quantity,
            margin = %order.margin,
            hold = %hold.amount,
            "derivative market order admitted"
        );

        if order.order_type.is_atomic() {
            let batch = self.execute_derivative_atomic(&market, order, fee_rate)?;
            return Ok(SubmittedMarketOrder {
                order_hash,
                execution: Some(batch),
            });
        }

        let orders = self.derivative_book_mut(&market.market_id)?;
        orders.register_cid(subaccount_id, &order.order_info.cid, order_hash)?;
        orders.push_market_order(order);
        Ok(SubmittedMarketOrder {
            order_hash,
            execution: None,
        })
    }

    fn execute_derivative_atomic(
        &mut self,
        market: &Market,
        order: DerivativeMarketOrder,
        fee_rate: Decimal,
    ) -> Result<DerivativeBatchExecutionData, ExchangeError> {
        let env = self.pass_env(market);
        let is_buy = order.is_buy();
        let mut staking = self.fee_discounts.staking_info();
        let orders = self
            .derivative_orders
            .get_mut(&market.market_id)
            .ok_or_else(|| ExchangeError::MarketNotFound {
                market_id: market.market_id.to_string(),
            })?;

        let mut ctx = env.context(market, &mut staking);
        let batch = market_pass(&mut ctx, orders, is_buy, vec![order], fee_rate, &mut self.ledger);
        self.fee_discounts.flush(&staking);
        self.record_execution(&market.market_id, batch.events(), &batch.vwap_data, &batch.trading_reward_points);
        Ok(batch)
    }

    /// Cancel a live derivative limit order of `subaccount_id`; its
    /// unfilled margin share and fee hold return to available balance
    /// through the returned cancellation batch
    pub fn cancel_derivative_order(
        &mut self,
        market_id: &MarketId,
        subaccount_id: SubaccountId,
        order_hash: &OrderHash,
    ) -> Result<DerivativeBatchExecutionData, ExchangeError> {
        let market = self.typed_market(market_id, MarketType::Derivative)?;
        let orders = self.derivative_book_mut(market_id)?;
        let (order, location) = orders
            .remove_limit_order(subaccount_id, order_hash)
            .ok_or_else(|| OrderError::NotFound {
                order_hash: order_hash.to_string(),
            })?;

        let batch = cancellation_batch(
            &market,
            &[CancelledOrder {
                order,
                is_transient: location == OrderLocation::Transient,
            }],
        );
        self.ledger.apply_deposit_deltas(&batch.quote_denom, &batch.deposit_deltas);
        debug!(market_id = %market_id, order_hash = %order_hash, ?location, "derivative order cancelled");
        self.pending_events.extend(batch.events());
        Ok(batch)
    }

    pub fn cancel_derivative_order_by_cid(
        &mut self,
        market_id: &MarketId,
        subaccount_id: SubaccountId,
        cid: &str,
    ) -> Result<DerivativeBatchExecutionData, ExchangeError> {
        let order_hash = self
            .derivative_book(market_id)?
            .order_hash_by_cid(subaccount_id, cid)
            .ok_or_else(|| OrderError::NotFound {
                order_hash: cid.to_string(),
            })?;
        self.cancel_derivative_order(market_id, subaccount_id, &order_hash)
    }
}

pub(super) fn run_passes<L: BalanceLedger>(
    market: &Market,
    orders: &mut DerivativeOrders,
    env: &PassEnv,
    staking: &mut FeeDiscountStakingInfo,
    ledger: &mut L,
) -> Vec<DerivativeBatchExecutionData> {
    let mut batches = Vec::new();
    for is_buy in [true, false] {
        let market_orders = orders.take_market_orders(is_buy);
        if market_orders.is_empty() {
            continue;
        }
        let mut ctx = env.context(market, staking);
        batches.push(market_pass(&mut ctx, orders, is_buy, market_orders, market.taker_fee_rate, ledger));
    }

    if orders.has_transient_orders() {
        let mut ctx = env.context(market, staking);
        batches.push(limit_pass(&mut ctx, orders, ledger));
    }
    batches
}

fn market_pass<L: BalanceLedger>(
    ctx: &mut BatchContext<'_>,
    orders: &mut DerivativeOrders,
    is_buy: bool,
    market_orders: Vec<DerivativeMarketOrder>,
    fee_rate: Decimal,
    ledger: &mut L,
) -> DerivativeBatchExecutionData {
    let market_id = ctx.market.market_id.clone();
    let result = match_market_orders(&market_id, is_buy, orders.side(!is_buy).cursor(), &market_orders);
    let batch = market_order_batch(ctx, is_buy, &market_orders, result, fee_rate);
    for order in &market_orders {
        orders.release_cid(order);
    }
    settle(orders, &batch, ledger);
    batch
}

fn limit_pass<L: BalanceLedger>(
    ctx: &mut BatchContext<'_>,
    orders: &mut DerivativeOrders,
    ledger: &mut L,
) -> DerivativeBatchExecutionData {
    let market_id = ctx.market.market_id.clone();
    let top = orders.top_of_book();
    let mid_price = mid_price_or_best_price(top.best_buy, top.best_sell);
    let (buys, sells) = orders.take_transient();
    let transient: Vec<DerivativeLimitOrder> = buys.iter().chain(&sells).cloned().collect();

    let result = match_limit_orders(
        &market_id,
        orders.side(true).cursor(),
        orders.side(false).cursor(),
        buys,
        sells,
        mid_price,
    );
    let batch = limit_matching_batch(ctx, result);
    settle(orders, &batch, ledger);

    let resting: BTreeSet<OrderHash> = batch
        .new_orders_event
        .iter()
        .flat_map(|e| e.buy_orders.iter().chain(&e.sell_orders))
        .map(|o| o.order_hash)
        .collect();
    for order in transient.iter().filter(|o| !resting.contains(&o.order_hash)) {
        orders.release_cid(order);
    }
    batch
}

fn settle<L: BalanceLedger>(orders: &mut DerivativeOrders, batch: &DerivativeBatchExecutionData, ledger: &mut L) {
    for delta in &batch.limit_order_filled_deltas {
        orders.apply_fill(&delta.order);
    }
    if let Some(new_orders) = &batch.new_orders_event {
        for order in new_orders.buy_orders.iter().chain(&new_orders.sell_orders) {
            orders.insert_resting(order.clone());
        }
    }
    ledger.apply_deposit_deltas(&batch.quote_denom, &batch.deposit_deltas);
}
