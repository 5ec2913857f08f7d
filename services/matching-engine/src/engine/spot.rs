//! Spot order entry, cancellation and the spot passes of a block

use std::collections::BTreeSet;

use exchange_types::errors::{ExchangeError, OrderError};
use exchange_types::ids::{MarketId, OrderHash, SubaccountId};
use exchange_types::market::{Market, MarketType};
use exchange_types::order::{SpotLimitOrder, SpotMarketOrder};
use rust_decimal::Decimal;
use tracing::debug;

use super::{ExchangeEngine, OrderLocation, PassEnv, SpotOrders, SubmittedMarketOrder};
use crate::batch::spot::{cancellation_batch, limit_matching_batch, market_order_batch};
use crate::batch::{CancelledOrder, SpotBatchExecutionData};
use crate::config::BatchContext;
use crate::events::{EventNewSpotOrders, ExchangeEvent};
use crate::fees::FeeDiscountStakingInfo;
use crate::ledger::BalanceLedger;
use crate::matching::{match_limit_orders, match_market_orders, mid_price_or_best_price};
use crate::orders::{
    market_order_fee_rate, spot_limit_order_hold, spot_market_order_hold, validate_limit_order, validate_market_order,
    BalanceHold, OrderRequest,
};

impl<L: BalanceLedger> ExchangeEngine<L> {
    fn spot_book(&self, market_id: &MarketId) -> Result<&SpotOrders, ExchangeError> {
        self.spot_orders.get(market_id).ok_or_else(|| ExchangeError::MarketNotFound {
            market_id: market_id.to_string(),
        })
    }

    fn spot_book_mut(&mut self, market_id: &MarketId) -> Result<&mut SpotOrders, ExchangeError> {
        self.spot_orders.get_mut(market_id).ok_or_else(|| ExchangeError::MarketNotFound {
            market_id: market_id.to_string(),
        })
    }

    /// Admit a spot limit order.
    ///
    /// The hold is locked at admission. Post-only orders rest at once; the
    /// others wait for the block's limit matching pass.
    pub fn submit_spot_limit_order(&mut self, request: OrderRequest) -> Result<OrderHash, ExchangeError> {
        self.admit_spot_limit_order(request)
            .inspect_err(|e| debug!(error = %e, "spot limit order rejected"))
    }

    fn admit_spot_limit_order(&mut self, request: OrderRequest) -> Result<OrderHash, ExchangeError> {
        let market = self.active_market(&request.market_id, MarketType::Spot)?;
        let subaccount_id = request.order_info.subaccount_id;
        let (order_hash, nonce) = self.next_order_hash(subaccount_id, &market.market_id);

        let orders = self.spot_book(&market.market_id)?;
        validate_limit_order(&market, &request, self.block_height, &self.config, orders.top_of_book())?;
        orders.ensure_cid_free(subaccount_id, &request.order_info.cid)?;

        let mut order = SpotLimitOrder::new(request.order_info, request.order_type, order_hash);
        order.expiration_block = request.expiration_block;
        let hold = BalanceHold::for_side(&market, order.is_buy(), spot_limit_order_hold(&market, &order)?)?;
        self.ledger.charge(subaccount_id, &hold.denom, hold.amount)?;
        self.commit_nonce(subaccount_id, nonce);

        debug!(
            market_id = %market.market_id,
            order_hash = %order_hash,
            order_type = ?order.order_type,
            price = %order.price(),
            quantity = %order.order_info.quantity,
            hold = %hold.amount,
            "spot limit order admitted"
        );

        let orders = self.spot_book_mut(&market.market_id)?;
        orders.register_cid(subaccount_id, &order.order_info.cid, order_hash)?;
        if order.order_type.is_post_only() {
            orders.insert_resting(order.clone());
            let (buy_orders, sell_orders) = if order.is_buy() {
                (vec![order], Vec::new())
            } else {
                (Vec::new(), vec![order])
            };
            self.pending_events.push(ExchangeEvent::NewSpotOrders(EventNewSpotOrders {
                market_id: market.market_id.clone(),
                buy_orders,
                sell_orders,
            }));
        } else {
            orders.push_transient(order);
        }
        Ok(order_hash)
    }

    /// Admit a spot market order.
    ///
    /// Regular market orders queue for the block's market pass. Atomic
    /// orders execute immediately against the resting book at the atomic
    /// fee rate and return their batch.
    pub fn submit_spot_market_order(
        &mut self,
        request: OrderRequest,
    ) -> Result<SubmittedMarketOrder<SpotBatchExecutionData>, ExchangeError> {
        self.admit_spot_market_order(request)
            .inspect_err(|e| debug!(error = %e, "spot market order rejected"))
    }

    fn admit_spot_market_order(
        &mut self,
        request: OrderRequest,
    ) -> Result<SubmittedMarketOrder<SpotBatchExecutionData>, ExchangeError> {
        let market = self.active_market(&request.market_id, MarketType::Spot)?;
        let subaccount_id = request.order_info.subaccount_id;
        let (order_hash, nonce) = self.next_order_hash(subaccount_id, &market.market_id);

        let orders = self.spot_book(&market.market_id)?;
        let best_price = validate_market_order(&market, &request, &self.config, orders.top_of_book())?;
        orders.ensure_cid_free(subaccount_id, &request.order_info.cid)?;

        let is_buy = request.order_type.is_buy();
        let fee_rate = market_order_fee_rate(&market, request.order_type, &self.config);
        let balance_hold = spot_market_order_hold(&request.order_info, is_buy, best_price, fee_rate)?;
        let hold = BalanceHold::for_side(&market, is_buy, balance_hold)?;
        self.ledger.charge(subaccount_id, &hold.denom, hold.amount)?;
        self.commit_nonce(subaccount_id, nonce);

        let order = SpotMarketOrder {
            order_info: request.order_info,
            order_type: request.order_type,
            balance_hold,
            order_hash,
        };
        debug!(
            market_id = %market.market_id,
            order_hash = %order_hash,
            order_type = ?order.order_type,
            worst_price = %order.order_info.price,
            quantity = %order.order_info.quantity,
            hold = %hold.amount,
            "spot market order admitted"
        );

        if order.order_type.is_atomic() {
            let batch = self.execute_spot_atomic(&market, order, fee_rate)?;
            return Ok(SubmittedMarketOrder {
                order_hash,
                execution: Some(batch),
            });
        }

        let orders = self.spot_book_mut(&market.market_id)?;
        orders.register_cid(subaccount_id, &order.order_info.cid, order_hash)?;
        orders.push_market_order(order);
        Ok(SubmittedMarketOrder {
            order_hash,
            execution: None,
        })
    }

    fn execute_spot_atomic(
        &mut self,
        market: &Market,
        order: SpotMarketOrder,
        fee_rate: Decimal,
    ) -> Result<SpotBatchExecutionData, ExchangeError> {
        let env = self.pass_env(market);
        let is_buy = order.is_buy();
        let mut staking = self.fee_discounts.staking_info();
        let orders = self
            .spot_orders
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

    /// Cancel a live spot limit order of `subaccount_id` and release what
    /// its unfilled remainder still holds.
    ///
    /// The refund settles at once through a cancellation batch, which is
    /// returned.
    pub fn cancel_spot_order(
        &mut self,
        market_id: &MarketId,
        subaccount_id: SubaccountId,
        order_hash: &OrderHash,
    ) -> Result<SpotBatchExecutionData, ExchangeError> {
        let market = self.typed_market(market_id, MarketType::Spot)?;
        let orders = self.spot_book_mut(market_id)?;
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
        settle_deposits(&batch, &mut self.ledger);
        debug!(market_id = %market_id, order_hash = %order_hash, ?location, "spot order cancelled");
        self.pending_events.extend(batch.events());
        Ok(batch)
    }

    pub fn cancel_spot_order_by_cid(
        &mut self,
        market_id: &MarketId,
        subaccount_id: SubaccountId,
        cid: &str,
    ) -> Result<SpotBatchExecutionData, ExchangeError> {
        let order_hash = self
            .spot_book(market_id)?
            .order_hash_by_cid(subaccount_id, cid)
            .ok_or_else(|| OrderError::NotFound {
                order_hash: cid.to_string(),
            })?;
        self.cancel_spot_order(market_id, subaccount_id, &order_hash)
    }
}

/// Cancel resting orders whose expiration block has been reached; `None`
/// when nothing expired
pub(super) fn cancel_expired_orders<L: BalanceLedger>(
    market: &Market,
    orders: &mut SpotOrders,
    block_height: i64,
    ledger: &mut L,
) -> Option<SpotBatchExecutionData> {
    let expired = orders.resting_orders_where(|o| o.expiration_block != 0 && o.expiration_block <= block_height);
    let mut cancelled = Vec::with_capacity(expired.len());
    for order in expired {
        let Some((order, location)) = orders.remove_limit_order(order.subaccount_id(), &order.order_hash) else {
            continue;
        };
        debug!(
            market_id = %market.market_id,
            order_hash = %order.order_hash,
            expiration_block = order.expiration_block,
            "expired spot order cancelled"
        );
        cancelled.push(CancelledOrder {
            order,
            is_transient: location == OrderLocation::Transient,
        });
    }
    if cancelled.is_empty() {
        return None;
    }

    let batch = cancellation_batch(market, &cancelled);
    settle_deposits(&batch, ledger);
    Some(batch)
}

/// Market buys, then market sells, then the limit pass; directions without
/// orders are skipped
pub(super) fn run_passes<L: BalanceLedger>(
    market: &Market,
    orders: &mut SpotOrders,
    env: &PassEnv,
    staking: &mut FeeDiscountStakingInfo,
    ledger: &mut L,
) -> Vec<SpotBatchExecutionData> {
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
    orders: &mut SpotOrders,
    is_buy: bool,
    market_orders: Vec<SpotMarketOrder>,
    fee_rate: Decimal,
    ledger: &mut L,
) -> SpotBatchExecutionData {
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
    orders: &mut SpotOrders,
    ledger: &mut L,
) -> SpotBatchExecutionData {
    let market_id = ctx.market.market_id.clone();
    let top = orders.top_of_book();
    let mid_price = mid_price_or_best_price(top.best_buy, top.best_sell);
    let (buys, sells) = orders.take_transient();
    let transient: Vec<SpotLimitOrder> = buys.iter().chain(&sells).cloned().collect();

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

/// Write a batch back into the books and the ledger
fn settle<L: BalanceLedger>(orders: &mut SpotOrders, batch: &SpotBatchExecutionData, ledger: &mut L) {
    for delta in &batch.limit_order_filled_deltas {
        orders.apply_fill(&delta.order);
    }
    if let Some(new_orders) = &batch.new_orders_event {
        for order in new_orders.buy_orders.iter().chain(&new_orders.sell_orders) {
            orders.insert_resting(order.clone());
        }
    }
    settle_deposits(batch, ledger);
}

fn settle_deposits<L: BalanceLedger>(batch: &SpotBatchExecutionData, ledger: &mut L) {
    ledger.apply_deposit_deltas(&batch.base_denom, &batch.base_denom_deposit_deltas);
    ledger.apply_deposit_deltas(&batch.quote_denom, &batch.quote_denom_deposit_deltas);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine, request, time, trader};
    use super::*;
    use exchange_types::errors::LedgerError;
    use exchange_types::numeric::dec;
    use exchange_types::order::OrderType;

    const SPOT: &str = "INJ/USDT";

    fn spot() -> MarketId {
        MarketId::new(SPOT)
    }

    #[test]
    fn test_limit_order_hold_and_transient_cancel() {
        let mut engine = engine();
        let hash = engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::Buy, "100", "10"))
            .unwrap();
        assert_eq!(engine.ledger().available_balance(&trader(1), "usdt"), dec("998998"));
        assert_eq!(engine.ledger().total_balance(&trader(1), "usdt"), dec("1000000"));
        assert!(engine.spot_order(&spot(), &hash).is_none());

        let cancelled = engine.cancel_spot_order(&spot(), trader(1), &hash).unwrap();
        let delta = &cancelled.transient_limit_order_cancelled_deltas[0];
        assert_eq!(delta.order.order_hash, hash);
        assert_eq!(delta.cancel_quantity, dec("10"));
        assert!(delta.order.fillable.is_zero());
        assert!(cancelled.resting_limit_order_cancelled_deltas.is_empty());
        assert_eq!(
            cancelled.quote_denom_deposit_deltas.get(&trader(1)).unwrap().available_balance_delta,
            dec("1002")
        );
        assert_eq!(engine.ledger().available_balance(&trader(1), "usdt"), dec("1000000"));

        let output = engine.end_block();
        assert!(output.spot_batches.is_empty());
        assert!(matches!(output.events.as_slice(), [ExchangeEvent::CancelSpotOrder(_)]));
    }

    #[test]
    fn test_post_only_rests_at_once() {
        let mut engine = engine();
        let hash = engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::BuyPostOnly, "100", "10"))
            .unwrap();
        assert_eq!(engine.ledger().available_balance(&trader(1), "usdt"), dec("998999"));
        assert_eq!(engine.spot_order(&spot(), &hash).unwrap().fillable, dec("10"));
        assert_eq!(engine.top_of_book(&spot()).unwrap().best_buy, Some(dec("100")));

        // crossing the resting bid
        assert_eq!(
            engine.submit_spot_limit_order(request(SPOT, 2, OrderType::SellPostOnly, "100", "1")),
            Err(ExchangeError::Order(OrderError::ExceedsTopOfBookPrice))
        );

        engine.cancel_spot_order(&spot(), trader(1), &hash).unwrap();
        assert_eq!(engine.ledger().available_balance(&trader(1), "usdt"), dec("1000000"));
    }

    #[test]
    fn test_cancel_requires_owner() {
        let mut engine = engine();
        let hash = engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::SellPostOnly, "100", "1"))
            .unwrap();
        assert!(matches!(
            engine.cancel_spot_order(&spot(), trader(2), &hash),
            Err(ExchangeError::Order(OrderError::NotFound { .. }))
        ));
        assert!(engine.spot_order(&spot(), &hash).is_some());
    }

    #[test]
    fn test_rejected_order_leaves_no_trace() {
        let mut engine = engine();
        let result = engine.submit_spot_limit_order(request(SPOT, 1, OrderType::Buy, "1000000", "10"));
        assert!(matches!(result, Err(ExchangeError::Ledger(LedgerError::InsufficientFunds { .. }))));
        assert_eq!(engine.ledger().available_balance(&trader(1), "usdt"), dec("1000000"));

        // the nonce was not consumed
        let hash = engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::Buy, "100", "1"))
            .unwrap();
        assert_eq!(hash, OrderHash::compute(&trader(1), 1, &spot()));
    }

    #[test]
    fn test_duplicate_cid_rejected() {
        let mut engine = engine();
        let mut first = request(SPOT, 1, OrderType::Buy, "100", "1");
        first.order_info.cid = "a".to_string();
        let hash = engine.submit_spot_limit_order(first.clone()).unwrap();

        assert_eq!(
            engine.submit_spot_limit_order(first.clone()),
            Err(ExchangeError::Order(OrderError::DuplicateCid { cid: "a".to_string() }))
        );
        assert_eq!(engine.ledger().available_balance(&trader(1), "usdt"), dec("999899.8"));
        assert_eq!(engine.order_hash_by_cid(&spot(), trader(1), "a"), Some(hash));

        engine.cancel_spot_order_by_cid(&spot(), trader(1), "a").unwrap();
        assert!(engine.submit_spot_limit_order(first).is_ok());
    }

    #[test]
    fn test_expired_orders_cancelled_at_end_block() {
        let mut engine = engine();
        let mut stale = request(SPOT, 1, OrderType::Buy, "100", "1");
        stale.expiration_block = 1;
        assert_eq!(
            engine.submit_spot_limit_order(stale),
            Err(ExchangeError::Order(OrderError::InvalidExpirationBlock {
                expiration_block: 1,
                block_height: 1,
            }))
        );

        let mut expiring = request(SPOT, 1, OrderType::SellPostOnly, "100", "10");
        expiring.expiration_block = 3;
        let hash = engine.submit_spot_limit_order(expiring).unwrap();
        assert_eq!(engine.ledger().available_balance(&trader(1), "inj"), dec("999990"));
        engine.end_block();

        engine.begin_block(2, time(1));
        engine.end_block();
        assert!(engine.spot_order(&spot(), &hash).is_some());

        engine.begin_block(3, time(2));
        let output = engine.end_block();
        assert!(engine.spot_order(&spot(), &hash).is_none());
        assert_eq!(engine.ledger().available_balance(&trader(1), "inj"), dec("1000000"));
        assert!(matches!(
            output.events.as_slice(),
            [ExchangeEvent::CancelSpotOrder(e)] if e.order.order_hash == hash
        ));

        // the sweep settles as a batch of its own
        let [sweep] = output.spot_batches.as_slice() else {
            panic!("expected one cancellation batch, got {}", output.spot_batches.len());
        };
        assert_eq!(sweep.trade_count(), 0);
        let delta = &sweep.resting_limit_order_cancelled_deltas[0];
        assert_eq!(delta.order.order_hash, hash);
        assert_eq!(delta.cancel_quantity, dec("10"));
        assert!(delta.order.fillable.is_zero());
        assert_eq!(
            sweep.base_denom_deposit_deltas.get(&trader(1)).unwrap().available_balance_delta,
            dec("10")
        );
    }

    #[test]
    fn test_market_order_executes_at_end_block() {
        let mut engine = engine();
        let resting = engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::SellPostOnly, "100", "10"))
            .unwrap();
        let submitted = engine
            .submit_spot_market_order(request(SPOT, 2, OrderType::Buy, "105", "4"))
            .unwrap();
        assert!(submitted.execution.is_none());
        assert_eq!(engine.ledger().available_balance(&trader(2), "usdt"), dec("999579.16"));

        let output = engine.end_block();
        assert_eq!(output.spot_batches.len(), 1);
        assert_eq!(output.spot_batches[0].clearing.price, Some(dec("100")));

        let ledger = engine.ledger();
        assert_eq!(ledger.available_balance(&trader(2), "usdt"), dec("999599.2"));
        assert_eq!(ledger.total_balance(&trader(2), "usdt"), dec("999599.2"));
        assert_eq!(ledger.total_balance(&trader(2), "inj"), dec("1000004"));
        assert_eq!(ledger.total_balance(&trader(1), "usdt"), dec("1000399.6"));
        assert_eq!(engine.spot_order(&spot(), &resting).unwrap().fillable, dec("6"));
    }

    #[test]
    fn test_atomic_order_executes_immediately() {
        let mut engine = engine();
        let resting = engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::SellPostOnly, "100", "10"))
            .unwrap();
        let submitted = engine
            .submit_spot_market_order(request(SPOT, 2, OrderType::BuyAtomic, "100", "4"))
            .unwrap();

        let batch = submitted.execution.unwrap();
        assert_eq!(batch.trade_count(), 2);
        // taker fee at 2.5x: 400 * 0.005
        assert_eq!(engine.ledger().total_balance(&trader(2), "usdt"), dec("999598"));
        assert_eq!(engine.ledger().available_balance(&trader(2), "usdt"), dec("999598"));
        assert_eq!(engine.spot_order(&spot(), &resting).unwrap().fillable, dec("6"));

        let output = engine.end_block();
        assert!(output.spot_batches.is_empty());
        assert_eq!(output.vwap_info.get(&spot()).unwrap().price, dec("100"));
        assert!(output
            .events
            .iter()
            .any(|e| matches!(e, ExchangeEvent::BatchSpotExecution(_))));
    }

    #[test]
    fn test_market_order_without_liquidity_rejected() {
        let mut engine = engine();
        assert_eq!(
            engine.submit_spot_market_order(request(SPOT, 2, OrderType::Buy, "105", "4")),
            Err(ExchangeError::Order(OrderError::NoLiquidity))
        );
        assert_eq!(engine.ledger().available_balance(&trader(2), "usdt"), dec("1000000"));
    }

    #[test]
    fn test_partially_filled_order_rests_with_maker_hold() {
        let mut engine = engine();
        engine
            .submit_spot_limit_order(request(SPOT, 1, OrderType::SellPostOnly, "100", "4"))
            .unwrap();
        let hash = engine
            .submit_spot_limit_order(request(SPOT, 2, OrderType::Buy, "100", "10"))
            .unwrap();
        engine.end_block();

        let ledger = engine.ledger();
        assert_eq!(ledger.total_balance(&trader(2), "usdt"), dec("999599.2"));
        // 6 * 100 * 1.001 stays locked
        assert_eq!(ledger.available_balance(&trader(2), "usdt"), dec("998998.6"));
        assert_eq!(engine.spot_order(&spot(), &hash).unwrap().fillable, dec("6"));

        engine.cancel_spot_order(&spot(), trader(2), &hash).unwrap();
        assert_eq!(engine.ledger().available_balance(&trader(2), "usdt"), dec("999599.2"));
    }
}
