//! Exchange engine
//!
//! Block coordinator over the matching core. Orders are admitted during a
//! block (validated, funds held, queued); `end_block` runs every market's
//! matching passes in ascending market id and settles the batches against
//! the ledger.
//!
//! Per market and block the passes run in a fixed order:
//! 1. expired spot orders are cancelled
//! 2. market buys against resting sells, then market sells against resting buys
//! 3. one limit matching pass over the resting book and the transient orders

mod derivative;
mod spot;
pub mod state;

pub use state::{MarketOrders, OrderLocation, OrderbookSnapshot};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use exchange_types::errors::ExchangeError;
use exchange_types::fee::{FeeDiscountSchedule, PointsMultiplier};
use exchange_types::ids::{Address, MarketId, OrderHash, SubaccountId};
use exchange_types::market::{Market, MarketStatus, MarketType};
use exchange_types::order::{DerivativeLimitOrder, DerivativeMarketOrder, OrderKind, SpotLimitOrder, SpotMarketOrder};
use exchange_types::rewards::TradingRewardPoints;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::{checksum, DerivativeBatchExecutionData, SpotBatchExecutionData};
use crate::config::{BatchContext, EngineConfig};
use crate::events::ExchangeEvent;
use crate::fees::{FeeDiscountConfig, FeeDiscountStakingInfo, FeeDiscountState};
use crate::ledger::{BalanceLedger, InMemoryLedger};
use crate::orders::TopOfBook;
use crate::volatility::{MarketVolatility, TradeHistoryOptions, TradeRecords};
use crate::vwap::{VwapData, VwapInfo};

pub type SpotOrders = MarketOrders<SpotLimitOrder, SpotMarketOrder>;
pub type DerivativeOrders = MarketOrders<DerivativeLimitOrder, DerivativeMarketOrder>;

/// A market order after admission. Atomic orders carry their execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedMarketOrder<B> {
    pub order_hash: OrderHash,
    pub execution: Option<B>,
}

/// Everything `end_block` produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockOutput {
    pub block_height: i64,
    pub spot_batches: Vec<SpotBatchExecutionData>,
    pub derivative_batches: Vec<DerivativeBatchExecutionData>,
    /// Admission, cancellation and atomic execution events of the block,
    /// then the batch events in execution order
    pub events: Vec<ExchangeEvent>,
    pub vwap_info: VwapInfo,
    pub trading_reward_points: TradingRewardPoints,
}

impl BlockOutput {
    pub fn trade_count(&self) -> usize {
        self.spot_batches.iter().map(SpotBatchExecutionData::trade_count).sum::<usize>()
            + self
                .derivative_batches
                .iter()
                .map(DerivativeBatchExecutionData::trade_count)
                .sum::<usize>()
    }

    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        checksum(self)
    }
}

/// Block-scoped inputs of one market's passes
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassEnv {
    pub block_height: i64,
    pub block_time: DateTime<Utc>,
    pub is_market_qualified: bool,
    pub points_multiplier: PointsMultiplier,
}

impl PassEnv {
    pub(crate) fn context<'a>(&self, market: &'a Market, staking: &'a mut FeeDiscountStakingInfo) -> BatchContext<'a> {
        let fee_discounts = FeeDiscountConfig::new(market.market_id.clone(), self.is_market_qualified, staking);
        BatchContext::new(self.block_height, self.block_time, market, self.points_multiplier, fee_discounts)
    }
}

/// In-memory exchange over a pluggable balance ledger
#[derive(Debug)]
pub struct ExchangeEngine<L: BalanceLedger = InMemoryLedger> {
    config: EngineConfig,
    markets: BTreeMap<MarketId, Market>,
    spot_orders: BTreeMap<MarketId, SpotOrders>,
    derivative_orders: BTreeMap<MarketId, DerivativeOrders>,
    points_multipliers: BTreeMap<MarketId, PointsMultiplier>,
    fee_discounts: FeeDiscountState,
    trade_nonces: BTreeMap<SubaccountId, u64>,
    trade_records: TradeRecords,
    /// Executions of the current block, atomic ones included
    vwap_info: VwapInfo,
    trading_reward_points: TradingRewardPoints,
    pending_events: Vec<ExchangeEvent>,
    ledger: L,
    block_height: i64,
    block_time: DateTime<Utc>,
}

impl ExchangeEngine<InMemoryLedger> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_ledger(config, InMemoryLedger::new())
    }
}

impl<L: BalanceLedger> ExchangeEngine<L> {
    pub fn with_ledger(config: EngineConfig, ledger: L) -> Self {
        Self {
            config,
            markets: BTreeMap::new(),
            spot_orders: BTreeMap::new(),
            derivative_orders: BTreeMap::new(),
            points_multipliers: BTreeMap::new(),
            fee_discounts: FeeDiscountState::new(),
            trade_nonces: BTreeMap::new(),
            trade_records: TradeRecords::new(),
            vwap_info: VwapInfo::new(),
            trading_reward_points: TradingRewardPoints::new(),
            pending_events: Vec::new(),
            ledger,
            block_height: 0,
            block_time: DateTime::<Utc>::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn block_height(&self) -> i64 {
        self.block_height
    }

    // ── Markets ─────────────────────────────────────────────────────────

    /// Launch a market after validating its fees against the current
    /// discount schedule
    pub fn add_market(&mut self, market: Market) -> Result<(), ExchangeError> {
        if self.markets.contains_key(&market.market_id) {
            return Err(ExchangeError::MarketExists {
                market_id: market.market_id.to_string(),
            });
        }
        market.validate_decimals()?;
        self.validate_market_fees(&market)?;

        info!(market_id = %market.market_id, market_type = ?market.market_type, "market launched");
        match market.market_type {
            MarketType::Spot => {
                self.spot_orders.insert(market.market_id.clone(), SpotOrders::new());
            }
            MarketType::Derivative => {
                self.derivative_orders
                    .insert(market.market_id.clone(), DerivativeOrders::new());
            }
        }
        self.markets.insert(market.market_id.clone(), market);
        Ok(())
    }

    /// Replace the parameters of an existing market; its orders stay
    pub fn update_market(&mut self, market: Market) -> Result<(), ExchangeError> {
        let existing = self.market(&market.market_id)?;
        if existing.market_type != market.market_type {
            return Err(ExchangeError::MarketTypeMismatch {
                market_id: market.market_id.to_string(),
                expected: format!("{:?}", existing.market_type),
            });
        }
        market.validate_decimals()?;
        self.validate_market_fees(&market)?;
        info!(market_id = %market.market_id, status = ?market.status, "market updated");
        self.markets.insert(market.market_id.clone(), market);
        Ok(())
    }

    pub fn set_market_status(&mut self, market_id: &MarketId, status: MarketStatus) -> Result<(), ExchangeError> {
        let market = self
            .markets
            .get_mut(market_id)
            .ok_or_else(|| ExchangeError::MarketNotFound {
                market_id: market_id.to_string(),
            })?;
        market.status = status;
        info!(market_id = %market_id, ?status, "market status changed");
        Ok(())
    }

    pub fn market(&self, market_id: &MarketId) -> Result<&Market, ExchangeError> {
        self.markets.get(market_id).ok_or_else(|| ExchangeError::MarketNotFound {
            market_id: market_id.to_string(),
        })
    }

    fn typed_market(&self, market_id: &MarketId, market_type: MarketType) -> Result<Market, ExchangeError> {
        let market = self.market(market_id)?;
        if market.market_type != market_type {
            return Err(ExchangeError::MarketTypeMismatch {
                market_id: market_id.to_string(),
                expected: format!("{market_type:?}"),
            });
        }
        Ok(market.clone())
    }

    /// Market that accepts orders of `market_type`
    fn active_market(&self, market_id: &MarketId, market_type: MarketType) -> Result<Market, ExchangeError> {
        let market = self.typed_market(market_id, market_type)?;
        if !market.is_active() {
            return Err(ExchangeError::MarketNotActive {
                market_id: market_id.to_string(),
            });
        }
        Ok(market)
    }

    fn validate_market_fees(&self, market: &Market) -> Result<(), ExchangeError> {
        let schedule = self
            .fee_discounts
            .schedule()
            .filter(|s| schedule_covers(s, market));
        market.validate_fees(self.config.minimal_protocol_fee_rate, schedule)?;
        Ok(())
    }

    pub fn set_points_multiplier(&mut self, market_id: &MarketId, multiplier: PointsMultiplier) -> Result<(), ExchangeError> {
        self.market(market_id)?;
        self.points_multipliers.insert(market_id.clone(), multiplier);
        Ok(())
    }

    fn points_multiplier(&self, market_id: &MarketId) -> PointsMultiplier {
        self.points_multipliers
            .get(market_id)
            .copied()
            .unwrap_or(self.config.default_points_multiplier)
    }

    fn pass_env(&self, market: &Market) -> PassEnv {
        PassEnv {
            block_height: self.block_height,
            block_time: self.block_time,
            is_market_qualified: self.fee_discounts.is_market_qualified(market),
            points_multiplier: self.points_multiplier(&market.market_id),
        }
    }

    // ── Fee discounts ───────────────────────────────────────────────────

    /// Install a discount schedule. Every market it covers must still
    /// satisfy the minimal protocol fee at the schedule's deepest discount.
    pub fn set_fee_discount_schedule(&mut self, schedule: FeeDiscountSchedule) -> Result<(), ExchangeError> {
        schedule.validate()?;
        for market in self.markets.values().filter(|m| schedule_covers(&schedule, m)) {
            market.validate_fees(self.config.minimal_protocol_fee_rate, Some(&schedule))?;
        }
        self.fee_discounts.set_schedule(schedule, self.block_time.timestamp())?;
        Ok(())
    }

    pub fn set_staked_amount(&mut self, account: Address, amount: Decimal) {
        self.fee_discounts.set_staked_amount(account, amount);
    }

    pub fn set_net_granted_stake(&mut self, account: Address, amount: Decimal) {
        self.fee_discounts.set_net_granted_stake(account, amount);
    }

    pub fn fee_discount_state(&self) -> &FeeDiscountState {
        &self.fee_discounts
    }

    // ── Block lifecycle ─────────────────────────────────────────────────

    /// Open a block: roll fee discount buckets and prune old trade records
    pub fn begin_block(&mut self, block_height: i64, block_time: DateTime<Utc>) {
        self.block_height = block_height;
        self.block_time = block_time;
        let timestamp = block_time.timestamp();
        self.fee_discounts.process_buckets(timestamp);
        self.trade_records.cleanup(timestamp, self.config.trade_record_max_age);
        debug!(block_height, timestamp, "block opened");
    }

    /// Run every market's matching passes and settle them
    pub fn end_block(&mut self) -> BlockOutput {
        let mut staking = self.fee_discounts.staking_info();
        let mut events = std::mem::take(&mut self.pending_events);
        let mut expiry_sweeps = Vec::new();
        let mut spot_batches = Vec::new();
        let mut derivative_batches = Vec::new();

        let market_ids: Vec<MarketId> = self.markets.keys().cloned().collect();
        for market_id in &market_ids {
            let Some(market) = self.markets.get(market_id).cloned() else {
                continue;
            };
            if !market.is_active() {
                continue;
            }
            let env = self.pass_env(&market);

            match market.market_type {
                MarketType::Spot => {
                    let Some(orders) = self.spot_orders.get_mut(market_id) else {
                        continue;
                    };
                    expiry_sweeps.extend(spot::cancel_expired_orders(&market, orders, self.block_height, &mut self.ledger));
                    spot_batches.extend(spot::run_passes(&market, orders, &env, &mut staking, &mut self.ledger));
                }
                MarketType::Derivative => {
                    let Some(orders) = self.derivative_orders.get_mut(market_id) else {
                        continue;
                    };
                    derivative_batches.extend(derivative::run_passes(&market, orders, &env, &mut staking, &mut self.ledger));
                }
            }
        }
        self.fee_discounts.flush(&staking);

        // sweeps carry no trades, so they stay out of the VWAP samples
        for batch in &expiry_sweeps {
            events.extend(batch.events());
        }
        for batch in &spot_batches {
            self.vwap_info.apply_vwap(&batch.market_id, &batch.vwap_data);
            self.trading_reward_points.merge(&batch.trading_reward_points);
            events.extend(batch.events());
        }
        for batch in &derivative_batches {
            self.vwap_info.apply_vwap(&batch.market_id, &batch.vwap_data);
            self.trading_reward_points.merge(&batch.trading_reward_points);
            events.extend(batch.events());
        }

        let vwap_info = std::mem::take(&mut self.vwap_info);
        self.trade_records
            .append_vwap_info(&vwap_info, self.block_time.timestamp(), self.config.trade_record_max_age);

        expiry_sweeps.append(&mut spot_batches);
        let output = BlockOutput {
            block_height: self.block_height,
            spot_batches: expiry_sweeps,
            derivative_batches,
            events,
            vwap_info,
            trading_reward_points: std::mem::take(&mut self.trading_reward_points),
        };
        info!(
            block_height = self.block_height,
            markets = market_ids.len(),
            trades = output.trade_count(),
            events = output.events.len(),
            "block closed"
        );
        output
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn top_of_book(&self, market_id: &MarketId) -> Result<TopOfBook, ExchangeError> {
        let market = self.market(market_id)?;
        let top = match market.market_type {
            MarketType::Spot => self.spot_orders.get(market_id).map(SpotOrders::top_of_book),
            MarketType::Derivative => self.derivative_orders.get(market_id).map(DerivativeOrders::top_of_book),
        };
        Ok(top.unwrap_or_default())
    }

    /// Resting depth of both sides, `depth` price levels each
    pub fn orderbook(&self, market_id: &MarketId, depth: usize) -> Result<OrderbookSnapshot, ExchangeError> {
        let market = self.market(market_id)?;
        let snapshot = match market.market_type {
            MarketType::Spot => self.spot_orders.get(market_id).map(|o| o.snapshot(depth)),
            MarketType::Derivative => self.derivative_orders.get(market_id).map(|o| o.snapshot(depth)),
        };
        Ok(snapshot.unwrap_or(OrderbookSnapshot {
            buys: Vec::new(),
            sells: Vec::new(),
        }))
    }

    pub fn spot_order(&self, market_id: &MarketId, order_hash: &OrderHash) -> Option<&SpotLimitOrder> {
        self.spot_orders.get(market_id)?.resting_order(order_hash)
    }

    pub fn derivative_order(&self, market_id: &MarketId, order_hash: &OrderHash) -> Option<&DerivativeLimitOrder> {
        self.derivative_orders.get(market_id)?.resting_order(order_hash)
    }

    /// Resting order of either market type
    pub fn resting_order(&self, market_id: &MarketId, order_hash: &OrderHash) -> Option<OrderKind> {
        self.spot_order(market_id, order_hash)
            .cloned()
            .map(OrderKind::SpotLimit)
            .or_else(|| {
                self.derivative_order(market_id, order_hash)
                    .cloned()
                    .map(OrderKind::DerivativeLimit)
            })
    }

    /// Hash of the live order carrying `cid`
    pub fn order_hash_by_cid(&self, market_id: &MarketId, subaccount_id: SubaccountId, cid: &str) -> Option<OrderHash> {
        self.spot_orders
            .get(market_id)
            .and_then(|o| o.order_hash_by_cid(subaccount_id, cid))
            .or_else(|| {
                self.derivative_orders
                    .get(market_id)
                    .and_then(|o| o.order_hash_by_cid(subaccount_id, cid))
            })
    }

    /// Realized volatility from the recorded block VWAPs
    pub fn market_volatility(&self, market_id: &MarketId, options: &TradeHistoryOptions) -> MarketVolatility {
        self.trade_records.market_volatility(
            market_id,
            self.block_time.timestamp(),
            options,
            self.config.trade_grouping_seconds,
        )
    }

    pub fn trade_records(&self) -> &TradeRecords {
        &self.trade_records
    }

    // ── Shared helpers ──────────────────────────────────────────────────

    /// Hash the next order of `subaccount_id` would get
    fn next_order_hash(&self, subaccount_id: SubaccountId, market_id: &MarketId) -> (OrderHash, u64) {
        let nonce = self.trade_nonces.get(&subaccount_id).copied().unwrap_or_default() + 1;
        (OrderHash::compute(&subaccount_id, nonce, market_id), nonce)
    }

    fn commit_nonce(&mut self, subaccount_id: SubaccountId, nonce: u64) {
        self.trade_nonces.insert(subaccount_id, nonce);
    }

    /// Fold an execution that settled outside `end_block` into the block
    fn record_execution(&mut self, market_id: &MarketId, events: Vec<ExchangeEvent>, vwap: &VwapData, points: &TradingRewardPoints) {
        self.vwap_info.apply_vwap(market_id, vwap);
        self.trading_reward_points.merge(points);
        self.pending_events.extend(events);
    }
}

/// Whether a discount schedule applies to a market
fn schedule_covers(schedule: &FeeDiscountSchedule, market: &Market) -> bool {
    schedule.quote_denoms.iter().any(|d| *d == market.quote_denom) && !schedule.is_market_disqualified(&market.market_id)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use exchange_types::ids::{Address, SubaccountId};
    use exchange_types::numeric::dec;
    use exchange_types::order::{OrderInfo, OrderType};
    use rust_decimal::Decimal;

    use super::ExchangeEngine;
    use crate::config::EngineConfig;
    use crate::expansion::test_support::{derivative_market, spot_market};
    use crate::orders::OrderRequest;

    pub fn trader(n: u8) -> SubaccountId {
        SubaccountId::new(Address::repeat(n), 0)
    }

    pub fn time(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap_or_default()
    }

    /// Engine at block 1 with one spot and one derivative market, every
    /// trader in 1..=9 funded with 1_000_000 of each denom
    pub fn engine() -> ExchangeEngine {
        let mut engine = ExchangeEngine::new(EngineConfig::default());
        engine.add_market(spot_market("0.001", "0.002")).unwrap();
        engine.add_market(derivative_market("0.001", "0.002")).unwrap();
        for n in 1..=9 {
            for denom in ["inj", "usdt"] {
                engine.ledger_mut().deposit(trader(n), denom, dec("1000000")).unwrap();
            }
        }
        engine.begin_block(1, time(0));
        engine
    }

    pub fn request(market: &str, n: u8, order_type: OrderType, price: &str, quantity: &str) -> OrderRequest {
        OrderRequest {
            market_id: market.into(),
            order_info: OrderInfo {
                subaccount_id: trader(n),
                fee_recipient: Address::repeat(0xfe),
                price: dec(price),
                quantity: dec(quantity),
                cid: String::new(),
            },
            order_type,
            margin: Decimal::ZERO,
            expiration_block: 0,
        }
    }
}
