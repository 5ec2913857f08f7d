//! Engine configuration and the explicit per-batch context

use chrono::{DateTime, Utc};
use exchange_types::fee::PointsMultiplier;
use exchange_types::market::Market;
use exchange_types::numeric::dec;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fees::FeeDiscountConfig;

/// Exchange-wide parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Floor on the net fee the protocol keeps after maker rebates
    pub minimal_protocol_fee_rate: Decimal,
    /// Only post-only limit orders are accepted while set
    pub is_post_only_mode: bool,
    /// Taker fee multiplier for atomic market orders
    pub atomic_market_order_fee_multiplier: Decimal,
    /// Reward points multiplier for markets without an explicit one
    pub default_points_multiplier: PointsMultiplier,
    /// Trade records older than this are dropped, in seconds
    pub trade_record_max_age: i64,
    /// Window merging trade records for volatility, in seconds
    pub trade_grouping_seconds: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimal_protocol_fee_rate: dec("0.00005"),
            is_post_only_mode: false,
            atomic_market_order_fee_multiplier: dec("2.5"),
            default_points_multiplier: PointsMultiplier::ONE,
            trade_record_max_age: 300,
            trade_grouping_seconds: 15,
        }
    }
}

/// Everything one matching batch reads, passed explicitly
#[derive(Debug)]
pub struct BatchContext<'a> {
    pub block_height: i64,
    pub block_time: DateTime<Utc>,
    pub market: &'a Market,
    pub points_multiplier: PointsMultiplier,
    pub fee_discounts: FeeDiscountConfig<'a>,
}

impl<'a> BatchContext<'a> {
    pub fn new(
        block_height: i64,
        block_time: DateTime<Utc>,
        market: &'a Market,
        points_multiplier: PointsMultiplier,
        fee_discounts: FeeDiscountConfig<'a>,
    ) -> Self {
        Self {
            block_height,
            block_time,
            market,
            points_multiplier,
            fee_discounts,
        }
    }
}
