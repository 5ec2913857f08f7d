//! Fee and fee-discount types
//!
//! Discount tiers are unlocked by holding both a staked amount and a rolling
//! trading volume. Discount rates are fractions of the base fee rate.

use crate::errors::FeeConfigError;
use crate::ids::MarketId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-tier discount rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeDiscountRates {
    pub maker_discount_rate: Decimal,
    pub taker_discount_rate: Decimal,
}

impl FeeDiscountRates {
    pub fn rate(&self, is_maker: bool) -> Decimal {
        if is_maker {
            self.maker_discount_rate
        } else {
            self.taker_discount_rate
        }
    }
}

/// One discount tier; both thresholds must be met
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeDiscountTierInfo {
    pub maker_discount_rate: Decimal,
    pub taker_discount_rate: Decimal,
    pub staked_amount: Decimal,
    /// Trading volume over the tracked buckets
    pub volume: Decimal,
}

/// Account tier with the timestamp it stays valid until
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDiscountTierTtl {
    pub tier: u64,
    pub ttl_timestamp: i64,
}

/// Discount schedule; tier 0 (no discount) is implicit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeDiscountSchedule {
    pub bucket_count: u64,
    /// Seconds per volume bucket
    pub bucket_duration: i64,
    pub quote_denoms: Vec<String>,
    pub tier_infos: Vec<FeeDiscountTierInfo>,
    pub disqualified_market_ids: Vec<MarketId>,
}

impl FeeDiscountSchedule {
    pub fn validate(&self) -> Result<(), FeeConfigError> {
        if self.bucket_count == 0 {
            return Err(FeeConfigError::InvalidSchedule("bucket count must be positive".into()));
        }
        if self.bucket_duration <= 0 {
            return Err(FeeConfigError::InvalidSchedule("bucket duration must be positive".into()));
        }
        if self.tier_infos.is_empty() {
            return Err(FeeConfigError::InvalidSchedule("at least one tier is required".into()));
        }

        let mut denoms = BTreeSet::new();
        if !self.quote_denoms.iter().all(|d| denoms.insert(d)) {
            return Err(FeeConfigError::InvalidSchedule("duplicate quote denom".into()));
        }
        let mut markets = BTreeSet::new();
        if !self.disqualified_market_ids.iter().all(|m| markets.insert(m)) {
            return Err(FeeConfigError::InvalidSchedule("duplicate disqualified market".into()));
        }

        let unit = Decimal::ZERO..=Decimal::ONE;
        let mut previous: Option<&FeeDiscountTierInfo> = None;
        for (idx, tier) in self.tier_infos.iter().enumerate() {
            if !unit.contains(&tier.maker_discount_rate) || !unit.contains(&tier.taker_discount_rate) {
                return Err(FeeConfigError::InvalidSchedule(format!(
                    "tier {} discount rates must lie in [0, 1]",
                    idx + 1
                )));
            }
            if tier.staked_amount < Decimal::ZERO || tier.volume < Decimal::ZERO {
                return Err(FeeConfigError::InvalidSchedule(format!(
                    "tier {} thresholds must be non-negative",
                    idx + 1
                )));
            }
            if let Some(prev) = previous {
                let ascending = tier.maker_discount_rate >= prev.maker_discount_rate
                    && tier.taker_discount_rate >= prev.taker_discount_rate
                    && tier.staked_amount >= prev.staked_amount
                    && tier.volume >= prev.volume;
                if !ascending {
                    return Err(FeeConfigError::InvalidSchedule(format!(
                        "tier {} must not be below tier {}",
                        idx + 1,
                        idx
                    )));
                }
            }
            previous = Some(tier);
        }
        Ok(())
    }

    /// Highest tier whose staked amount and volume are both met.
    ///
    /// Tiers are scanned from the lowest; the first unmet tier ends the scan.
    pub fn calculate_fee_discount_tier(
        &self,
        staked_amount: Decimal,
        trading_volume: Decimal,
    ) -> (FeeDiscountRates, u64) {
        let mut highest_tier_level = 0usize;
        for (idx, tier) in self.tier_infos.iter().enumerate() {
            if staked_amount < tier.staked_amount || trading_volume < tier.volume {
                break;
            }
            highest_tier_level = idx + 1;
        }

        let rates = match highest_tier_level {
            0 => FeeDiscountRates::default(),
            level => {
                let tier = &self.tier_infos[level - 1];
                FeeDiscountRates {
                    maker_discount_rate: tier.maker_discount_rate,
                    taker_discount_rate: tier.taker_discount_rate,
                }
            }
        };
        (rates, highest_tier_level as u64)
    }

    /// `(staked_amount, volume)` thresholds of tier one
    pub fn tier_one_requirements(&self) -> (Decimal, Decimal) {
        self.tier_infos
            .first()
            .map(|t| (t.staked_amount, t.volume))
            .unwrap_or_default()
    }

    pub fn highest_tier_volume(&self) -> Decimal {
        self.tier_infos.last().map(|t| t.volume).unwrap_or_default()
    }

    pub fn max_taker_discount(&self) -> Decimal {
        self.tier_infos.last().map(|t| t.taker_discount_rate).unwrap_or_default()
    }

    /// Tier level to rates, including the implicit tier 0
    pub fn rates_map(&self) -> BTreeMap<u64, FeeDiscountRates> {
        let mut map = BTreeMap::new();
        map.insert(0, FeeDiscountRates::default());
        for (idx, tier) in self.tier_infos.iter().enumerate() {
            map.insert(
                idx as u64 + 1,
                FeeDiscountRates {
                    maker_discount_rate: tier.maker_discount_rate,
                    taker_discount_rate: tier.taker_discount_rate,
                },
            );
        }
        map
    }

    pub fn is_market_disqualified(&self, market_id: &MarketId) -> bool {
        self.disqualified_market_ids.contains(market_id)
    }
}

/// Maker and taker volume for one (subaccount, market)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub maker_volume: Decimal,
    pub taker_volume: Decimal,
}

impl VolumeRecord {
    pub fn single(amount: Decimal, is_maker: bool) -> Self {
        if is_maker {
            Self { maker_volume: amount, taker_volume: Decimal::ZERO }
        } else {
            Self { maker_volume: Decimal::ZERO, taker_volume: amount }
        }
    }

    pub fn add(&self, other: &VolumeRecord) -> Self {
        Self {
            maker_volume: self.maker_volume + other.maker_volume,
            taker_volume: self.taker_volume + other.taker_volume,
        }
    }

    pub fn total(&self) -> Decimal {
        self.maker_volume + self.taker_volume
    }

    pub fn is_zero(&self) -> bool {
        self.maker_volume.is_zero() && self.taker_volume.is_zero()
    }
}

/// Trading reward points earned per unit of notional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsMultiplier {
    pub maker_points_multiplier: Decimal,
    pub taker_points_multiplier: Decimal,
}

impl PointsMultiplier {
    pub const ZERO: PointsMultiplier = PointsMultiplier {
        maker_points_multiplier: Decimal::ZERO,
        taker_points_multiplier: Decimal::ZERO,
    };

    pub const ONE: PointsMultiplier = PointsMultiplier {
        maker_points_multiplier: Decimal::ONE,
        taker_points_multiplier: Decimal::ONE,
    };

    pub fn for_role(&self, is_maker: bool) -> Decimal {
        if is_maker {
            self.maker_points_multiplier
        } else {
            self.taker_points_multiplier
        }
    }
}

impl Default for PointsMultiplier {
    fn default() -> Self {
        Self::ONE
    }
}

/// Fee breakdown of one fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFeeData {
    /// `notional * discounted_trade_fee_rate`; negative is a rebate
    pub total_trade_fee: Decimal,
    /// Portion borne (or received) by the trader
    pub trader_fee: Decimal,
    pub trading_reward_points: Decimal,
    pub fee_recipient_reward: Decimal,
    pub auction_fee_reward: Decimal,
    pub discounted_trade_fee_rate: Decimal,
}

impl TradeFeeData {
    /// Fee data for a zero fill; keeps the rate for refund arithmetic
    pub fn empty(discounted_trade_fee_rate: Decimal) -> Self {
        Self {
            total_trade_fee: Decimal::ZERO,
            trader_fee: Decimal::ZERO,
            trading_reward_points: Decimal::ZERO,
            fee_recipient_reward: Decimal::ZERO,
            auction_fee_reward: Decimal::ZERO,
            discounted_trade_fee_rate,
        }
    }
}

/// Split a fill's fee between trader, fee recipient and auction.
///
/// Returns `(total, trader, fee_recipient_reward, auction)`. The recipient
/// reward is never negative. A rebate is funded in full by the auction.
pub fn order_fill_fee_info(
    order_fill_notional: Decimal,
    trade_fee_rate: Decimal,
    relayer_fee_share_rate: Decimal,
) -> (Decimal, Decimal, Decimal, Decimal) {
    let total_trade_fee = order_fill_notional * trade_fee_rate;
    let fee_recipient_reward = (relayer_fee_share_rate * total_trade_fee).abs();

    let (trader_fee, auction_fee_reward) = if total_trade_fee < Decimal::ZERO {
        (total_trade_fee + fee_recipient_reward, total_trade_fee)
    } else {
        (total_trade_fee, total_trade_fee - fee_recipient_reward)
    };

    (total_trade_fee, trader_fee, fee_recipient_reward, auction_fee_reward)
}

/// Reject fee rates that would pay the protocol less than the minimum.
///
/// Only a negative maker rate can push the net protocol fee down: the taker
/// fee net of the relayer share must still cover the maker rebate plus
/// `minimal_protocol_fee_rate`.
pub fn validate_maker_with_taker_fee(
    maker_fee_rate: Decimal,
    taker_fee_rate: Decimal,
    relayer_fee_share_rate: Decimal,
    minimal_protocol_fee_rate: Decimal,
) -> Result<(), FeeConfigError> {
    if maker_fee_rate > taker_fee_rate {
        return Err(FeeConfigError::MakerAboveTaker {
            maker: maker_fee_rate.to_string(),
            taker: taker_fee_rate.to_string(),
        });
    }

    if maker_fee_rate >= Decimal::ZERO {
        return Ok(());
    }

    let net = taker_fee_rate * (Decimal::ONE - relayer_fee_share_rate) + maker_fee_rate;
    if net < minimal_protocol_fee_rate {
        return Err(FeeConfigError::BelowMinimalProtocolFee {
            net: net.to_string(),
            minimal: minimal_protocol_fee_rate.to_string(),
        });
    }
    Ok(())
}

/// [`validate_maker_with_taker_fee`] at the schedule's maximum taker discount
pub fn validate_maker_with_taker_fee_and_discounts(
    maker_fee_rate: Decimal,
    taker_fee_rate: Decimal,
    relayer_fee_share_rate: Decimal,
    minimal_protocol_fee_rate: Decimal,
    schedule: Option<&FeeDiscountSchedule>,
) -> Result<(), FeeConfigError> {
    let smallest_taker_fee_rate = match schedule {
        Some(s) if !s.tier_infos.is_empty() => (Decimal::ONE - s.max_taker_discount()) * taker_fee_rate,
        _ => taker_fee_rate,
    };

    validate_maker_with_taker_fee(
        maker_fee_rate,
        smallest_taker_fee_rate,
        relayer_fee_share_rate,
        minimal_protocol_fee_rate,
    )
}
