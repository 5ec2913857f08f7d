//! Fee discount snapshot
//!
//! [`FeeDiscountStakingInfo`] is built once per block from the discount
//! state and exclusively borrowed by each batch through a
//! [`FeeDiscountConfig`]. Tier lookups are cached per account; new tier TTLs
//! and volume contributions are buffered here and flushed after the block.

use std::collections::BTreeMap;

use exchange_types::fee::{FeeDiscountRates, FeeDiscountSchedule, FeeDiscountTierTtl, VolumeRecord};
use exchange_types::ids::{Address, MarketId, SubaccountId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Stake and volume of one account as seen at the start of the block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDiscountInputs {
    pub staked_amount: Decimal,
    /// Stake granted to the account minus stake it granted away; may be negative
    pub net_granted_stake: Decimal,
    /// Volume over every tracked bucket, current one included
    pub trading_volume: Decimal,
    pub tier_ttl: Option<FeeDiscountTierTtl>,
}

/// Volume one subaccount traded on one market during the block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubaccountVolumeContribution {
    pub subaccount_id: SubaccountId,
    pub market_id: MarketId,
    pub volume: VolumeRecord,
}

/// Outcome of resolving an account's discount tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDiscountTier {
    pub rates: FeeDiscountRates,
    pub tier: u64,
    pub is_ttl_expired: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeDiscountStakingInfo {
    schedule: Option<FeeDiscountSchedule>,
    current_bucket_start_timestamp: i64,
    /// Tier TTLs older than this are expired
    max_ttl_timestamp: i64,
    /// TTL given to tiers computed in this block
    next_ttl_timestamp: i64,
    is_first_fee_cycle_finished: bool,
    rates_cache: BTreeMap<u64, FeeDiscountRates>,

    account_inputs: BTreeMap<Address, AccountDiscountInputs>,
    account_fee_tiers: BTreeMap<Address, FeeDiscountRates>,
    new_account_tiers: BTreeMap<Address, FeeDiscountTierTtl>,
    account_volume_contributions: BTreeMap<Address, Decimal>,
    subaccount_market_volumes: BTreeMap<(SubaccountId, MarketId), VolumeRecord>,
}

impl FeeDiscountStakingInfo {
    pub fn new(
        schedule: Option<FeeDiscountSchedule>,
        current_bucket_start_timestamp: i64,
        is_first_fee_cycle_finished: bool,
    ) -> Self {
        let bucket_duration = schedule.as_ref().map(|s| s.bucket_duration).unwrap_or_default();
        let rates_cache = schedule.as_ref().map(FeeDiscountSchedule::rates_map).unwrap_or_default();
        Self {
            schedule,
            current_bucket_start_timestamp,
            max_ttl_timestamp: current_bucket_start_timestamp,
            next_ttl_timestamp: current_bucket_start_timestamp + bucket_duration,
            is_first_fee_cycle_finished,
            rates_cache,
            account_inputs: BTreeMap::new(),
            account_fee_tiers: BTreeMap::new(),
            new_account_tiers: BTreeMap::new(),
            account_volume_contributions: BTreeMap::new(),
            subaccount_market_volumes: BTreeMap::new(),
        }
    }

    /// Snapshot without a discount schedule; rates pass through unchanged
    pub fn without_schedule() -> Self {
        Self::new(None, 0, false)
    }

    pub fn schedule(&self) -> Option<&FeeDiscountSchedule> {
        self.schedule.as_ref()
    }

    pub fn current_bucket_start_timestamp(&self) -> i64 {
        self.current_bucket_start_timestamp
    }

    pub fn set_account_inputs(&mut self, account: Address, inputs: AccountDiscountInputs) {
        self.account_inputs.insert(account, inputs);
    }

    /// Cached discount rate of an account, if its tier was already resolved
    pub fn fee_discount_rate(&self, account: &Address, is_maker: bool) -> Option<Decimal> {
        self.account_fee_tiers.get(account).map(|rates| rates.rate(is_maker))
    }

    /// Resolve the tier of `account` from its TTL, stake and volume.
    ///
    /// A tier with a live TTL is reused. Otherwise the tier is recomputed;
    /// until the first fee cycle has finished every account is assumed to
    /// have the highest tier's volume, and stake only counts once the volume
    /// reaches tier one.
    pub fn account_fee_discount_tier(&self, account: &Address) -> AccountDiscountTier {
        let Some(schedule) = self.schedule.as_ref() else {
            return AccountDiscountTier {
                rates: FeeDiscountRates::default(),
                tier: 0,
                is_ttl_expired: false,
            };
        };

        let default_inputs = AccountDiscountInputs::default();
        let inputs = self.account_inputs.get(account).unwrap_or(&default_inputs);

        let live_tier = inputs
            .tier_ttl
            .filter(|ttl| ttl.ttl_timestamp >= self.max_ttl_timestamp)
            .map(|ttl| ttl.tier);
        if let Some(tier) = live_tier {
            return AccountDiscountTier {
                rates: self.rates_cache.get(&tier).copied().unwrap_or_default(),
                tier,
                is_ttl_expired: false,
            };
        }

        let (_, tier_one_volume) = schedule.tier_one_requirements();
        let trading_volume = if self.is_first_fee_cycle_finished {
            inputs.trading_volume
        } else {
            schedule.highest_tier_volume()
        };

        let effective_staked_amount = if trading_volume < tier_one_volume {
            Decimal::ZERO
        } else {
            inputs.staked_amount + inputs.net_granted_stake
        };

        let (rates, tier) = schedule.calculate_fee_discount_tier(effective_staked_amount, trading_volume);
        AccountDiscountTier {
            rates,
            tier,
            is_ttl_expired: true,
        }
    }

    pub fn set_account_tier_info(&mut self, account: Address, rates: FeeDiscountRates) {
        self.account_fee_tiers.insert(account, rates);
    }

    pub fn set_new_account_tier_ttl(&mut self, account: Address, tier: u64) {
        self.new_account_tiers.insert(
            account,
            FeeDiscountTierTtl {
                tier,
                ttl_timestamp: self.next_ttl_timestamp,
            },
        );
    }

    /// Buffer the notional of a fill; negative amounts are ignored.
    ///
    /// Account volume only counts towards discounts on qualified markets; the
    /// per-market record is always kept.
    pub fn increment_volume_contribution(
        &mut self,
        subaccount_id: SubaccountId,
        market_id: &MarketId,
        amount: Decimal,
        is_maker: bool,
        is_market_qualified: bool,
    ) {
        if amount < Decimal::ZERO {
            return;
        }

        if is_market_qualified {
            *self
                .account_volume_contributions
                .entry(subaccount_id.address())
                .or_default() += amount;
        }

        let record = self
            .subaccount_market_volumes
            .entry((subaccount_id, market_id.clone()))
            .or_default();
        *record = record.add(&VolumeRecord::single(amount, is_maker));
    }

    pub fn sorted_new_account_tiers(&self) -> Vec<(Address, FeeDiscountTierTtl)> {
        self.new_account_tiers.iter().map(|(a, t)| (*a, *t)).collect()
    }

    pub fn sorted_account_volume_contributions(&self) -> Vec<(Address, Decimal)> {
        self.account_volume_contributions.iter().map(|(a, v)| (*a, *v)).collect()
    }

    /// Per (subaccount, market) volumes and their per-market totals, both
    /// sorted by key
    pub fn sorted_subaccount_and_market_volumes(&self) -> (Vec<SubaccountVolumeContribution>, Vec<(MarketId, VolumeRecord)>) {
        let mut market_volumes: BTreeMap<MarketId, VolumeRecord> = BTreeMap::new();
        let subaccount_volumes = self
            .subaccount_market_volumes
            .iter()
            .map(|((subaccount_id, market_id), volume)| {
                let total = market_volumes.entry(market_id.clone()).or_default();
                *total = total.add(volume);
                SubaccountVolumeContribution {
                    subaccount_id: *subaccount_id,
                    market_id: market_id.clone(),
                    volume: *volume,
                }
            })
            .collect();
        (subaccount_volumes, market_volumes.into_iter().collect())
    }
}

/// Discount view handed to one batch
#[derive(Debug)]
pub struct FeeDiscountConfig<'a> {
    pub market_id: MarketId,
    pub is_market_qualified: bool,
    staking: &'a mut FeeDiscountStakingInfo,
}

impl<'a> FeeDiscountConfig<'a> {
    /// Markets only qualify when a schedule exists
    pub fn new(market_id: MarketId, is_market_qualified: bool, staking: &'a mut FeeDiscountStakingInfo) -> Self {
        let is_market_qualified = is_market_qualified && staking.schedule().is_some();
        Self {
            market_id,
            is_market_qualified,
            staking,
        }
    }

    pub fn staking_info(&self) -> &FeeDiscountStakingInfo {
        self.staking
    }

    /// Apply the account's discount to `trade_fee_rate`.
    ///
    /// Negative rates are never discounted. The first lookup of an account
    /// resolves and caches its tier, recording a new TTL when the old one
    /// expired.
    pub fn discounted_trade_fee_rate(&mut self, trade_fee_rate: Decimal, is_maker: bool, account: &Address) -> Decimal {
        if trade_fee_rate < Decimal::ZERO {
            return trade_fee_rate;
        }

        let discount_rate = match self.staking.fee_discount_rate(account, is_maker) {
            Some(rate) => rate,
            None => {
                if self.staking.schedule().is_none() {
                    return trade_fee_rate;
                }
                let resolved = self.staking.account_fee_discount_tier(account);
                self.staking.set_account_tier_info(*account, resolved.rates);
                if resolved.is_ttl_expired {
                    trace!(account = %account, tier = resolved.tier, "fee discount tier recomputed");
                    self.staking.set_new_account_tier_ttl(*account, resolved.tier);
                }
                resolved.rates.rate(is_maker)
            }
        };

        (Decimal::ONE - discount_rate) * trade_fee_rate
    }

    pub fn increment_volume_contribution(&mut self, subaccount_id: SubaccountId, amount: Decimal, is_maker: bool) {
        let market_id = self.market_id.clone();
        self.staking
            .increment_volume_contribution(subaccount_id, &market_id, amount, is_maker, self.is_market_qualified);
    }
}
