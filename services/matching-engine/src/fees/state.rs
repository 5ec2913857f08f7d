//! Fee discount state kept across blocks
//!
//! Account volume is tracked in fixed-duration buckets. Once a bucket ends
//! its volume moves into a running past total; once the oldest bucket falls
//! out of the tracked window it is pruned from that total together with the
//! account's tier TTL, and the first fee cycle is considered finished.

use std::collections::BTreeMap;

use exchange_types::errors::FeeConfigError;
use exchange_types::fee::{FeeDiscountSchedule, FeeDiscountTierTtl, VolumeRecord};
use exchange_types::ids::{Address, MarketId, SubaccountId};
use exchange_types::market::Market;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::discount::{AccountDiscountInputs, FeeDiscountStakingInfo};

#[derive(Debug, Clone, Default)]
pub struct FeeDiscountState {
    schedule: Option<FeeDiscountSchedule>,
    /// Zero until a schedule is set
    current_bucket_start_timestamp: i64,
    is_first_fee_cycle_finished: bool,
    /// bucket start -> account -> volume
    bucket_volumes: BTreeMap<i64, BTreeMap<Address, Decimal>>,
    past_bucket_total_volume: BTreeMap<Address, Decimal>,
    account_tier_ttls: BTreeMap<Address, FeeDiscountTierTtl>,
    staked_amounts: BTreeMap<Address, Decimal>,
    net_granted_stakes: BTreeMap<Address, Decimal>,
    subaccount_market_volumes: BTreeMap<(SubaccountId, MarketId), VolumeRecord>,
    market_volumes: BTreeMap<MarketId, VolumeRecord>,
}

impl FeeDiscountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self) -> Option<&FeeDiscountSchedule> {
        self.schedule.as_ref()
    }

    /// Install a validated schedule; the first one starts bucket tracking.
    pub fn set_schedule(&mut self, schedule: FeeDiscountSchedule, block_time: i64) -> Result<(), FeeConfigError> {
        schedule.validate()?;
        if self.current_bucket_start_timestamp == 0 {
            self.current_bucket_start_timestamp = block_time;
        }
        info!(
            tiers = schedule.tier_infos.len(),
            bucket_duration = schedule.bucket_duration,
            "fee discount schedule set"
        );
        self.schedule = Some(schedule);
        Ok(())
    }

    /// Discounts apply to markets quoted in a schedule denom that the
    /// schedule does not disqualify
    pub fn is_market_qualified(&self, market: &Market) -> bool {
        self.schedule.as_ref().is_some_and(|s| {
            s.quote_denoms.iter().any(|d| *d == market.quote_denom) && !s.is_market_disqualified(&market.market_id)
        })
    }

    pub fn set_staked_amount(&mut self, account: Address, amount: Decimal) {
        self.staked_amounts.insert(account, amount);
    }

    pub fn set_net_granted_stake(&mut self, account: Address, amount: Decimal) {
        self.net_granted_stakes.insert(account, amount);
    }

    pub fn is_first_fee_cycle_finished(&self) -> bool {
        self.is_first_fee_cycle_finished
    }

    pub fn current_bucket_start_timestamp(&self) -> i64 {
        self.current_bucket_start_timestamp
    }

    pub fn account_tier_ttl(&self, account: &Address) -> Option<FeeDiscountTierTtl> {
        self.account_tier_ttls.get(account).copied()
    }

    /// Current bucket plus every past bucket still tracked
    pub fn total_account_volume(&self, account: &Address) -> Decimal {
        let current = self
            .bucket_volumes
            .get(&self.current_bucket_start_timestamp)
            .and_then(|b| b.get(account))
            .copied()
            .unwrap_or_default();
        current + self.past_bucket_total_volume.get(account).copied().unwrap_or_default()
    }

    pub fn subaccount_market_volume(&self, subaccount_id: &SubaccountId, market_id: &MarketId) -> VolumeRecord {
        self.subaccount_market_volumes
            .get(&(*subaccount_id, market_id.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn market_volume(&self, market_id: &MarketId) -> VolumeRecord {
        self.market_volumes.get(market_id).copied().unwrap_or_default()
    }

    /// Roll buckets forward once `block_time` reaches the next bucket
    pub fn process_buckets(&mut self, block_time: i64) {
        let Some(bucket_duration) = self.schedule.as_ref().map(|s| s.bucket_duration) else {
            return;
        };
        let bucket_count = self.schedule.as_ref().map(|s| s.bucket_count).unwrap_or_default();
        if self.current_bucket_start_timestamp == 0 {
            return;
        }
        if block_time < self.current_bucket_start_timestamp + bucket_duration {
            return;
        }

        let ended_bucket = self.current_bucket_start_timestamp;
        self.current_bucket_start_timestamp += bucket_duration;

        if let Some(volumes) = self.bucket_volumes.get(&ended_bucket) {
            for (account, volume) in volumes {
                *self.past_bucket_total_volume.entry(*account).or_default() += *volume;
            }
        }

        let window = i64::try_from(bucket_count).unwrap_or(i64::MAX).saturating_mul(bucket_duration);
        let oldest_bucket = self.bucket_volumes.keys().next().copied();
        let Some(oldest_bucket) = oldest_bucket.filter(|oldest| *oldest < block_time.saturating_sub(window)) else {
            return;
        };

        if !self.is_first_fee_cycle_finished {
            info!("first fee discount cycle finished");
            self.is_first_fee_cycle_finished = true;
        }

        if let Some(volumes) = self.bucket_volumes.remove(&oldest_bucket) {
            debug!(bucket = oldest_bucket, accounts = volumes.len(), "pruning fee discount bucket");
            for (account, volume) in volumes {
                self.account_tier_ttls.remove(&account);
                if let Some(total) = self.past_bucket_total_volume.get_mut(&account) {
                    *total -= volume;
                }
            }
        }
    }

    /// Per-block snapshot carrying the inputs of every known account
    pub fn staking_info(&self) -> FeeDiscountStakingInfo {
        let mut info = FeeDiscountStakingInfo::new(
            self.schedule.clone(),
            self.current_bucket_start_timestamp,
            self.is_first_fee_cycle_finished,
        );
        if self.schedule.is_none() {
            return info;
        }

        let mut accounts: Vec<Address> = self
            .staked_amounts
            .keys()
            .chain(self.net_granted_stakes.keys())
            .chain(self.account_tier_ttls.keys())
            .chain(self.past_bucket_total_volume.keys())
            .chain(self.bucket_volumes.values().flat_map(|b| b.keys()))
            .copied()
            .collect();
        accounts.sort();
        accounts.dedup();

        for account in accounts {
            info.set_account_inputs(
                account,
                AccountDiscountInputs {
                    staked_amount: self.staked_amounts.get(&account).copied().unwrap_or_default(),
                    net_granted_stake: self.net_granted_stakes.get(&account).copied().unwrap_or_default(),
                    trading_volume: self.total_account_volume(&account),
                    tier_ttl: self.account_tier_ttl(&account),
                },
            );
        }
        info
    }

    /// Persist the tier TTLs and volumes buffered in `info` during the block
    pub fn flush(&mut self, info: &FeeDiscountStakingInfo) {
        for (account, ttl) in info.sorted_new_account_tiers() {
            self.account_tier_ttls.insert(account, ttl);
        }

        let bucket = info.current_bucket_start_timestamp();
        for (account, amount) in info.sorted_account_volume_contributions() {
            *self.bucket_volumes.entry(bucket).or_default().entry(account).or_default() += amount;
        }

        let (subaccount_volumes, market_volumes) = info.sorted_subaccount_and_market_volumes();
        for contribution in subaccount_volumes {
            if contribution.volume.is_zero() {
                continue;
            }
            let record = self
                .subaccount_market_volumes
                .entry((contribution.subaccount_id, contribution.market_id))
                .or_default();
            *record = record.add(&contribution.volume);
        }
        for (market_id, volume) in market_volumes {
            if volume.is_zero() {
                continue;
            }
            let record = self.market_volumes.entry(market_id).or_default();
            *record = record.add(&volume);
        }
    }
}
