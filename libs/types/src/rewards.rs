//! Trading reward points accrued per account address

use crate::ids::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradingRewardPoints(BTreeMap<Address, Decimal>);

impl TradingRewardPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero points are not recorded
    pub fn add_points(&mut self, account: Address, points: Decimal) {
        if points.is_zero() {
            return;
        }
        *self.0.entry(account).or_default() += points;
    }

    pub fn merge(&mut self, other: &TradingRewardPoints) {
        for (account, points) in &other.0 {
            self.add_points(*account, *points);
        }
    }

    pub fn get(&self, account: &Address) -> Decimal {
        self.0.get(account).copied().unwrap_or_default()
    }

    /// Accounts in ascending address order
    pub fn sorted_accounts(&self) -> Vec<Address> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Decimal)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
