//! Balance deltas produced by settlement
//!
//! Each subaccount carries an available and a total balance per denom. A
//! batch emits deltas keyed by subaccount; the ledger applies them.

use crate::ids::SubaccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change to one subaccount's balance in one denom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepositDelta {
    pub available_balance_delta: Decimal,
    pub total_balance_delta: Decimal,
}

impl DepositDelta {
    /// Delta that moves available and total by the same amount
    pub fn uniform(amount: Decimal) -> Self {
        Self {
            available_balance_delta: amount,
            total_balance_delta: amount,
        }
    }

    pub fn add(&mut self, other: &DepositDelta) {
        self.available_balance_delta += other.available_balance_delta;
        self.total_balance_delta += other.total_balance_delta;
    }

    pub fn add_available(&mut self, amount: Decimal) {
        self.available_balance_delta += amount;
    }

    pub fn is_empty(&self) -> bool {
        self.available_balance_delta.is_zero() && self.total_balance_delta.is_zero()
    }
}

/// Deltas for one denom, merged per subaccount
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepositDeltas(BTreeMap<SubaccountId, DepositDelta>);

impl DepositDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_deposit_delta(&mut self, subaccount_id: SubaccountId, delta: DepositDelta) {
        self.0.entry(subaccount_id).or_default().add(&delta);
    }

    pub fn apply_uniform_delta(&mut self, subaccount_id: SubaccountId, amount: Decimal) {
        self.apply_deposit_delta(subaccount_id, DepositDelta::uniform(amount));
    }

    pub fn get(&self, subaccount_id: &SubaccountId) -> Option<&DepositDelta> {
        self.0.get(subaccount_id)
    }

    /// Subaccounts in ascending byte order
    pub fn sorted_subaccount_ids(&self) -> Vec<SubaccountId> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubaccountId, &DepositDelta)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all total balance deltas
    pub fn total(&self) -> Decimal {
        self.0.values().map(|d| d.total_balance_delta).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Address;
    use crate::numeric::dec;

    #[test]
    fn test_deltas_merge_per_subaccount() {
        let a = SubaccountId::new(Address::repeat(1), 0);
        let mut deltas = DepositDeltas::new();
        deltas.apply_deposit_delta(
            a,
            DepositDelta {
                available_balance_delta: dec("1"),
                total_balance_delta: dec("-2"),
            },
        );
        deltas.apply_uniform_delta(a, dec("3"));

        let merged = deltas.get(&a).unwrap();
        assert_eq!(merged.available_balance_delta, dec("4"));
        assert_eq!(merged.total_balance_delta, dec("1"));
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn test_sorted_subaccount_ids() {
        let high = SubaccountId::new(Address::repeat(9), 0);
        let low = SubaccountId::new(Address::repeat(1), 0);
        let mut deltas = DepositDeltas::new();
        deltas.apply_uniform_delta(high, dec("1"));
        deltas.apply_uniform_delta(SubaccountId::AUCTION, dec("1"));
        deltas.apply_uniform_delta(low, dec("1"));

        assert_eq!(deltas.sorted_subaccount_ids(), vec![low, high, SubaccountId::AUCTION]);
        assert_eq!(deltas.total(), dec("3"));
    }

    #[test]
    fn test_empty_delta() {
        let mut delta = DepositDelta::default();
        assert!(delta.is_empty());
        delta.add_available(dec("0.5"));
        assert!(!delta.is_empty());
    }
}
