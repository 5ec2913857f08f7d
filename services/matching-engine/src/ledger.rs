//! Balance ledger
//!
//! Every subaccount holds an available and a total balance per denom, in
//! chain units. Holds move funds out of available only; settlement applies
//! the deposit deltas of a batch to both.
//!
//! Invariant: `available <= total` for every balance the engine touched
//! through holds and batch deltas.

use std::collections::BTreeMap;

use exchange_types::deposit::{DepositDelta, DepositDeltas};
use exchange_types::errors::LedgerError;
use exchange_types::ids::SubaccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Ledger contract the engine settles against
pub trait BalanceLedger {
    /// Lock `amount` of available balance
    fn charge(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<(), LedgerError>;

    /// Release `amount` back to available balance
    fn credit(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<(), LedgerError>;

    fn available_balance(&self, subaccount_id: &SubaccountId, denom: &str) -> Decimal;

    fn total_balance(&self, subaccount_id: &SubaccountId, denom: &str) -> Decimal;

    fn apply_deposit_delta(&mut self, subaccount_id: SubaccountId, denom: &str, delta: &DepositDelta);

    /// Apply a batch's deltas for one denom in subaccount order
    fn apply_deposit_deltas(&mut self, denom: &str, deltas: &DepositDeltas) {
        for (subaccount_id, delta) in deltas.iter() {
            self.apply_deposit_delta(*subaccount_id, denom, delta);
        }
    }
}

/// Balance of one subaccount in one denom
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub available_balance: Decimal,
    pub total_balance: Decimal,
}

impl Deposit {
    pub fn locked(&self) -> Decimal {
        self.total_balance - self.available_balance
    }
}

/// Ledger kept in memory, ordered by subaccount then denom
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryLedger {
    deposits: BTreeMap<(SubaccountId, String), Deposit>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fund a subaccount from outside the exchange
    pub fn deposit(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<(), LedgerError> {
        ensure_non_negative(amount)?;
        self.apply_deposit_delta(subaccount_id, denom, &DepositDelta::uniform(amount));
        Ok(())
    }

    pub fn get(&self, subaccount_id: &SubaccountId, denom: &str) -> Deposit {
        self.deposits
            .get(&(*subaccount_id, denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Sum of total balances in `denom` across every subaccount
    pub fn denom_total(&self, denom: &str) -> Decimal {
        self.deposits
            .iter()
            .filter(|((_, d), _)| d == denom)
            .map(|(_, deposit)| deposit.total_balance)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(SubaccountId, String), &Deposit)> {
        self.deposits.iter()
    }

    fn entry(&mut self, subaccount_id: SubaccountId, denom: &str) -> &mut Deposit {
        self.deposits.entry((subaccount_id, denom.to_string())).or_default()
    }
}

fn ensure_non_negative(amount: Decimal) -> Result<(), LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::NegativeAmount(amount.to_string()));
    }
    Ok(())
}

impl BalanceLedger for InMemoryLedger {
    fn charge(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<(), LedgerError> {
        ensure_non_negative(amount)?;
        let deposit = self.entry(subaccount_id, denom);
        if deposit.available_balance < amount {
            return Err(LedgerError::InsufficientFunds {
                denom: denom.to_string(),
                required: amount.to_string(),
                available: deposit.available_balance.to_string(),
            });
        }
        deposit.available_balance -= amount;
        trace!(%denom, %amount, "balance charged");
        Ok(())
    }

    fn credit(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<(), LedgerError> {
        ensure_non_negative(amount)?;
        self.entry(subaccount_id, denom).available_balance += amount;
        trace!(%denom, %amount, "balance credited");
        Ok(())
    }

    fn available_balance(&self, subaccount_id: &SubaccountId, denom: &str) -> Decimal {
        self.get(subaccount_id, denom).available_balance
    }

    fn total_balance(&self, subaccount_id: &SubaccountId, denom: &str) -> Decimal {
        self.get(subaccount_id, denom).total_balance
    }

    fn apply_deposit_delta(&mut self, subaccount_id: SubaccountId, denom: &str, delta: &DepositDelta) {
        let deposit = self.entry(subaccount_id, denom);
        deposit.available_balance += delta.available_balance_delta;
        deposit.total_balance += delta.total_balance_delta;
        if deposit.available_balance < Decimal::ZERO || deposit.available_balance > deposit.total_balance {
            warn!(
                %denom,
                available = %deposit.available_balance,
                total = %deposit.total_balance,
                "deposit out of balance after delta"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_types::ids::Address;
    use exchange_types::numeric::dec;

    fn trader() -> SubaccountId {
        SubaccountId::new(Address::repeat(1), 0)
    }

    #[test]
    fn test_charge_locks_available_only() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(trader(), "usdt", dec("1000")).unwrap();
        ledger.charge(trader(), "usdt", dec("300")).unwrap();

        let deposit = ledger.get(&trader(), "usdt");
        assert_eq!(deposit.available_balance, dec("700"));
        assert_eq!(deposit.total_balance, dec("1000"));
        assert_eq!(deposit.locked(), dec("300"));
    }

    #[test]
    fn test_charge_beyond_available_fails() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(trader(), "usdt", dec("10")).unwrap();
        let err = ledger.charge(trader(), "usdt", dec("11")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                denom: "usdt".to_string(),
                required: "11".to_string(),
                available: "10".to_string(),
            }
        );
        assert_eq!(ledger.available_balance(&trader(), "usdt"), dec("10"));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut ledger = InMemoryLedger::new();
        assert!(ledger.credit(trader(), "usdt", dec("-1")).is_err());
        assert!(ledger.deposit(trader(), "usdt", dec("-1")).is_err());
    }

    #[test]
    fn test_apply_deposit_deltas() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(trader(), "usdt", dec("1002")).unwrap();
        ledger.charge(trader(), "usdt", dec("1002")).unwrap();

        let mut deltas = DepositDeltas::new();
        deltas.apply_deposit_delta(
            trader(),
            DepositDelta {
                available_balance_delta: dec("0"),
                total_balance_delta: dec("-1002"),
            },
        );
        deltas.apply_uniform_delta(SubaccountId::AUCTION, dec("3"));
        ledger.apply_deposit_deltas("usdt", &deltas);

        assert_eq!(ledger.get(&trader(), "usdt"), Deposit::default());
        assert_eq!(ledger.total_balance(&SubaccountId::AUCTION, "usdt"), dec("3"));
        assert_eq!(ledger.denom_total("usdt"), dec("3"));
    }
}
