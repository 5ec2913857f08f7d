//! Batch execution aggregation
//!
//! Folds the state expansions of one matching pass into the output handed
//! to the caller: deposit deltas in chain units keyed by subaccount, order
//! fill deltas, trade events, reward points and a VWAP sample. Cancelled
//! orders are folded the same way into cancellation batches.

pub mod derivative;
pub mod spot;

pub use derivative::{DerivativeBatchExecutionData, DerivativeLimitOrderDelta};
pub use spot::{SpotBatchExecutionData, SpotLimitOrderDelta};

use exchange_types::ids::{Address, SubaccountId};
use exchange_types::market::Market;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::error;

/// A limit order taken off the book, with where it was taken from
#[derive(Debug, Clone, PartialEq)]
pub struct CancelledOrder<T> {
    pub order: T,
    /// Still waiting for its first matching pass
    pub is_transient: bool,
}

/// Base amount in chain units.
///
/// Admission rejects orders whose amounts do not convert, so a failure here
/// is an invariant violation: it is logged and settles nothing.
pub(crate) fn base_units(market: &Market, value: Decimal) -> Decimal {
    market
        .quantity_to_chain_format(value)
        .unwrap_or_else(|| out_of_range(market, value))
}

/// Quote amount in chain units
pub(crate) fn quote_units(market: &Market, value: Decimal) -> Decimal {
    market
        .notional_to_chain_format(value)
        .unwrap_or_else(|| out_of_range(market, value))
}

fn out_of_range(market: &Market, value: Decimal) -> Decimal {
    error!(market_id = %market.market_id, %value, "settlement amount out of chain range");
    Decimal::ZERO
}

/// Subaccount credited with a fee recipient's reward; a zero address routes
/// to the auction subaccount
pub fn fee_recipient_subaccount(fee_recipient: Address) -> SubaccountId {
    let subaccount_id = SubaccountId::new(fee_recipient, 0);
    if subaccount_id == SubaccountId::ZERO {
        SubaccountId::AUCTION
    } else {
        subaccount_id
    }
}

/// Hex SHA-256 of the JSON rendering of `value`, used to compare replays
pub fn checksum<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
