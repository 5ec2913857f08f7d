//! Decimal helpers shared by every layer
//!
//! All amounts are `rust_decimal::Decimal`. Results of division are rounded
//! to [`PRECISION`] fractional digits so that every node arrives at the same
//! value regardless of intermediate representation.

use rust_decimal::RoundingStrategy;
use rust_decimal::Decimal;

/// Fractional digits kept after a division
pub const PRECISION: u32 = 18;

/// Divide and round to [`PRECISION`] digits (banker's rounding).
///
/// Returns `None` when `divisor` is zero.
pub fn quo(dividend: Decimal, divisor: Decimal) -> Option<Decimal> {
    if divisor.is_zero() {
        return None;
    }
    dividend
        .checked_div(divisor)
        .map(|v| v.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointNearestEven))
}

/// Arithmetic mean of two values
pub fn midpoint(a: Decimal, b: Decimal) -> Decimal {
    // divisor is a non-zero constant
    quo(a + b, Decimal::TWO).unwrap_or_default()
}

/// `max(value, 0)`
pub fn positive_part(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Check that `value` is an exact multiple of `tick`.
///
/// A zero tick accepts everything.
pub fn is_multiple_of(value: Decimal, tick: Decimal) -> bool {
    if tick.is_zero() {
        return true;
    }
    (value % tick).is_zero()
}

/// Most decimals a market denom may declare
pub const MAX_DENOM_DECIMALS: u32 = 18;

/// `10^decimals` as a decimal scaling factor, `None` past `Decimal::MAX`
pub fn pow10(decimals: u32) -> Option<Decimal> {
    (0..decimals).try_fold(Decimal::ONE, |factor, _| factor.checked_mul(Decimal::TEN))
}

/// Parse a decimal literal exactly.
///
/// Intended for configuration defaults and tests; returns zero on malformed
/// input rather than panicking.
pub fn dec(literal: &str) -> Decimal {
    Decimal::from_str_exact(literal).unwrap_or_default()
}
