//! Market configuration
//!
//! A read-only value object supplied to the engine at batch start.

use crate::errors::{ExchangeError, FeeConfigError};
use crate::fee::{validate_maker_with_taker_fee_and_discounts, FeeDiscountSchedule};
use crate::ids::MarketId;
use crate::numeric::{pow10, MAX_DENOM_DECIMALS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Active,
    Paused,
    Demolished,
    Expired,
    ForceClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketType {
    Spot,
    Derivative,
}

/// Market parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: MarketId,
    pub market_type: MarketType,
    pub ticker: String,
    /// Base denom; derivatives settle in quote only and leave this empty
    pub base_denom: String,
    pub quote_denom: String,
    /// May be negative (maker rebate)
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    /// Share of the trade fee routed to the order's fee recipient
    pub relayer_fee_share_rate: Decimal,
    pub min_price_tick_size: Decimal,
    pub min_quantity_tick_size: Decimal,
    pub min_notional: Decimal,
    /// Minimum margin per unit of notional for derivative orders; zero on spot
    pub initial_margin_ratio: Decimal,
    pub base_decimals: u32,
    pub quote_decimals: u32,
    pub status: MarketStatus,
    pub has_disabled_minimal_protocol_fee: bool,
}

impl Market {
    pub fn is_active(&self) -> bool {
        self.status == MarketStatus::Active
    }

    pub fn is_spot(&self) -> bool {
        self.market_type == MarketType::Spot
    }

    /// Denom that holds funds for an order on the given side.
    ///
    /// Spot sells lock base; everything else locks quote.
    pub fn margin_denom(&self, is_buy: bool) -> &str {
        if self.is_spot() && !is_buy {
            &self.base_denom
        } else {
            &self.quote_denom
        }
    }

    /// Convert a human-readable base quantity to chain units; `None` when
    /// the result does not fit a `Decimal`
    pub fn quantity_to_chain_format(&self, value: Decimal) -> Option<Decimal> {
        pow10(self.base_decimals)?.checked_mul(value)
    }

    /// Convert a human-readable quote amount to chain units
    pub fn notional_to_chain_format(&self, value: Decimal) -> Option<Decimal> {
        pow10(self.quote_decimals)?.checked_mul(value)
    }

    /// Both denoms must declare at most [`MAX_DENOM_DECIMALS`]
    pub fn validate_decimals(&self) -> Result<(), ExchangeError> {
        for (denom, decimals) in [
            (&self.base_denom, self.base_decimals),
            (&self.quote_denom, self.quote_decimals),
        ] {
            if decimals > MAX_DENOM_DECIMALS {
                return Err(ExchangeError::InvalidMarket {
                    market_id: self.market_id.to_string(),
                    reason: format!("{denom} declares {decimals} decimals, at most {MAX_DENOM_DECIMALS} allowed"),
                });
            }
        }
        Ok(())
    }

    /// Minimal protocol fee that applies to this market
    pub fn minimal_protocol_fee_rate(&self, global_rate: Decimal) -> Decimal {
        if self.has_disabled_minimal_protocol_fee {
            Decimal::ZERO
        } else {
            global_rate
        }
    }

    /// Validate fee parameters against the worst-case discount.
    ///
    /// Run on market launch, on fee parameter updates, and for every
    /// qualifying market whenever the discount schedule changes.
    pub fn validate_fees(
        &self,
        minimal_protocol_fee_rate: Decimal,
        schedule: Option<&FeeDiscountSchedule>,
    ) -> Result<(), FeeConfigError> {
        for (name, rate) in [
            ("maker_fee_rate", self.maker_fee_rate),
            ("taker_fee_rate", self.taker_fee_rate),
        ] {
            if rate <= -Decimal::ONE || rate >= Decimal::ONE {
                return Err(FeeConfigError::RateOutOfRange(format!("{name} {rate}")));
            }
        }
        if self.taker_fee_rate < Decimal::ZERO {
            return Err(FeeConfigError::RateOutOfRange(format!(
                "taker_fee_rate {}",
                self.taker_fee_rate
            )));
        }
        if self.relayer_fee_share_rate < Decimal::ZERO || self.relayer_fee_share_rate > Decimal::ONE {
            return Err(FeeConfigError::RateOutOfRange(format!(
                "relayer_fee_share_rate {}",
                self.relayer_fee_share_rate
            )));
        }

        validate_maker_with_taker_fee_and_discounts(
            self.maker_fee_rate,
            self.taker_fee_rate,
            self.relayer_fee_share_rate,
            self.minimal_protocol_fee_rate(minimal_protocol_fee_rate),
            schedule,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::dec;

    fn market() -> Market {
        Market {
            market_id: MarketId::new("INJ/USDT"),
            market_type: MarketType::Spot,
            ticker: "INJ/USDT".to_string(),
            base_denom: "inj".to_string(),
            quote_denom: "usdt".to_string(),
            maker_fee_rate: dec("-0.0001"),
            taker_fee_rate: dec("0.001"),
            relayer_fee_share_rate: dec("0.4"),
            min_price_tick_size: dec("0.01"),
            min_quantity_tick_size: dec("0.001"),
            min_notional: Decimal::ZERO,
            initial_margin_ratio: Decimal::ZERO,
            base_decimals: 18,
            quote_decimals: 6,
            status: MarketStatus::Active,
            has_disabled_minimal_protocol_fee: false,
        }
    }

    #[test]
    fn test_chain_format() {
        let m = market();
        assert_eq!(m.notional_to_chain_format(dec("1.5")), Some(dec("1500000")));
        assert_eq!(m.quantity_to_chain_format(dec("2")), Some(dec("2000000000000000000")));
        // 10^11 * 10^18 is past Decimal::MAX
        assert_eq!(m.quantity_to_chain_format(dec("100000000000")), None);
    }

    #[test]
    fn test_validate_decimals() {
        let mut m = market();
        assert!(m.validate_decimals().is_ok());

        m.base_decimals = 29;
        assert!(matches!(
            m.validate_decimals(),
            Err(ExchangeError::InvalidMarket { ref reason, .. }) if reason.starts_with("inj declares 29")
        ));
    }

    #[test]
    fn test_margin_denom() {
        let m = market();
        assert_eq!(m.margin_denom(true), "usdt");
        assert_eq!(m.margin_denom(false), "inj");
    }

    #[test]
    fn test_validate_fees_accepts_covered_rebate() {
        // 0.001 * 0.6 - 0.0001 = 0.0005 >= 0.00005
        assert!(market().validate_fees(dec("0.00005"), None).is_ok());
    }

    #[test]
    fn test_validate_fees_rejects_uncovered_rebate() {
        let mut m = market();
        m.maker_fee_rate = dec("-0.0006");
        let err = m.validate_fees(dec("0.00005"), None).unwrap_err();
        assert!(matches!(err, FeeConfigError::BelowMinimalProtocolFee { .. }));
    }

    #[test]
    fn test_disabled_minimal_protocol_fee() {
        let mut m = market();
        m.maker_fee_rate = dec("-0.0006");
        m.has_disabled_minimal_protocol_fee = true;
        assert!(m.validate_fees(dec("0.00005"), None).is_ok());
    }

    #[test]
    fn test_validate_fees_rejects_out_of_range() {
        let mut m = market();
        m.relayer_fee_share_rate = dec("1.5");
        assert!(matches!(
            m.validate_fees(Decimal::ZERO, None),
            Err(FeeConfigError::RateOutOfRange(_))
        ));
    }
}
