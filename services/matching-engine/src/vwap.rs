//! Volume-weighted average price accumulators

use exchange_types::ids::MarketId;
use exchange_types::numeric::quo;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running VWAP of the executions applied so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VwapData {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl VwapData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one execution in. An unset price or a zero quantity leaves the
    /// accumulator unchanged.
    pub fn apply_execution(self, price: Option<Decimal>, quantity: Decimal) -> Self {
        let Some(price) = price else {
            return self;
        };
        if quantity.is_zero() {
            return self;
        }

        let new_quantity = self.quantity + quantity;
        let weighted = self.price * self.quantity + price * quantity;
        match quo(weighted, new_quantity) {
            Some(new_price) => Self {
                price: new_price,
                quantity: new_quantity,
            },
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Per-market VWAP for one block
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VwapInfo(BTreeMap<MarketId, VwapData>);

impl VwapInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch's VWAP sample into the market's accumulator
    pub fn apply_vwap(&mut self, market_id: &MarketId, data: &VwapData) {
        let existing = self.0.entry(market_id.clone()).or_default();
        if !data.quantity.is_zero() {
            *existing = existing.apply_execution(Some(data.price), data.quantity);
        }
    }

    pub fn get(&self, market_id: &MarketId) -> Option<&VwapData> {
        self.0.get(market_id)
    }

    /// Markets in ascending id order
    pub fn sorted_market_ids(&self) -> Vec<MarketId> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MarketId, &VwapData)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_types::numeric::dec;
    use proptest::prelude::*;

    #[test]
    fn test_apply_execution_weights_by_quantity() {
        let vwap = VwapData::new()
            .apply_execution(Some(dec("100")), dec("1"))
            .apply_execution(Some(dec("110")), dec("3"));
        assert_eq!(vwap.price, dec("107.5"));
        assert_eq!(vwap.quantity, dec("4"));
    }

    #[test]
    fn test_apply_execution_ignores_empty() {
        let vwap = VwapData::new().apply_execution(Some(dec("100")), dec("2"));
        assert_eq!(vwap.apply_execution(None, dec("5")), vwap);
        assert_eq!(vwap.apply_execution(Some(dec("90")), Decimal::ZERO), vwap);
    }

    #[test]
    fn test_vwap_info_per_market() {
        let inj = MarketId::new("INJ/USDT");
        let atom = MarketId::new("ATOM/USDT");
        let mut info = VwapInfo::new();
        info.apply_vwap(&inj, &VwapData { price: dec("10"), quantity: dec("2") });
        info.apply_vwap(&inj, &VwapData { price: dec("13"), quantity: dec("1") });
        info.apply_vwap(&atom, &VwapData::new());

        assert_eq!(info.get(&inj).unwrap().price, dec("11"));
        assert!(info.get(&atom).unwrap().is_empty());
        assert_eq!(info.sorted_market_ids(), vec![atom, inj]);
    }

    proptest! {
        #[test]
        fn test_vwap_stays_within_execution_prices(
            executions in prop::collection::vec((1u32..10_000, 1u32..1_000), 1..20)
        ) {
            let mut vwap = VwapData::new();
            for (price, quantity) in &executions {
                vwap = vwap.apply_execution(Some(Decimal::from(*price)), Decimal::from(*quantity));
            }
            let min = executions.iter().map(|(p, _)| *p).min().unwrap();
            let max = executions.iter().map(|(p, _)| *p).max().unwrap();
            // rounding to 18 places may nudge past the bound by one unit
            let tolerance = Decimal::new(1, 17);
            prop_assert!(vwap.price >= Decimal::from(min) - tolerance);
            prop_assert!(vwap.price <= Decimal::from(max) + tolerance);
        }
    }
}
