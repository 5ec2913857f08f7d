//! Historical trade records and realized volatility
//!
//! Every block with executions appends one record per market, built from
//! the market's VWAP for that block. Records older than the configured max
//! age are pruned on append and at cleanup. Volatility is the
//! quantity-weighted standard deviation of prices after grouping records
//! that fall within the grouping window.

use std::collections::BTreeMap;

use exchange_types::ids::MarketId;
use exchange_types::numeric::{midpoint, quo, PRECISION};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::vwap::VwapInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unix seconds
    pub timestamp: i64,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Query parameters; zero values fall back to the engine defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeHistoryOptions {
    pub trade_grouping_sec: i64,
    /// Only records newer than `block_time - max_age` count; 0 keeps all
    pub max_age: i64,
    pub include_raw_history: bool,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStatistics {
    pub group_count: usize,
    pub records_sample_size: usize,
    /// VWAP over the grouped records
    pub mean: Decimal,
    pub twap: Decimal,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub median_price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketVolatility {
    /// `None` when no records exist or the deviation is undefined
    pub volatility: Option<Decimal>,
    pub raw_history: Option<Vec<TradeRecord>>,
    pub metadata: Option<MetadataStatistics>,
}

/// Trade records of every market, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeRecords {
    records: BTreeMap<MarketId, Vec<TradeRecord>>,
}

impl TradeRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, dropping those older than `max_age` relative to it
    pub fn append(&mut self, market_id: &MarketId, record: TradeRecord, max_age: i64) {
        let records = self.records.entry(market_id.clone()).or_default();
        let from = record.timestamp - max_age;
        records.retain(|r| r.timestamp >= from);
        records.push(record);
    }

    /// Record one block's VWAP for every market that traded
    pub fn append_vwap_info(&mut self, vwap_info: &VwapInfo, block_time: i64, max_age: i64) {
        for (market_id, vwap) in vwap_info.iter() {
            if vwap.is_empty() {
                continue;
            }
            self.append(
                market_id,
                TradeRecord {
                    timestamp: block_time,
                    price: vwap.price,
                    quantity: vwap.quantity,
                },
                max_age,
            );
        }
    }

    /// Prune records older than `block_time - max_age` in every market
    pub fn cleanup(&mut self, block_time: i64, max_age: i64) {
        let before = block_time - max_age;
        for (market_id, records) in self.records.iter_mut() {
            let len = records.len();
            records.retain(|r| r.timestamp >= before);
            if records.len() != len {
                debug!(market_id = %market_id, pruned = len - records.len(), "pruned trade records");
            }
        }
        self.records.retain(|_, records| !records.is_empty());
    }

    /// Records of a market with `timestamp >= from`
    pub fn records_since(&self, market_id: &MarketId, from: i64) -> Vec<TradeRecord> {
        self.records
            .get(market_id)
            .map(|records| records.iter().filter(|r| r.timestamp >= from).copied().collect())
            .unwrap_or_default()
    }

    /// Realized volatility of a market as of `block_time`
    pub fn market_volatility(
        &self,
        market_id: &MarketId,
        block_time: i64,
        options: &TradeHistoryOptions,
        default_grouping_sec: i64,
    ) -> MarketVolatility {
        let from = if options.max_age > 0 {
            block_time - options.max_age
        } else {
            0
        };
        let grouping_sec = if options.trade_grouping_sec > 0 {
            options.trade_grouping_sec
        } else {
            default_grouping_sec
        };

        let trades = self.records_since(market_id, from);
        if trades.is_empty() {
            return MarketVolatility::default();
        }

        let grouped = group_records(&trades, grouping_sec);
        MarketVolatility {
            volatility: standard_deviation(&grouped),
            metadata: options.include_metadata.then(|| statistics(&trades, &grouped)).flatten(),
            raw_history: options.include_raw_history.then_some(trades),
        }
    }
}

/// Merge consecutive records closer than `seconds` to the start of their
/// group. A merged group keeps the first timestamp and the quantity-weighted
/// price.
pub fn group_records(records: &[TradeRecord], seconds: i64) -> Vec<TradeRecord> {
    let mut grouped: Vec<TradeRecord> = Vec::with_capacity(records.len());
    for record in records {
        match grouped.last_mut() {
            Some(last) if record.timestamp - last.timestamp < seconds => {
                let quantity = last.quantity + record.quantity;
                let notional = last.price * last.quantity + record.price * record.quantity;
                last.price = quo(notional, quantity).unwrap_or(record.price);
                last.quantity = quantity;
            }
            _ => grouped.push(*record),
        }
    }
    grouped
}

/// Quantity-weighted mean price; zero for no records or no quantity
pub fn mean(records: &[TradeRecord]) -> Decimal {
    let (notional, quantity) = totals(records);
    quo(notional, quantity).unwrap_or_default()
}

fn totals(records: &[TradeRecord]) -> (Decimal, Decimal) {
    records.iter().fold((Decimal::ZERO, Decimal::ZERO), |(notional, quantity), r| {
        (notional + r.price * r.quantity, quantity + r.quantity)
    })
}

/// Quantity-weighted standard deviation of prices.
///
/// A single record has zero deviation; records without quantity have none.
pub fn standard_deviation(records: &[TradeRecord]) -> Option<Decimal> {
    if records.len() == 1 {
        return Some(Decimal::ZERO);
    }

    let mean = mean(records);
    let (scaled_sum, quantity) = records.iter().fold((Decimal::ZERO, Decimal::ZERO), |(sum, quantity), r| {
        let deviation = r.price - mean;
        (sum + r.quantity * deviation * deviation, quantity + r.quantity)
    });

    let variance = quo(scaled_sum, quantity)?;
    variance.sqrt().map(|sd| sd.round_dp(PRECISION))
}

/// Summary statistics over raw records and their grouping
pub fn statistics(records: &[TradeRecord], grouped: &[TradeRecord]) -> Option<MetadataStatistics> {
    let first = records.first()?;
    let last = records.last()?;

    let twap_sum: Decimal = grouped
        .windows(2)
        .map(|pair| pair[1].price * Decimal::from(pair[1].timestamp - pair[0].timestamp))
        .sum();

    let mut by_price = records.to_vec();
    by_price.sort_by(|a, b| a.price.cmp(&b.price));
    let count = by_price.len();
    let upper = by_price[count / 2].price;
    let median_price = if count % 2 == 0 {
        midpoint(by_price[count / 2 - 1].price, upper)
    } else {
        upper
    };

    let twap = if count > 1 {
        quo(twap_sum, Decimal::from(last.timestamp - first.timestamp)).unwrap_or_default()
    } else {
        Decimal::ZERO
    };

    Some(MetadataStatistics {
        group_count: grouped.len(),
        records_sample_size: count,
        mean: mean(grouped),
        twap,
        first_timestamp: first.timestamp,
        last_timestamp: last.timestamp,
        min_price: by_price[0].price,
        max_price: by_price[count - 1].price,
        median_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vwap::VwapData;
    use exchange_types::numeric::dec;

    fn record(timestamp: i64, price: &str, quantity: &str) -> TradeRecord {
        TradeRecord {
            timestamp,
            price: dec(price),
            quantity: dec(quantity),
        }
    }

    #[test]
    fn test_grouping_merges_within_window() {
        let records = vec![
            record(100, "10", "1"),
            record(105, "13", "2"),
            record(120, "20", "1"),
            record(140, "30", "1"),
        ];
        let grouped = group_records(&records, 15);
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0], record(100, "12", "3"));
        assert_eq!(grouped[1], record(120, "20", "1"));
        assert_eq!(grouped[2], record(140, "30", "1"));
    }

    #[test]
    fn test_standard_deviation() {
        assert_eq!(standard_deviation(&[record(1, "10", "1")]), Some(Decimal::ZERO));

        // mean 12, variance (4 + 4) / 2
        let records = vec![record(1, "10", "1"), record(2, "14", "1")];
        assert_eq!(standard_deviation(&records), Some(dec("2")));

        // weights shift the mean to 13: (1 * 9 + 3 * 1) / 4 = 3
        let weighted = vec![record(1, "10", "1"), record(2, "14", "3")];
        let sd = standard_deviation(&weighted).unwrap();
        assert!((sd - dec("1.732050807568877294")).abs() < dec("0.000000000000000002"));

        let empty = vec![record(1, "10", "0"), record(2, "14", "0")];
        assert_eq!(standard_deviation(&empty), None);
    }

    #[test]
    fn test_statistics() {
        let records = vec![
            record(100, "10", "1"),
            record(105, "16", "1"),
            record(120, "12", "2"),
            record(140, "14", "1"),
        ];
        let grouped = group_records(&records, 15);
        let stats = statistics(&records, &grouped).unwrap();

        assert_eq!(stats.records_sample_size, 4);
        assert_eq!(stats.group_count, 3);
        assert_eq!(stats.min_price, dec("10"));
        assert_eq!(stats.max_price, dec("16"));
        assert_eq!(stats.median_price, dec("13"));
        assert_eq!(stats.first_timestamp, 100);
        assert_eq!(stats.last_timestamp, 140);
        // groups: 13 @ 100, 12 @ 120, 14 @ 140
        assert_eq!(stats.mean, dec("12.8"));
        // (12 * 20 + 14 * 20) / 40
        assert_eq!(stats.twap, dec("13"));
    }

    #[test]
    fn test_append_prunes_old_records() {
        let market = MarketId::new("INJ/USDT");
        let mut history = TradeRecords::new();
        history.append(&market, record(100, "10", "1"), 300);
        history.append(&market, record(350, "11", "1"), 300);
        history.append(&market, record(401, "12", "1"), 300);

        let records = history.records_since(&market, 0);
        assert_eq!(records, vec![record(350, "11", "1"), record(401, "12", "1")]);

        history.cleanup(800, 300);
        assert!(history.records_since(&market, 0).is_empty());
    }

    #[test]
    fn test_market_volatility_from_vwap() {
        let market = MarketId::new("INJ/USDT");
        let idle = MarketId::new("ATOM/USDT");
        let mut history = TradeRecords::new();

        for (time, price) in [(100, "10"), (130, "14")] {
            let mut vwap = VwapInfo::new();
            vwap.apply_vwap(&market, &VwapData { price: dec(price), quantity: dec("1") });
            vwap.apply_vwap(&idle, &VwapData::new());
            history.append_vwap_info(&vwap, time, 300);
        }

        let options = TradeHistoryOptions {
            include_raw_history: true,
            include_metadata: true,
            ..TradeHistoryOptions::default()
        };
        let result = history.market_volatility(&market, 130, &options, 15);
        assert_eq!(result.volatility, Some(dec("2")));
        assert_eq!(result.raw_history.map(|r| r.len()), Some(2));
        assert_eq!(result.metadata.map(|m| m.group_count), Some(2));

        // one wide window folds both records into a single group
        let grouped = TradeHistoryOptions {
            trade_grouping_sec: 60,
            ..TradeHistoryOptions::default()
        };
        assert_eq!(history.market_volatility(&market, 130, &grouped, 15).volatility, Some(Decimal::ZERO));

        assert_eq!(history.market_volatility(&idle, 130, &options, 15), MarketVolatility::default());
    }
}
