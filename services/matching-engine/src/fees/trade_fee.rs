//! Per-fill fee computation
//!
//! Every fill goes through [`trade_fee_data`]: the fee rate is discounted for
//! the trader, the fee is split between trader, fee recipient and auction,
//! the fill's notional is recorded as volume and reward points are accrued.

use exchange_types::fee::{order_fill_fee_info, TradeFeeData};
use exchange_types::ids::SubaccountId;
use rust_decimal::Decimal;

use super::discount::FeeDiscountConfig;

/// Inputs describing one side of one fill
#[derive(Debug, Clone, Copy)]
pub struct FillFeeInput {
    pub subaccount_id: SubaccountId,
    pub fill_quantity: Decimal,
    /// `None` when the pass produced no clearing price
    pub execution_price: Option<Decimal>,
    pub trade_fee_rate: Decimal,
    pub relayer_fee_share_rate: Decimal,
    pub points_multiplier: Decimal,
    pub is_maker: bool,
}

/// Fee data for a fill, buffering its volume contribution in `config`.
///
/// A zero fill yields empty fee data that still carries the discounted rate,
/// which refund computations need.
pub fn trade_fee_data(config: &mut FeeDiscountConfig<'_>, input: &FillFeeInput) -> TradeFeeData {
    let discounted_trade_fee_rate =
        config.discounted_trade_fee_rate(input.trade_fee_rate, input.is_maker, &input.subaccount_id.address());

    let execution_price = match input.execution_price {
        Some(price) if !input.fill_quantity.is_zero() => price,
        _ => return TradeFeeData::empty(discounted_trade_fee_rate),
    };

    let order_fill_notional = input.fill_quantity * execution_price;
    let (total_trade_fee, trader_fee, fee_recipient_reward, auction_fee_reward) =
        order_fill_fee_info(order_fill_notional, discounted_trade_fee_rate, input.relayer_fee_share_rate);

    config.increment_volume_contribution(input.subaccount_id, order_fill_notional, input.is_maker);

    TradeFeeData {
        total_trade_fee,
        trader_fee,
        trading_reward_points: (order_fill_notional * input.points_multiplier).abs(),
        fee_recipient_reward,
        auction_fee_reward,
        discounted_trade_fee_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::discount::FeeDiscountStakingInfo;
    use exchange_types::ids::{Address, MarketId};
    use exchange_types::numeric::dec;

    fn input(fill: &str, price: Option<&str>, rate: &str, is_maker: bool) -> FillFeeInput {
        FillFeeInput {
            subaccount_id: SubaccountId::new(Address::repeat(3), 0),
            fill_quantity: dec(fill),
            execution_price: price.map(dec),
            trade_fee_rate: dec(rate),
            relayer_fee_share_rate: dec("0.4"),
            points_multiplier: dec("1"),
            is_maker,
        }
    }

    #[test]
    fn test_taker_fee() {
        let mut info = FeeDiscountStakingInfo::without_schedule();
        let mut config = FeeDiscountConfig::new(MarketId::new("INJ/USDT"), false, &mut info);

        let data = trade_fee_data(&mut config, &input("10", Some("100"), "0.002", false));
        assert_eq!(data.total_trade_fee, dec("2"));
        assert_eq!(data.trader_fee, dec("2"));
        assert_eq!(data.fee_recipient_reward, dec("0.8"));
        assert_eq!(data.auction_fee_reward, dec("1.2"));
        assert_eq!(data.trading_reward_points, dec("1000"));
        assert_eq!(data.discounted_trade_fee_rate, dec("0.002"));
    }

    #[test]
    fn test_zero_fill_keeps_rate() {
        let mut info = FeeDiscountStakingInfo::without_schedule();
        let mut config = FeeDiscountConfig::new(MarketId::new("INJ/USDT"), false, &mut info);

        let data = trade_fee_data(&mut config, &input("0", Some("100"), "0.002", false));
        assert_eq!(data, TradeFeeData::empty(dec("0.002")));

        let no_price = trade_fee_data(&mut config, &input("5", None, "0.002", false));
        assert_eq!(no_price.total_trade_fee, Decimal::ZERO);
        let (subaccounts, _) = info.sorted_subaccount_and_market_volumes();
        assert!(subaccounts.is_empty());
    }

    #[test]
    fn test_maker_rebate_split() {
        let mut info = FeeDiscountStakingInfo::without_schedule();
        let mut config = FeeDiscountConfig::new(MarketId::new("INJ/USDT"), false, &mut info);

        let data = trade_fee_data(&mut config, &input("10", Some("100"), "-0.0001", true));
        assert_eq!(data.total_trade_fee, dec("-0.1"));
        assert_eq!(data.trader_fee, dec("-0.06"));
        assert_eq!(data.auction_fee_reward, dec("-0.1"));

        let (subaccounts, _) = info.sorted_subaccount_and_market_volumes();
        assert_eq!(subaccounts[0].volume.maker_volume, dec("1000"));
    }
}
