//! Fixtures shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use exchange_types::ids::{Address, MarketId, SubaccountId};
use exchange_types::market::{Market, MarketStatus, MarketType};
use exchange_types::numeric::dec;
use exchange_types::order::{OrderInfo, OrderType};
use matching_engine::{EngineConfig, ExchangeEngine, OrderRequest};
use rust_decimal::Decimal;

pub const SPOT: &str = "INJ/USDT";
pub const PERP: &str = "INJ/USDT PERP";
pub const FUNDING: &str = "1000000";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn spot_market() -> Market {
    Market {
        market_id: MarketId::new(SPOT),
        market_type: MarketType::Spot,
        ticker: SPOT.to_string(),
        base_denom: "inj".to_string(),
        quote_denom: "usdt".to_string(),
        maker_fee_rate: dec("0.001"),
        taker_fee_rate: dec("0.002"),
        relayer_fee_share_rate: dec("0.4"),
        min_price_tick_size: dec("0.001"),
        min_quantity_tick_size: dec("0.001"),
        min_notional: Decimal::ZERO,
        initial_margin_ratio: Decimal::ZERO,
        base_decimals: 0,
        quote_decimals: 0,
        status: MarketStatus::Active,
        has_disabled_minimal_protocol_fee: false,
    }
}

pub fn perp_market() -> Market {
    Market {
        market_id: MarketId::new(PERP),
        market_type: MarketType::Derivative,
        ticker: PERP.to_string(),
        base_denom: String::new(),
        initial_margin_ratio: dec("0.05"),
        ..spot_market()
    }
}

pub fn trader(n: u8) -> SubaccountId {
    SubaccountId::new(Address::repeat(n), 0)
}

pub fn time(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
}

/// Engine at block 1 with both markets; traders 1..=traders funded with
/// `FUNDING` inj and usdt each
pub fn engine(traders: u8) -> ExchangeEngine {
    let mut engine = ExchangeEngine::new(EngineConfig::default());
    engine.add_market(spot_market()).unwrap();
    engine.add_market(perp_market()).unwrap();
    fund(&mut engine, traders);
    engine.begin_block(1, time(0));
    engine
}

pub fn fund(engine: &mut ExchangeEngine, traders: u8) {
    for n in 1..=traders {
        for denom in ["inj", "usdt"] {
            engine.ledger_mut().deposit(trader(n), denom, dec(FUNDING)).unwrap();
        }
    }
}

pub fn order(market: &str, n: u8, order_type: OrderType, price: &str, quantity: &str) -> OrderRequest {
    OrderRequest {
        market_id: MarketId::new(market),
        order_info: OrderInfo {
            subaccount_id: trader(n),
            fee_recipient: Address::repeat(0xfe),
            price: dec(price),
            quantity: dec(quantity),
            cid: String::new(),
        },
        order_type,
        margin: Decimal::ZERO,
        expiration_block: 0,
    }
}

pub fn perp_order(n: u8, order_type: OrderType, price: &str, quantity: &str, margin: &str) -> OrderRequest {
    OrderRequest {
        margin: dec(margin),
        ..order(PERP, n, order_type, price, quantity)
    }
}
