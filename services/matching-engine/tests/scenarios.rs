//! End-to-end scenarios through the block coordinator
//!
//! Each test drives `ExchangeEngine` the way a chain would: orders during a
//! block, matching at `end_block`, balances read back from the ledger.

mod common;

use common::{engine, init_tracing, order, perp_order, time, trader, PERP, SPOT};
use exchange_types::fee::{FeeDiscountSchedule, FeeDiscountTierInfo};
use exchange_types::ids::{Address, MarketId, SubaccountId};
use exchange_types::numeric::dec;
use exchange_types::order::OrderType;
use matching_engine::events::{ExchangeEvent, ExecutionType};
use matching_engine::volatility::TradeHistoryOptions;
use matching_engine::BalanceLedger;

fn spot() -> MarketId {
    MarketId::new(SPOT)
}

fn relayer() -> SubaccountId {
    SubaccountId::new(Address::repeat(0xfe), 0)
}

#[test]
fn test_scenario_limit_crossing() {
    init_tracing();
    let mut engine = engine(2);
    let maker = engine
        .submit_spot_limit_order(order(SPOT, 1, OrderType::SellPostOnly, "100", "10"))
        .unwrap();
    let taker = engine
        .submit_spot_limit_order(order(SPOT, 2, OrderType::Buy, "101", "10"))
        .unwrap();

    let output = engine.end_block();
    assert_eq!(output.spot_batches.len(), 1);
    let batch = &output.spot_batches[0];
    assert_eq!(batch.clearing.price, Some(dec("100")));
    assert_eq!(batch.clearing.quantity, dec("10"));
    assert_eq!(batch.trade_count(), 2);

    let resting_trades: Vec<_> = batch
        .limit_order_execution_events
        .iter()
        .filter(|e| e.execution_type == ExecutionType::LimitMatchRestingOrder)
        .flat_map(|e| &e.trades)
        .collect();
    assert_eq!(resting_trades.len(), 1);
    assert_eq!(resting_trades[0].order_hash, maker);
    assert_eq!(resting_trades[0].price, dec("100"));
    assert_eq!(resting_trades[0].quantity, dec("10"));

    let ledger = engine.ledger();
    // taker: 100 * 10 * 1.002
    assert_eq!(ledger.total_balance(&trader(2), "usdt"), dec("998998"));
    assert_eq!(ledger.available_balance(&trader(2), "usdt"), dec("998998"));
    assert_eq!(ledger.total_balance(&trader(2), "inj"), dec("1000010"));
    // maker: 100 * 10 * 0.999
    assert_eq!(ledger.total_balance(&trader(1), "usdt"), dec("1000999"));
    assert_eq!(ledger.total_balance(&trader(1), "inj"), dec("999990"));
    assert_eq!(ledger.available_balance(&trader(1), "inj"), dec("999990"));
    // 40% of the 3 in fees to the relayer, the rest to the auction
    assert_eq!(ledger.total_balance(&relayer(), "usdt"), dec("1.2"));
    assert_eq!(ledger.total_balance(&SubaccountId::AUCTION, "usdt"), dec("1.8"));

    assert!(engine.spot_order(&spot(), &maker).is_none());
    assert!(engine.spot_order(&spot(), &taker).is_none());
    let book = engine.orderbook(&spot(), 10).unwrap();
    assert!(book.buys.is_empty() && book.sells.is_empty());
}

#[test]
fn test_scenario_no_cross() {
    init_tracing();
    let mut engine = engine(2);
    let sell = engine
        .submit_spot_limit_order(order(SPOT, 1, OrderType::SellPostOnly, "100", "5"))
        .unwrap();
    let buy = engine
        .submit_spot_limit_order(order(SPOT, 2, OrderType::Buy, "99", "5"))
        .unwrap();

    let output = engine.end_block();
    assert_eq!(output.trade_count(), 0);
    // the market ran a pass, so it has an entry, but nothing traded
    assert!(output.vwap_info.get(&spot()).unwrap().is_empty());
    assert!(output.spot_batches[0].new_orders_event.is_some());

    assert_eq!(engine.spot_order(&spot(), &sell).unwrap().fillable, dec("5"));
    assert_eq!(engine.spot_order(&spot(), &buy).unwrap().fillable, dec("5"));
    let resting = engine.resting_order(&spot(), &buy).unwrap();
    assert!(resting.is_buy() && !resting.is_derivative());
    assert_eq!(resting.fillable(), dec("5"));
    let top = engine.top_of_book(&spot()).unwrap();
    assert_eq!(top.best_buy, Some(dec("99")));
    assert_eq!(top.best_sell, Some(dec("100")));

    // the resting buy keeps only the maker part of its fee hold: 99 * 5 * 1.001
    assert_eq!(engine.ledger().available_balance(&trader(2), "usdt"), dec("999504.505"));
}

#[test]
fn test_scenario_fee_discount_tier() {
    init_tracing();
    let mut engine = engine(2);
    engine
        .set_fee_discount_schedule(FeeDiscountSchedule {
            bucket_count: 28,
            bucket_duration: 86_400,
            quote_denoms: vec!["usdt".to_string()],
            tier_infos: vec![FeeDiscountTierInfo {
                maker_discount_rate: dec("0.5"),
                taker_discount_rate: dec("0.5"),
                staked_amount: dec("100"),
                volume: dec("1000"),
            }],
            disqualified_market_ids: Vec::new(),
        })
        .unwrap();
    engine.set_staked_amount(Address::repeat(1), dec("100"));

    engine
        .submit_spot_limit_order(order(SPOT, 1, OrderType::SellPostOnly, "100", "10"))
        .unwrap();
    engine
        .submit_spot_limit_order(order(SPOT, 2, OrderType::Buy, "100", "10"))
        .unwrap();
    let output = engine.end_block();

    let maker_fee = output.spot_batches[0]
        .limit_order_execution_events
        .iter()
        .filter(|e| e.execution_type == ExecutionType::LimitMatchRestingOrder)
        .flat_map(|e| &e.trades)
        .map(|t| t.fee)
        .next();
    // maker rate 0.001 halved by tier one
    assert_eq!(maker_fee, Some(dec("0.5")));
    assert_eq!(engine.ledger().total_balance(&trader(1), "usdt"), dec("1000999.5"));
    // no stake, no discount
    assert_eq!(engine.ledger().total_balance(&trader(2), "usdt"), dec("998998"));

    let tier = engine.fee_discount_state().account_tier_ttl(&Address::repeat(1)).unwrap();
    assert_eq!(tier.tier, 1);
}

#[test]
fn test_market_orders_run_before_limit_pass() {
    init_tracing();
    let mut engine = engine(3);
    engine
        .submit_spot_limit_order(order(SPOT, 1, OrderType::SellPostOnly, "100", "5"))
        .unwrap();
    engine
        .submit_spot_market_order(order(SPOT, 2, OrderType::Buy, "100", "5"))
        .unwrap();
    // would cross the same resting sell; the market order takes it first
    let late = engine
        .submit_spot_limit_order(order(SPOT, 3, OrderType::Buy, "100", "5"))
        .unwrap();

    let output = engine.end_block();
    assert_eq!(output.spot_batches.len(), 2);
    assert!(output.spot_batches[0].market_order_execution_event.is_some());
    assert_eq!(output.spot_batches[1].trade_count(), 0);
    assert_eq!(engine.spot_order(&spot(), &late).unwrap().fillable, dec("5"));

    let executions: Vec<ExecutionType> = output
        .events
        .iter()
        .filter_map(|e| match e {
            ExchangeEvent::BatchSpotExecution(e) => Some(e.execution_type),
            _ => None,
        })
        .collect();
    // the limit pass traded nothing and emits no execution
    assert_eq!(executions, vec![ExecutionType::Market]);
}

#[test]
fn test_derivative_and_spot_in_one_block() {
    init_tracing();
    let mut engine = engine(2);
    engine
        .submit_spot_limit_order(order(SPOT, 1, OrderType::SellPostOnly, "100", "1"))
        .unwrap();
    engine
        .submit_spot_limit_order(order(SPOT, 2, OrderType::Buy, "100", "1"))
        .unwrap();
    engine
        .submit_derivative_limit_order(perp_order(1, OrderType::SellPostOnly, "50", "2", "10"))
        .unwrap();
    engine
        .submit_derivative_limit_order(perp_order(2, OrderType::Buy, "50", "2", "10"))
        .unwrap();

    let output = engine.end_block();
    assert_eq!(output.spot_batches.len(), 1);
    assert_eq!(output.derivative_batches.len(), 1);
    assert_eq!(output.derivative_batches[0].total_position_margin(), dec("20"));

    // markets run in ascending id
    let sequence: Vec<&str> = output
        .events
        .iter()
        .filter_map(|e| match e {
            ExchangeEvent::BatchSpotExecution(e) => Some(e.market_id.as_str()),
            ExchangeEvent::BatchDerivativeExecution(e) => Some(e.market_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sequence.first(), Some(&SPOT));
    assert_eq!(sequence.last(), Some(&PERP));

    assert_eq!(output.vwap_info.get(&MarketId::new(PERP)).unwrap().price, dec("50"));
}

#[test]
fn test_volatility_from_block_vwaps() {
    init_tracing();
    let mut engine = engine(2);
    for (block, (price, seconds)) in [("100", 0), ("104", 20), ("96", 40)].into_iter().enumerate() {
        if block > 0 {
            engine.begin_block(block as i64 + 1, time(seconds));
        }
        engine
            .submit_spot_limit_order(order(SPOT, 1, OrderType::SellPostOnly, price, "1"))
            .unwrap();
        engine
            .submit_spot_limit_order(order(SPOT, 2, OrderType::Buy, price, "1"))
            .unwrap();
        engine.end_block();
    }

    let options = TradeHistoryOptions {
        include_metadata: true,
        include_raw_history: true,
        ..Default::default()
    };
    let volatility = engine.market_volatility(&spot(), &options);
    assert_eq!(volatility.raw_history.as_ref().map(Vec::len), Some(3));
    let metadata = volatility.metadata.unwrap();
    assert_eq!(metadata.group_count, 3);
    assert_eq!(metadata.min_price, dec("96"));
    assert_eq!(metadata.max_price, dec("104"));
    assert_eq!(metadata.median_price, dec("100"));
    // prices 100, 104, 96 around a mean of 100
    assert_eq!(volatility.volatility.unwrap().round_dp(6), dec("3.265986"));
}
