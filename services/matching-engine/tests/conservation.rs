//! Balance conservation under random order flow
//!
//! Limit and post-only orders, cancels and block boundaries in random order.
//! Fees only move funds between subaccounts, so the total of every denom is
//! fixed, and once every order is gone nothing stays locked. On the
//! derivative market the margin moved into positions is counted alongside
//! the quote balances.

mod common;

use common::{engine, order, perp_order, time, trader, FUNDING, PERP, SPOT};
use exchange_types::ids::{MarketId, OrderHash, SubaccountId};
use exchange_types::numeric::dec;
use exchange_types::order::OrderType;
use matching_engine::{BalanceLedger, BlockOutput, ExchangeEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;

const TRADERS: u8 = 4;

#[derive(Debug, Clone)]
enum Action {
    Limit {
        trader: u8,
        is_buy: bool,
        post_only: bool,
        price: u32,
        quantity: u32,
    },
    Cancel(usize),
    EndBlock,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        5 => (1..=TRADERS, any::<bool>(), any::<bool>(), 95u32..=105, 1u32..=10).prop_map(
            |(trader, is_buy, post_only, price, quantity)| Action::Limit {
                trader,
                is_buy,
                post_only,
                price,
                quantity,
            }
        ),
        2 => any::<usize>().prop_map(Action::Cancel),
        1 => Just(Action::EndBlock),
    ]
}

fn order_type(is_buy: bool, post_only: bool) -> OrderType {
    match (is_buy, post_only) {
        (true, false) => OrderType::Buy,
        (true, true) => OrderType::BuyPostOnly,
        (false, false) => OrderType::Sell,
        (false, true) => OrderType::SellPostOnly,
    }
}

fn check_balances(engine: &ExchangeEngine) -> Result<(), TestCaseError> {
    let expected = dec(FUNDING) * Decimal::from(TRADERS);
    for denom in ["inj", "usdt"] {
        prop_assert_eq!(engine.ledger().denom_total(denom), expected, "{} total drifted", denom);
    }
    for ((subaccount_id, denom), deposit) in engine.ledger().iter() {
        prop_assert!(
            deposit.available_balance <= deposit.total_balance,
            "{} {} available {} above total {}",
            subaccount_id,
            denom,
            deposit.available_balance,
            deposit.total_balance
        );
        prop_assert!(deposit.available_balance >= Decimal::ZERO);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_spot_order_flow_conserves_balances(actions in prop::collection::vec(action(), 1..80)) {
        let market_id = MarketId::new(SPOT);
        let mut engine = engine(TRADERS);
        let mut height = 1;
        let mut submitted: Vec<(SubaccountId, OrderHash)> = Vec::new();

        for action in actions {
            match action {
                Action::Limit { trader: n, is_buy, post_only, price, quantity } => {
                    let request = order(
                        SPOT,
                        n,
                        order_type(is_buy, post_only),
                        &price.to_string(),
                        &quantity.to_string(),
                    );
                    // post-only orders crossing the book are rejected
                    if let Ok(hash) = engine.submit_spot_limit_order(request) {
                        submitted.push((trader(n), hash));
                    }
                }
                Action::Cancel(index) => {
                    if !submitted.is_empty() {
                        let (subaccount_id, hash) = submitted[index % submitted.len()];
                        let _ = engine.cancel_spot_order(&market_id, subaccount_id, &hash);
                    }
                }
                Action::EndBlock => {
                    engine.end_block();
                    height += 1;
                    engine.begin_block(height, time(height * 5));
                }
            }
            check_balances(&engine)?;
        }

        engine.end_block();
        for (subaccount_id, hash) in &submitted {
            let _ = engine.cancel_spot_order(&market_id, *subaccount_id, hash);
        }
        check_balances(&engine)?;

        prop_assert_eq!(engine.orderbook(&market_id, 100).unwrap().buys.len(), 0);
        prop_assert_eq!(engine.orderbook(&market_id, 100).unwrap().sells.len(), 0);
        for ((subaccount_id, denom), deposit) in engine.ledger().iter() {
            prop_assert_eq!(
                deposit.available_balance,
                deposit.total_balance,
                "{} still has {} locked",
                subaccount_id,
                denom
            );
        }
        for n in 1..=TRADERS {
            let inj = engine.ledger().total_balance(&trader(n), "inj");
            prop_assert!(inj >= Decimal::ZERO);
        }
    }
}

#[derive(Debug, Clone)]
enum PerpAction {
    Limit {
        trader: u8,
        is_buy: bool,
        post_only: bool,
        price: u32,
        quantity: u32,
    },
    Cancel(usize),
    EndBlock,
}

fn perp_action() -> impl Strategy<Value = PerpAction> {
    prop_oneof![
        5 => (1..=TRADERS, any::<bool>(), any::<bool>(), 95u32..=105, 1u32..=10).prop_map(
            |(trader, is_buy, post_only, price, quantity)| PerpAction::Limit {
                trader,
                is_buy,
                post_only,
                price,
                quantity,
            }
        ),
        2 => any::<usize>().prop_map(PerpAction::Cancel),
        1 => Just(PerpAction::EndBlock),
    ]
}

/// About a tenth of the notional, a whole amount per unit so margin shares
/// of partial fills divide exactly
fn perp_margin(price: u32, quantity: u32) -> String {
    (price / 10 * quantity).to_string()
}

fn block_position_margin(output: &BlockOutput) -> Decimal {
    output.derivative_batches.iter().map(|b| b.total_position_margin()).sum()
}

fn check_perp_balances(engine: &ExchangeEngine, position_margin: Decimal) -> Result<(), TestCaseError> {
    let expected = dec(FUNDING) * Decimal::from(TRADERS);
    prop_assert_eq!(
        engine.ledger().denom_total("usdt") + position_margin,
        expected,
        "usdt drifted with {} in positions",
        position_margin
    );
    prop_assert_eq!(engine.ledger().denom_total("inj"), expected);
    for ((subaccount_id, denom), deposit) in engine.ledger().iter() {
        prop_assert!(
            deposit.available_balance <= deposit.total_balance,
            "{} {} available {} above total {}",
            subaccount_id,
            denom,
            deposit.available_balance,
            deposit.total_balance
        );
        prop_assert!(deposit.available_balance >= Decimal::ZERO);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_derivative_order_flow_conserves_margin_and_balances(actions in prop::collection::vec(perp_action(), 1..80)) {
        let market_id = MarketId::new(PERP);
        let mut engine = engine(TRADERS);
        let mut height = 1;
        let mut position_margin = Decimal::ZERO;
        let mut submitted: Vec<(SubaccountId, OrderHash)> = Vec::new();

        for action in actions {
            match action {
                PerpAction::Limit { trader: n, is_buy, post_only, price, quantity } => {
                    let request = perp_order(
                        n,
                        order_type(is_buy, post_only),
                        &price.to_string(),
                        &quantity.to_string(),
                        &perp_margin(price, quantity),
                    );
                    if let Ok(hash) = engine.submit_derivative_limit_order(request) {
                        submitted.push((trader(n), hash));
                    }
                }
                PerpAction::Cancel(index) => {
                    if !submitted.is_empty() {
                        let (subaccount_id, hash) = submitted[index % submitted.len()];
                        let _ = engine.cancel_derivative_order(&market_id, subaccount_id, &hash);
                    }
                }
                PerpAction::EndBlock => {
                    position_margin += block_position_margin(&engine.end_block());
                    height += 1;
                    engine.begin_block(height, time(height * 5));
                }
            }
            check_perp_balances(&engine, position_margin)?;
        }

        position_margin += block_position_margin(&engine.end_block());
        for (subaccount_id, hash) in &submitted {
            let _ = engine.cancel_derivative_order(&market_id, *subaccount_id, hash);
        }
        check_perp_balances(&engine, position_margin)?;

        prop_assert_eq!(engine.orderbook(&market_id, 100).unwrap().buys.len(), 0);
        prop_assert_eq!(engine.orderbook(&market_id, 100).unwrap().sells.len(), 0);
        for ((subaccount_id, denom), deposit) in engine.ledger().iter() {
            prop_assert_eq!(
                deposit.available_balance,
                deposit.total_balance,
                "{} still has {} locked",
                subaccount_id,
                denom
            );
        }
    }
}
