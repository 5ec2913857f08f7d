//! Matching Engine Service
//!
//! Deterministic uniform-price batch matching for spot and derivative
//! markets, with the fee, discount and settlement rules that turn each
//! matching pass into balance deltas.
//!
//! **Key Invariants:**
//! - Markets are processed in ascending market id, orders in price-time priority
//! - Same inputs produce byte-identical batches (no floats, no hash maps)
//! - Every limit matching pass clears at a single price
//! - Fees, refunds and rewards conserve each denom across all subaccounts
//!
//! # Modules
//! - `book`: resting books, cursors and the per-pass orderbooks
//! - `matching`: market and limit matching passes, clearing prices
//! - `fees`: discount tiers, fee split and volume tracking
//! - `expansion`: per-order balance outcomes of a pass
//! - `batch`: batch execution data handed to the caller
//! - `orders`: order admission checks, holds and cancel refunds
//! - `ledger`: balance ledger contract and an in-memory ledger
//! - `volatility`: trade records and realized volatility
//! - `engine`: block coordinator

pub mod batch;
pub mod book;
pub mod config;
pub mod engine;
pub mod events;
pub mod expansion;
pub mod fees;
pub mod ledger;
pub mod matching;
pub mod orders;
pub mod volatility;
pub mod vwap;

pub use batch::{DerivativeBatchExecutionData, SpotBatchExecutionData};
pub use config::{BatchContext, EngineConfig};
pub use engine::{BlockOutput, ExchangeEngine, SubmittedMarketOrder};
pub use ledger::{BalanceLedger, InMemoryLedger};
pub use orders::OrderRequest;
