//! Matching logic module
//!
//! Uniform-price batch matching: limit-against-limit passes and market order
//! passes, plus the clearing price rules they share.

pub mod clearing;
pub mod crossing;
pub mod limit;
pub mod market;

pub use clearing::{mid_price_or_best_price, select_clearing_price, ClearingResult};
pub use crossing::{can_match, crosses_top_of_book};
pub use limit::{match_limit_orders, LimitMatchingResult};
pub use market::{match_market_orders, MarketMatchingResult};
