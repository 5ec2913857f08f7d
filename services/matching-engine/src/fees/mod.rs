//! Fee and discount engine
//!
//! - `discount`: per-block discount snapshot and the batch view over it
//! - `trade_fee`: fee split, volume and reward points of a single fill
//! - `state`: discount buckets, stakes and tier TTLs kept across blocks

pub mod discount;
pub mod state;
pub mod trade_fee;

pub use discount::{AccountDiscountInputs, FeeDiscountConfig, FeeDiscountStakingInfo};
pub use state::FeeDiscountState;
pub use trade_fee::{trade_fee_data, FillFeeInput};
