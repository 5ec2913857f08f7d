//! Core value types for the exchange
//!
//! Shared by the matching engine and any consumer of its batch outputs.
//! Everything here is plain data plus pure helpers; no module performs I/O.
//!
//! # Modules
//! - `ids`: Addresses, subaccounts, order hashes, market ids
//! - `numeric`: Decimal helpers with fixed division precision
//! - `order`: Order kinds and order types
//! - `market`: Market parameters and fee validation
//! - `fee`: Fee split, discount schedule, volume records
//! - `deposit`: Balance deltas
//! - `rewards`: Trading reward points
//! - `errors`: Error taxonomy

pub mod deposit;
pub mod errors;
pub mod fee;
pub mod ids;
pub mod market;
pub mod numeric;
pub mod order;
pub mod rewards;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::deposit::*;
    pub use crate::errors::*;
    pub use crate::fee::*;
    pub use crate::ids::*;
    pub use crate::market::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::rewards::*;
}
