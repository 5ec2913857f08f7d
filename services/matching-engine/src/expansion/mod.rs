//! State expansion builders
//!
//! Turn the fills of a matching pass into per-order balance outcomes.

pub mod derivative;
pub mod spot;

pub use derivative::{DerivativeOrderStateExpansion, PositionDelta};
pub use spot::SpotOrderStateExpansion;
