//! Error types for the exchange core
//!
//! Every error is a deterministic function of input state; nothing here is
//! retried.

use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Fee configuration error: {0}")]
    FeeConfig(#[from] FeeConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Market not found: {market_id}")]
    MarketNotFound { market_id: String },

    #[error("Market not active: {market_id}")]
    MarketNotActive { market_id: String },

    #[error("Market type mismatch for {market_id}: expected {expected}")]
    MarketTypeMismatch { market_id: String, expected: String },

    #[error("Market already exists: {market_id}")]
    MarketExists { market_id: String },

    #[error("Invalid market {market_id}: {reason}")]
    InvalidMarket { market_id: String, reason: String },
}

/// Input validation errors, raised before any matching occurs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Price {price} is not a multiple of tick size {tick}")]
    PriceTick { price: String, tick: String },

    #[error("Quantity {quantity} is not a multiple of tick size {tick}")]
    QuantityTick { quantity: String, tick: String },

    #[error("Notional {notional} below minimum {min_notional}")]
    BelowMinNotional { notional: String, min_notional: String },

    #[error("Expiration block {expiration_block} must be higher than current block {block_height}")]
    InvalidExpirationBlock { expiration_block: i64, block_height: i64 },

    #[error("Market orders cannot have an expiration block")]
    MarketOrderExpiration,

    #[error("Derivative orders cannot have an expiration block")]
    DerivativeOrderExpiration,

    #[error("Client order id already exists: {cid}")]
    DuplicateCid { cid: String },

    #[error("Post-only order crosses top of book")]
    ExceedsTopOfBookPrice,

    #[error("Market orders are not accepted in post-only mode")]
    PostOnlyMode,

    #[error("No liquidity on the opposite side")]
    NoLiquidity,

    #[error("Worst price {worst_price} exceeds best available price {best_price}")]
    SlippageExceedsWorstPrice { worst_price: String, best_price: String },

    #[error("Invalid margin: {0}")]
    InvalidMargin(String),

    #[error("Order amount out of range: {0}")]
    AmountOverflow(String),

    #[error("Order not found: {order_hash}")]
    NotFound { order_hash: String },
}

/// Invariant violations detected while filling an orderbook
///
/// These never occur from validated input. Callers log them and skip the
/// offending fill.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FillError {
    #[error("Fill of {requested} exceeds remaining quantity {remaining}")]
    ExceedsFillable { requested: String, remaining: String },

    #[error("Fill against an exhausted orderbook")]
    Exhausted,

    #[error("Fill against a closed orderbook")]
    Closed,

    #[error("Negative fill quantity {0}")]
    NegativeQuantity(String),
}

/// Fee parameter and discount schedule errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeConfigError {
    #[error("Maker fee rate {maker} exceeds taker fee rate {taker}")]
    MakerAboveTaker { maker: String, taker: String },

    #[error("Net protocol fee {net} below minimal protocol fee rate {minimal}")]
    BelowMinimalProtocolFee { net: String, minimal: String },

    #[error("Fee rate out of range: {0}")]
    RateOutOfRange(String),

    #[error("Invalid discount schedule: {0}")]
    InvalidSchedule(String),
}

/// Balance ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient funds for {denom}: required {required}, available {available}")]
    InsufficientFunds {
        denom: String,
        required: String,
        available: String,
    },

    #[error("Negative amount: {0}")]
    NegativeAmount(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidPrice("negative".to_string());
        assert_eq!(err.to_string(), "Invalid price: negative");
    }

    #[test]
    fn test_ledger_error_insufficient_funds() {
        let err = LedgerError::InsufficientFunds {
            denom: "usdt".to_string(),
            required: "1.5".to_string(),
            available: "1.0".to_string(),
        };
        assert!(err.to_string().contains("usdt"));
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_exchange_error_from_order_error() {
        let engine_err: ExchangeError = OrderError::NoLiquidity.into();
        assert!(matches!(engine_err, ExchangeError::Order(_)));
    }

    #[test]
    fn test_fill_error_display() {
        let err = FillError::ExceedsFillable {
            requested: "2".to_string(),
            remaining: "1".to_string(),
        };
        assert_eq!(err.to_string(), "Fill of 2 exceeds remaining quantity 1");
    }
}
