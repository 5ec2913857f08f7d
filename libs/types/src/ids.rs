//! Identifier types for exchange entities
//!
//! Byte-oriented identifiers order by their raw bytes, which is the order
//! every deterministic output list is sorted by.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Parse a `0x`-prefixed (or bare) hex string of exactly `N` bytes
fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let mut bytes = [0u8; N];
    hex::decode_to_slice(digits, &mut bytes).map_err(|err| match err {
        hex::FromHexError::InvalidHexCharacter { .. } => ParseIdError::InvalidHex(digits.to_string()),
        _ => ParseIdError::Length { expected: N, actual: digits.len() / 2 },
    })?;
    Ok(bytes)
}

/// Error parsing a hex identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("invalid hex digits: {0}")]
    InvalidHex(String),
}

/// Hex string serde for fixed-size byte identifiers, so they can key JSON maps
macro_rules! hex_id {
    ($name:ident, $len:expr) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex::<$len>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Account address (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

hex_id!(Address, 20);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Convenience constructor filling every byte with `byte`
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; 20])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

/// Subaccount identifier: the owning address followed by a 12-byte nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubaccountId([u8; 32]);

hex_id!(SubaccountId, 32);

impl SubaccountId {
    /// Sentinel for "no subaccount"
    pub const ZERO: SubaccountId = SubaccountId([0u8; 32]);

    /// Receives auction fees and fee-recipient rewards with no recipient
    pub const AUCTION: SubaccountId = SubaccountId([0x11; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the subaccount of `address` with the given nonce.
    pub fn new(address: Address, nonce: u32) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..20].copy_from_slice(address.as_bytes());
        bytes[28..].copy_from_slice(&nonce.to_be_bytes());
        Self(bytes)
    }

    /// Owning account address
    pub fn address(&self) -> Address {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&self.0[..20]);
        Address::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Order hash (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OrderHash([u8; 32]);

hex_id!(OrderHash, 32);

impl OrderHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic hash of an order from its subaccount, the subaccount's
    /// trade nonce and the market it targets.
    pub fn compute(subaccount_id: &SubaccountId, nonce: u64, market_id: &MarketId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(subaccount_id.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(market_id.as_str().as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Market identifier
///
/// Conventionally "BASE/QUOTE" for spot markets (e.g. "INJ/USDT") but any
/// non-empty string is accepted. Markets are processed in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a "BASE/QUOTE" id into its parts
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once('/')
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
