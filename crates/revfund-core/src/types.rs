//! Core type definitions for the revenue fund
//!
//! Identifiers for participants and assets plus the block-axis primitives
//! every other module is expressed in.

use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Block number read from the host's monotonic clock
pub type BlockNumber = u64;

/// Signed amount; period balances and accruals may be non-positive
pub type Amount = i128;

/// Address - 20-byte identifier for wallets, contracts and the fund itself
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address {
    bytes: [u8; 20],
}

impl Address {
    /// The zero address, used as the contract of the native currency
    pub const ZERO: Self = Self { bytes: [0u8; 20] };

    pub fn new(bytes: [u8; 20]) -> Self {
        Self { bytes }
    }

    /// Address with every byte set to `b` (handy for fixtures)
    pub fn repeat_byte(b: u8) -> Self {
        Self { bytes: [b; 20] }
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.bytes
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == [0u8; 20]
    }

    /// Convert to `0x`-prefixed hex string
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let decoded =
            hex::decode(digits).map_err(|e| CoreError::InvalidAddress(format!("{s}: {e}")))?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| CoreError::InvalidAddress(format!("{s}: {} bytes", v.len())))?;
        Ok(Self { bytes })
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Currency - (contract, sub-id) pair
///
/// The sub-id disambiguates multi-asset contracts (e.g. NFT collections);
/// fungible contracts use sub-id 0. The native asset is `(ZERO, 0)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Currency {
    /// Contract reference
    pub contract: Address,

    /// Sub-id within the contract
    #[serde(default)]
    pub id: u64,
}

impl Currency {
    /// The native asset of the host ledger
    pub const NATIVE: Self = Self {
        contract: Address::ZERO,
        id: 0,
    };

    pub fn new(contract: Address, id: u64) -> Self {
        Self { contract, id }
    }

    /// Fungible currency (sub-id 0) of a contract
    pub fn fungible(contract: Address) -> Self {
        Self { contract, id: 0 }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contract, self.id)
    }
}

/// Inclusive block range `[start_block, end_block]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSpan {
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
}

impl BlockSpan {
    /// Create a span, rejecting reversed bounds
    pub fn new(start_block: BlockNumber, end_block: BlockNumber) -> Result<Self, CoreError> {
        if start_block > end_block {
            return Err(CoreError::InvalidRange {
                low: start_block,
                up: end_block,
            });
        }
        Ok(Self {
            start_block,
            end_block,
        })
    }

    /// Whether `block` lies inside the span (inclusive on both ends)
    pub fn contains(&self, block: BlockNumber) -> bool {
        self.start_block <= block && block <= self.end_block
    }

    /// Number of blocks covered; `[0, u64::MAX]` covers 2^64 blocks
    pub fn len(&self) -> u128 {
        u128::from(self.end_block - self.start_block) + 1
    }

    /// A span always covers at least one block
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Clamp this span to `bounds`, `None` if they do not intersect
    pub fn clamp_to(&self, bounds: &BlockSpan) -> Option<BlockSpan> {
        let start_block = self.start_block.max(bounds.start_block);
        let end_block = self.end_block.min(bounds.end_block);
        (start_block <= end_block).then_some(BlockSpan {
            start_block,
            end_block,
        })
    }
}

impl fmt::Display for BlockSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_block, self.end_block)
    }
}
