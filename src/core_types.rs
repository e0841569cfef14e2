//! Core types used throughout the chain core.
//!
//! These are the fundamental identifiers and numeric types every other
//! module builds on. See db::objects for the entity types that embed
//! `ObjectId`s, and `Price`/`Amount` below for the exact-ratio machinery
//! that powers matching and margin calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two spaces an object lives in (spec SS3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Space {
    /// Consensus-critical entities authored directly by transactions.
    #[default]
    Protocol = 0,
    /// Derived entities recomputed from protocol state.
    Implementation = 1,
}

/// Object type tag within a space. Each `(space, type)` pair owns its own
/// monotonic instance counter.
pub type TypeTag = u8;

/// The 48-bit instance portion of an object id.
pub type Instance = u64;

const INSTANCE_MASK: u64 = (1u64 << 48) - 1;

/// `(space, type, instance)` — the identity of every object in the store.
///
/// Total ordering is `(space, type, instance)` lexicographic, which is
/// also insertion order within a `(space, type)` pair since instances are
/// assigned monotonically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ObjectId {
    pub space: Space,
    pub type_tag: TypeTag,
    instance: u64, // stored masked to 48 bits
}

impl ObjectId {
    pub fn new(space: Space, type_tag: TypeTag, instance: Instance) -> Self {
        debug_assert!(instance <= INSTANCE_MASK, "instance overflows 48 bits");
        Self {
            space,
            type_tag,
            instance: instance & INSTANCE_MASK,
        }
    }

    #[inline]
    pub fn instance(&self) -> Instance {
        self.instance
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.space as u8, self.type_tag, self.instance
        )
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Protocol-space object type tags (spec SS3).
pub mod protocol_types {
    use super::TypeTag;

    pub const ACCOUNT: TypeTag = 1;
    pub const ASSET: TypeTag = 2;
    pub const LIMIT_ORDER: TypeTag = 3;
    pub const CALL_ORDER: TypeTag = 4;
    pub const FORCE_SETTLEMENT: TypeTag = 5;
    pub const BALANCE: TypeTag = 6;
    pub const WITNESS: TypeTag = 7;
    pub const DELEGATE: TypeTag = 8;
    pub const PROPOSAL: TypeTag = 9;
    pub const OPERATION_HISTORY: TypeTag = 10;
}

/// Implementation-space object type tags.
pub mod impl_types {
    use super::TypeTag;

    pub const ACCOUNT_STATISTICS: TypeTag = 1;
    pub const ASSET_DYNAMIC_DATA: TypeTag = 2;
    pub const ASSET_BITASSET_DATA: TypeTag = 3;
    pub const GLOBAL_PROPERTIES: TypeTag = 4;
    pub const DYNAMIC_GLOBAL_PROPERTIES: TypeTag = 5;
    pub const WITNESS_SCHEDULE: TypeTag = 6;
}

/// An unsigned quantity of some asset, scaled by that asset's precision.
/// Never negative; overflow is always checked rather than wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    #[inline]
    pub fn checked_mul(self, rhs: u64) -> Option<Amount> {
        self.0.checked_mul(rhs).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a `Price`: an amount of a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub amount: Amount,
    pub asset_id: ObjectId,
}

impl AssetAmount {
    pub fn new(amount: u64, asset_id: ObjectId) -> Self {
        Self {
            amount: Amount(amount),
            asset_id,
        }
    }
}

/// An exact ratio `base / quote`, compared via 128-bit cross multiplication
/// so no rounding ever enters a comparison (spec SS4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub base: AssetAmount,
    pub quote: AssetAmount,
}

impl Price {
    pub fn new(base: AssetAmount, quote: AssetAmount) -> Self {
        Self { base, quote }
    }

    /// `self < other`, both expressed as ratios over the same
    /// `(base_asset, quote_asset)` pair. Cross-multiplies in u128 so no
    /// floating point or intermediate rounding ever enters the comparison.
    pub fn less_than(&self, other: &Price) -> bool {
        debug_assert_eq!(self.base.asset_id, other.base.asset_id);
        debug_assert_eq!(self.quote.asset_id, other.quote.asset_id);
        let lhs = self.base.amount.0 as u128 * other.quote.amount.0 as u128;
        let rhs = other.base.amount.0 as u128 * self.quote.amount.0 as u128;
        lhs < rhs
    }

    pub fn less_or_equal(&self, other: &Price) -> bool {
        !other.less_than(self)
    }

    pub fn greater_than(&self, other: &Price) -> bool {
        other.less_than(self)
    }

    /// The reciprocal price (swap base and quote).
    pub fn invert(&self) -> Price {
        Price {
            base: self.quote,
            quote: self.base,
        }
    }

    /// `amount` (in `self.quote.asset_id`) converted to `self.base.asset_id`
    /// at this price, rounding down. `None` on overflow or a zero
    /// denominator.
    pub fn convert(&self, amount: Amount) -> Option<Amount> {
        if self.quote.amount.is_zero() {
            return None;
        }
        let scaled = amount.0 as u128 * self.base.amount.0 as u128 / self.quote.amount.0 as u128;
        u64::try_from(scaled).ok().map(Amount)
    }
}

/// Seconds since the Unix epoch — the chain's native time representation
/// (block timestamps, expirations, feed lifetimes all use this).
pub type ChainTime = u32;

pub mod time {
    use super::ChainTime;

    pub const SECONDS_PER_DAY: ChainTime = 86_400;
}
