//! Core identifier types for VersoDB.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction timestamp - identifies a transaction and orders it in time.
///
/// A single global oracle issues both start and commit timestamps from the
/// same counter, so the two kinds are directly comparable: a committed
/// transaction always has `commit_ts > start_ts`, and a version written at
/// `t` is older than a snapshot taken at `s` iff `t < s` holds through the
/// writer's commit log.
///
/// # Example
///
/// ```rust
/// use verso_common::types::TxId;
///
/// let tx = TxId::new(1);
/// assert!(tx.is_valid());
/// assert!(!TxId::INVALID.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxId(u64);

impl TxId {
    /// Invalid transaction id. Also means "no active transaction".
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction id.
    pub const MIN: Self = Self(1);

    /// Maximum transaction id, used as the `+inf` sentinel when scanning for
    /// the oldest active transaction.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a new `TxId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction id.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid transaction id.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxId(INVALID)")
        } else if *self == Self::MAX {
            write!(f, "TxId(MAX)")
        } else {
            write!(f, "TxId({})", self.0)
        }
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TxId> for u64 {
    #[inline]
    fn from(id: TxId) -> Self {
        id.0
    }
}

/// Worker identifier - a dense index into the worker array.
///
/// Assigned once at startup in `[0, N)` and never reused. Because the range
/// is dense, per-sibling state (LCB caches, worker handles) is indexed by
/// plain arrays rather than maps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    /// First worker id.
    pub const FIRST: Self = Self(0);

    /// Creates a new `WorkerId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the id as a usize array index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<WorkerId> for u32 {
    #[inline]
    fn from(id: WorkerId) -> Self {
        id.0
    }
}

/// Tree identifier - names an index structure registered with the engine.
///
/// The concurrency-control core never interprets tree ids; it only hands
/// them back to the tree registry when purged versions must be released
/// structurally.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TreeId(u64);

impl TreeId {
    /// Invalid tree id, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Creates a new `TreeId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checks if this is a valid tree id.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeId({})", self.0)
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TreeId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TreeId> for u64 {
    #[inline]
    fn from(id: TreeId) -> Self {
        id.0
    }
}

/// Command identifier - orders the writes of a single transaction.
///
/// A per-transaction counter, reset when a transaction begins. The top bit
/// is the remove mark: tombstone versions are distinguishable from update
/// versions without a separate field, which keeps the version-store key at
/// `(start_ts, command_id)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CommandId(u32);

impl CommandId {
    /// The remove mark, set on tombstone commands.
    pub const REMOVE_MARK: u32 = 1 << 31;

    /// First command id of a transaction.
    pub const FIRST: Self = Self(0);

    /// Creates a new `CommandId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value, including a possible remove mark.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns this command id with the remove mark set.
    #[inline]
    #[must_use]
    pub const fn mark_remove(self) -> Self {
        Self(self.0 | Self::REMOVE_MARK)
    }

    /// Checks whether the remove mark is set.
    #[inline]
    #[must_use]
    pub const fn is_remove(self) -> bool {
        self.0 & Self::REMOVE_MARK != 0
    }

    /// Returns the sequence number with the remove mark cleared.
    #[inline]
    #[must_use]
    pub const fn sequence(self) -> u32 {
        self.0 & !Self::REMOVE_MARK
    }
}

impl fmt::Debug for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_remove() {
            write!(f, "CommandId({}, remove)", self.sequence())
        } else {
            write!(f, "CommandId({})", self.0)
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CommandId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<CommandId> for u32 {
    #[inline]
    fn from(id: CommandId) -> Self {
        id.0
    }
}
