//! Transaction lifecycle state.
//!
//! # Transaction States
//!
//! ```text
//! ┌──────┐   begin()   ┌────────┐  commit()  ┌────────────┐
//! │ Idle │────────────▶│ Active │───────────▶│ Committing │──▶ Committed
//! └──────┘             └────────┘            └────────────┘
//!                           │
//!                        abort()
//!                           │
//!                           ▼
//!                       ┌─────────┐
//!                       │ Aborted │
//!                       └─────────┘
//! ```
//!
//! Committed and Aborted both allow a fresh `begin()`.

mod commit_chain;

pub use commit_chain::{CommitCallback, CommitChain, CommitContext};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use verso_common::types::TxId;

/// Isolation level chosen at transaction begin.
///
/// Serializable currently shares the snapshot-isolation visibility rules;
/// it reserves the name for an SSI validation layer on top. ReadCommitted
/// transactions run but are excluded from watermark tracking and must not
/// reach the MVCC visibility path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Sees committed data at each statement; no snapshot.
    ReadCommitted,
    /// Sees data as of the transaction's start timestamp.
    SnapshotIsolation,
    /// Snapshot isolation visibility, reserved for SSI on top.
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::SnapshotIsolation
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadCommitted => write!(f, "ReadCommitted"),
            Self::SnapshotIsolation => write!(f, "SnapshotIsolation"),
            Self::Serializable => write!(f, "Serializable"),
        }
    }
}

/// Expected transaction duration, chosen by the client at begin.
///
/// Long-running transactions relax the short-transaction watermark (so the
/// bulk of versions keeps getting purged) while pinning the all-transaction
/// watermark (so the long reader can still resolve tombstones against the
/// graveyard).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// The common case; fully tracked by both watermarks.
    ShortRunning,
    /// Survives many GC rounds without blocking short-transaction purge.
    LongRunning,
}

impl Default for TxMode {
    fn default() -> Self {
        Self::ShortRunning
    }
}

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// No transaction has run on this worker yet.
    Idle,
    /// Transaction is active and can perform operations.
    Active,
    /// Commit in progress; waiting for the commit chain to fire.
    Committing,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl TxState {
    /// Returns true if the transaction can perform operations.
    pub fn is_active(&self) -> bool {
        *self == TxState::Active
    }

    /// Returns true if the transaction has ended (a new one may begin).
    pub fn is_ended(&self) -> bool {
        matches!(self, TxState::Idle | TxState::Committed | TxState::Aborted)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::Idle => write!(f, "Idle"),
            TxState::Active => write!(f, "Active"),
            TxState::Committing => write!(f, "Committing"),
            TxState::Committed => write!(f, "Committed"),
            TxState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Per-worker descriptor of the current (or most recent) transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Start timestamp; defines the read snapshot.
    start_ts: TxId,
    /// Commit timestamp; [`TxId::INVALID`] until commit assigns one.
    commit_ts: TxId,
    /// Current state.
    state: TxState,
    /// Isolation level.
    isolation: IsolationLevel,
    /// Short or long-running classification.
    mode: TxMode,
    /// Whether the transaction produced any version.
    has_written: bool,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            start_ts: TxId::INVALID,
            commit_ts: TxId::INVALID,
            state: TxState::Idle,
            isolation: IsolationLevel::default(),
            mode: TxMode::default(),
            has_written: false,
        }
    }
}

impl Transaction {
    /// Resets the descriptor for a fresh transaction.
    pub(crate) fn start(&mut self, start_ts: TxId, isolation: IsolationLevel, mode: TxMode) {
        debug_assert!(self.state.is_ended(), "previous transaction not ended");
        self.start_ts = start_ts;
        self.commit_ts = TxId::INVALID;
        self.state = TxState::Active;
        self.isolation = isolation;
        self.mode = mode;
        self.has_written = false;
    }

    /// Returns the start timestamp.
    pub fn start_ts(&self) -> TxId {
        self.start_ts
    }

    /// Returns the commit timestamp, [`TxId::INVALID`] before commit.
    pub fn commit_ts(&self) -> TxId {
        self.commit_ts
    }

    pub(crate) fn set_commit_ts(&mut self, commit_ts: TxId) {
        self.commit_ts = commit_ts;
    }

    /// Returns the current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TxState) {
        self.state = state;
    }

    /// Returns the isolation level.
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Returns the duration classification.
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Returns true for long-running transactions.
    pub fn is_long_running(&self) -> bool {
        self.mode == TxMode::LongRunning
    }

    /// Returns true once the transaction has produced a version.
    pub fn has_written(&self) -> bool {
        self.has_written
    }

    pub(crate) fn mark_written(&mut self) {
        self.has_written = true;
    }
}

/// Issues start and commit timestamps from a single shared counter.
///
/// Both kinds of timestamp live in one monotonic domain, which is what
/// makes `commit_ts` of one transaction directly comparable to `start_ts`
/// of another in the commit-log binary search.
#[derive(Debug)]
pub struct TimestampOracle {
    next: AtomicU64,
}

impl TimestampOracle {
    /// Creates an oracle whose first issued timestamp is `1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Issues the next timestamp.
    pub fn allocate(&self) -> TxId {
        TxId::new(self.next.fetch_add(1, AtomicOrdering::SeqCst) + 1)
    }

    /// The most recently issued timestamp, without advancing.
    pub fn latest(&self) -> TxId {
        TxId::new(self.next.load(AtomicOrdering::SeqCst))
    }
}

impl Default for TimestampOracle {
    fn default() -> Self {
        Self::new()
    }
}
