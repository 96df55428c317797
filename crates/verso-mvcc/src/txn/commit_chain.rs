//! Ordered commit-id consumption.
//!
//! Commit timestamps must be *consumed* in allocation order even when the
//! work of committing finishes out of order across workers. Each committing
//! transaction claims a [`CommitContext`] node in a singly-linked chain;
//! a node's callback fires only after every predecessor has fired.
//!
//! The chain link is installed exactly once per node (`OnceCell`), giving
//! the single-writer insert-if-absent semantics of a CAS without unsafe
//! code. Allocation draws the commit timestamp from the shared oracle
//! inside a short critical section so chain order equals timestamp order,
//! and a timestamp drawn at commit is strictly greater than the claimant's
//! start timestamp.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use verso_common::types::TxId;

use super::TimestampOracle;

/// Callback invoked exactly once when the context's turn comes, with the
/// context's commit timestamp.
pub type CommitCallback = Box<dyn FnOnce(TxId) + Send>;

/// One link in the commit chain.
pub struct CommitContext {
    commit_ts: TxId,
    /// True once the owner supplied its callback and is ready to fire.
    pending: AtomicBool,
    /// True once the callback has fired.
    fired: AtomicBool,
    /// Move-only callback, taken on fire.
    callback: Mutex<Option<CommitCallback>>,
    /// Successor, installed at most once.
    next: OnceCell<Arc<CommitContext>>,
}

impl CommitContext {
    fn new(commit_ts: TxId) -> Self {
        Self {
            commit_ts,
            pending: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            callback: Mutex::new(None),
            next: OnceCell::new(),
        }
    }

    /// The commit timestamp this context consumes.
    pub fn commit_ts(&self) -> TxId {
        self.commit_ts
    }

    /// True once the owner marked the context ready to fire.
    pub fn is_pending(&self) -> bool {
        self.pending.load(AtomicOrdering::Acquire)
    }

    /// True once the callback has fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(AtomicOrdering::Acquire)
    }

    /// Marks the context ready to fire as soon as all predecessors have
    /// fired, supplying the commit callback.
    pub fn make_pending(&self, callback: CommitCallback) {
        *self.callback.lock() = Some(callback);
        self.pending.store(true, AtomicOrdering::Release);
    }

    /// True if a successor has been installed.
    pub fn has_next(&self) -> bool {
        self.next.get().is_some()
    }

    /// The successor, if installed.
    pub fn next(&self) -> Option<Arc<CommitContext>> {
        self.next.get().cloned()
    }

    /// Returns the successor, installing a fresh one with the next commit
    /// timestamp from `oracle` iff none exists.
    pub fn get_or_create_next(&self, oracle: &TimestampOracle) -> Arc<CommitContext> {
        self.next
            .get_or_init(|| Arc::new(CommitContext::new(oracle.allocate())))
            .clone()
    }

    /// Fires the callback if present. Idempotent: the callback is taken out
    /// on the first call.
    fn fire(&self) {
        if let Some(callback) = self.callback.lock().take() {
            callback(self.commit_ts);
        }
        self.fired.store(true, AtomicOrdering::Release);
    }
}

impl std::fmt::Debug for CommitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitContext")
            .field("commit_ts", &self.commit_ts)
            .field("pending", &self.is_pending())
            .field("fired", &self.has_fired())
            .field("has_next", &self.has_next())
            .finish()
    }
}

/// The chain of commit contexts shared by all workers.
pub struct CommitChain {
    /// Newest allocated context; the allocation point.
    tail: Mutex<Arc<CommitContext>>,
    /// Newest *fired* context; firing resumes from here.
    cursor: Mutex<Arc<CommitContext>>,
}

impl CommitChain {
    /// Creates a chain with a sentinel root that is already fired.
    pub fn new() -> Self {
        let root = Arc::new(CommitContext::new(TxId::INVALID));
        root.pending.store(true, AtomicOrdering::Release);
        root.fired.store(true, AtomicOrdering::Release);
        Self {
            tail: Mutex::new(Arc::clone(&root)),
            cursor: Mutex::new(root),
        }
    }

    /// Claims the next context in the chain, drawing its commit timestamp
    /// from `oracle`.
    ///
    /// The critical section covers the oracle draw, so commit timestamps
    /// are strictly increasing along the chain and a context claimed by a
    /// committing transaction carries a timestamp greater than any
    /// timestamp issued before the claim — in particular the claimant's
    /// own start timestamp.
    pub fn register(&self, oracle: &TimestampOracle) -> Arc<CommitContext> {
        let mut tail = self.tail.lock();
        let context = tail.get_or_create_next(oracle);
        *tail = Arc::clone(&context);
        context
    }

    /// Fires, in chain order, every context that is ready. Stops at the
    /// first context still awaiting its owner's `make_pending`.
    ///
    /// Returns the number of contexts fired by this call.
    pub fn fire_ready(&self) -> usize {
        let mut cursor = self.cursor.lock();
        let mut fired = 0;
        while let Some(next) = cursor.next() {
            if !next.is_pending() {
                break;
            }
            next.fire();
            fired += 1;
            *cursor = next;
        }
        fired
    }

    /// Drives firing until `context` has fired.
    ///
    /// The wait is bounded by the predecessors' own `make_pending` calls:
    /// every claimed context is marked pending by its committing worker
    /// promptly, with no suspension points in between.
    pub fn wait_until_fired(&self, context: &CommitContext) {
        while !context.has_fired() {
            if self.fire_ready() == 0 {
                std::hint::spin_loop();
            }
        }
    }
}

impl Default for CommitChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommitChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitChain")
            .field("tail", &self.tail.lock().commit_ts())
            .field("cursor", &self.cursor.lock().commit_ts())
            .finish()
    }
}
