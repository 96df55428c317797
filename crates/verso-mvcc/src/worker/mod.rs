//! Worker-local transaction state and the shared store.
//!
//! Worker identity is an explicit value: every MVCC entry point hangs off a
//! [`Worker`] handle owned by its thread, and the sibling-visible portion
//! of each worker lives in a shared [`WorkerState`]. Siblings scan each
//! other's active-transaction word without locks, so the whole active
//! descriptor (transaction id plus classification flags) is packed into a
//! single atomic u64.

mod visibility;

mod gc;

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tracing::debug;
use verso_common::config::MvccConfig;
use verso_common::error::{VersoError, VersoResult};
use verso_common::types::{CommandId, TreeId, TxId, WorkerId};

use crate::commit_log::CommitLog;
use crate::history::{HistoryStorage, TreeRegistry};
use crate::txn::{
    CommitChain, IsolationLevel, TimestampOracle, Transaction, TxMode, TxState,
};
use crate::watermark::{GlobalWatermarks, WorkerWatermarks};

/// Bit 63 of the active-tx word: the transaction is long-running.
pub const LONG_RUNNING_BIT: u64 = 1 << 63;

/// Bit 62 of the active-tx word: the transaction runs read-committed and is
/// excluded from watermark tracking.
pub const READ_COMMITTED_BIT: u64 = 1 << 62;

/// Mask clearing the classification bits, leaving the transaction id.
pub const CLEAN_BITS_MASK: u64 = !(LONG_RUNNING_BIT | READ_COMMITTED_BIT);

/// Decoded view of a sibling's active-transaction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveTxInfo {
    /// The transaction's start timestamp.
    pub tx_id: TxId,
    /// True for long-running transactions.
    pub long_running: bool,
    /// True for read-committed transactions.
    pub read_committed: bool,
}

/// Packs a transaction id and its classification into one word.
#[inline]
#[must_use]
pub fn pack_active_tx(tx_id: TxId, long_running: bool, read_committed: bool) -> u64 {
    debug_assert_eq!(tx_id.as_u64() & !CLEAN_BITS_MASK, 0, "tx id overflows flag bits");
    let mut word = tx_id.as_u64();
    if long_running {
        word |= LONG_RUNNING_BIT;
    }
    if read_committed {
        word |= READ_COMMITTED_BIT;
    }
    word
}

/// Decodes an active-transaction word; `None` when no transaction is
/// active.
#[inline]
#[must_use]
pub fn decode_active_tx(word: u64) -> Option<ActiveTxInfo> {
    if word == 0 {
        return None;
    }
    Some(ActiveTxInfo {
        tx_id: TxId::new(word & CLEAN_BITS_MASK),
        long_running: word & LONG_RUNNING_BIT != 0,
        read_committed: word & READ_COMMITTED_BIT != 0,
    })
}

/// Per-worker counters, relaxed atomics.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Transactions committed.
    pub tx_committed: AtomicU64,
    /// Transactions aborted.
    pub tx_aborted: AtomicU64,
    /// GC rounds that ran to completion on this worker.
    pub gc_runs: AtomicU64,
    /// Versions handed back to the tree registry by purge.
    pub versions_purged: AtomicU64,
    /// Tombstones promoted to the graveyard.
    pub tombstones_promoted: AtomicU64,
}

impl WorkerStats {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, AtomicOrdering::Relaxed);
    }

    /// Loads a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(AtomicOrdering::Relaxed)
    }
}

/// The sibling-visible part of a worker.
///
/// Written only by the owning worker (or its commit callback); read by any
/// worker.
#[derive(Debug)]
pub struct WorkerState {
    worker_id: WorkerId,
    /// Packed active-transaction word; 0 means idle.
    active_tx_id: AtomicU64,
    commit_log: CommitLog,
    watermarks: WorkerWatermarks,
    stats: WorkerStats,
}

impl WorkerState {
    fn new(worker_id: WorkerId, commit_log_capacity: usize) -> Self {
        Self {
            worker_id,
            active_tx_id: AtomicU64::new(0),
            commit_log: CommitLog::new(commit_log_capacity),
            watermarks: WorkerWatermarks::new(),
            stats: WorkerStats::default(),
        }
    }

    /// This worker's id.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// The raw active-transaction word.
    pub fn active_tx_word(&self) -> u64 {
        self.active_tx_id.load(AtomicOrdering::Relaxed)
    }

    /// Decoded active transaction, if any.
    pub fn active_tx(&self) -> Option<ActiveTxInfo> {
        decode_active_tx(self.active_tx_word())
    }

    /// This worker's commit log.
    pub fn commit_log(&self) -> &CommitLog {
        &self.commit_log
    }

    /// This worker's published watermarks.
    pub fn watermarks(&self) -> &WorkerWatermarks {
        &self.watermarks
    }

    /// This worker's counters.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

/// The shared MVCC store: configuration, timestamp oracle, global
/// watermarks, the commit chain, and the fixed worker array.
#[derive(Debug)]
pub struct MvccStore {
    config: MvccConfig,
    oracle: TimestampOracle,
    global_wmk: GlobalWatermarks,
    commit_chain: CommitChain,
    workers: Vec<Arc<WorkerState>>,
}

impl MvccStore {
    /// Creates a store for `config.worker_count` workers.
    pub fn new(config: MvccConfig) -> VersoResult<Arc<Self>> {
        config
            .validate()
            .map_err(VersoError::invalid_config)?;

        let workers = (0..config.worker_count)
            .map(|i| {
                Arc::new(WorkerState::new(
                    WorkerId::new(i as u32),
                    config.commit_log_capacity,
                ))
            })
            .collect();

        Ok(Arc::new(Self {
            config,
            oracle: TimestampOracle::new(),
            global_wmk: GlobalWatermarks::new(),
            commit_chain: CommitChain::new(),
            workers,
        }))
    }

    /// The store configuration.
    pub fn config(&self) -> &MvccConfig {
        &self.config
    }

    /// The shared timestamp oracle.
    pub fn oracle(&self) -> &TimestampOracle {
        &self.oracle
    }

    /// The global watermark state.
    pub fn global_wmk(&self) -> &GlobalWatermarks {
        &self.global_wmk
    }

    /// The sibling-visible states, indexed by worker id.
    pub fn workers(&self) -> &[Arc<WorkerState>] {
        &self.workers
    }

    /// One worker's sibling-visible state.
    pub fn worker_state(&self, worker_id: WorkerId) -> &Arc<WorkerState> {
        &self.workers[worker_id.as_usize()]
    }

    /// Builds the thread-owned handle for `worker_id`.
    ///
    /// Call once per worker at startup and move the handle to its thread.
    pub fn worker(
        self: &Arc<Self>,
        worker_id: WorkerId,
        history: Box<dyn HistoryStorage>,
        tree_registry: Arc<dyn TreeRegistry>,
    ) -> Worker {
        let worker_count = self.workers.len();
        Worker {
            state: Arc::clone(&self.workers[worker_id.as_usize()]),
            store: Arc::clone(self),
            history,
            tree_registry,
            active_tx: Transaction::default(),
            command_id: 0,
            lcb_cache_key: vec![0; worker_count],
            lcb_cache_val: vec![0; worker_count],
            global_wmk_of_all_tx: TxId::INVALID,
            local_wmk_of_all_tx: TxId::INVALID,
            local_wmk_of_short_tx: TxId::INVALID,
            cleaned_wmk_of_short_tx: TxId::INVALID,
        }
    }
}

/// A worker's thread-owned handle: the entry point for the transaction
/// lifecycle, version writes, visibility checks, and garbage collection.
pub struct Worker {
    pub(crate) state: Arc<WorkerState>,
    pub(crate) store: Arc<MvccStore>,
    pub(crate) history: Box<dyn HistoryStorage>,
    pub(crate) tree_registry: Arc<dyn TreeRegistry>,
    pub(crate) active_tx: Transaction,
    /// Per-transaction write counter; reset at begin and commit.
    command_id: u32,
    /// LCB cache: key is the start timestamp the cached value was computed
    /// for, one slot per sibling.
    pub(crate) lcb_cache_key: Vec<u64>,
    pub(crate) lcb_cache_val: Vec<u64>,
    /// Global all-transaction watermark snapshotted at begin; a safe lower
    /// bound for visibility even when stale.
    pub(crate) global_wmk_of_all_tx: TxId,
    pub(crate) local_wmk_of_all_tx: TxId,
    pub(crate) local_wmk_of_short_tx: TxId,
    /// Upper bound (exclusive) of the range already purged or promoted;
    /// never decreases.
    pub(crate) cleaned_wmk_of_short_tx: TxId,
}

impl Worker {
    /// This worker's id.
    pub fn worker_id(&self) -> WorkerId {
        self.state.worker_id
    }

    /// The current (or most recent) transaction descriptor.
    pub fn active_tx(&self) -> &Transaction {
        &self.active_tx
    }

    /// The shared store this worker belongs to.
    pub fn store(&self) -> &Arc<MvccStore> {
        &self.store
    }

    /// Begins a transaction and returns its start timestamp.
    ///
    /// Publishes the packed active-transaction word, snapshots the global
    /// watermark, invalidates the LCB caches, and compacts the commit log
    /// if it reached capacity.
    pub fn begin(&mut self, isolation: IsolationLevel, mode: TxMode) -> VersoResult<TxId> {
        if !self.active_tx.state().is_ended() {
            return Err(VersoError::TransactionActive {
                worker_id: self.worker_id(),
                start_ts: self.active_tx.start_ts(),
            });
        }

        let start_ts = self.store.oracle.allocate();
        self.active_tx.start(start_ts, isolation, mode);
        self.command_id = 0;

        let long_running =
            self.store.config.enable_long_running_tx && mode == TxMode::LongRunning;
        let word = pack_active_tx(
            start_ts,
            long_running,
            isolation == IsolationLevel::ReadCommitted,
        );
        self.state.active_tx_id.store(word, AtomicOrdering::Release);

        // Snapshot the global watermark for the fast visibility path. May
        // be stale; staleness only costs extra LCB queries.
        self.global_wmk_of_all_tx = self.store.global_wmk.wmk_of_all_tx();

        // Invalidate the per-sibling LCB caches.
        self.lcb_cache_key.fill(0);
        self.lcb_cache_val.fill(0);

        // Keep the commit log bounded before this transaction adds to it.
        if self.state.commit_log.needs_compaction() {
            let active_siblings = self.sibling_active_tx_ids();
            self.state.commit_log.compact(&active_siblings);
        }

        debug!(
            "transaction started, worker_id={}, start_ts={}, isolation={}, long_running={}",
            self.worker_id(),
            start_ts,
            isolation,
            long_running
        );
        Ok(start_ts)
    }

    /// Commits the active transaction, returning its commit timestamp.
    ///
    /// Read-only transactions (no versions produced) commit without
    /// consuming a commit timestamp and return [`TxId::INVALID`].
    pub fn commit(&mut self) -> VersoResult<TxId> {
        if !self.active_tx.state().is_active() {
            return Err(VersoError::TransactionNotActive {
                worker_id: self.worker_id(),
            });
        }

        self.active_tx.set_state(TxState::Committing);
        self.command_id = 0;

        let commit_ts = if self.active_tx.has_written() {
            let start_ts = self.active_tx.start_ts();
            let context = self.store.commit_chain.register(&self.store.oracle);
            let commit_ts = context.commit_ts();
            self.active_tx.set_commit_ts(commit_ts);

            // The callback runs when every earlier commit id has been
            // consumed; it may fire on whichever worker drives the chain
            // past this context. Everything it touches is sibling-safe.
            let state = Arc::clone(&self.state);
            context.make_pending(Box::new(move |ts| {
                state.commit_log.append(start_ts, ts);
                state.watermarks.record_commit(ts);
                state.active_tx_id.store(0, AtomicOrdering::Release);
            }));
            self.store.commit_chain.wait_until_fired(&context);
            commit_ts
        } else {
            // Nothing written: no commit timestamp, no commit log entry.
            self.state.active_tx_id.store(0, AtomicOrdering::Release);
            TxId::INVALID
        };

        self.active_tx.set_state(TxState::Committed);
        WorkerStats::incr(&self.state.stats.tx_committed);
        debug!(
            "transaction committed, worker_id={}, start_ts={}, commit_ts={}",
            self.worker_id(),
            self.active_tx.start_ts(),
            commit_ts
        );

        // The active-tx word is already cleared, so this worker's own
        // transaction no longer pins the watermarks it is about to compute.
        if self.active_tx.has_written() {
            self.garbage_collection();
        }
        Ok(commit_ts)
    }

    /// Aborts the active transaction, discarding its versions.
    pub fn abort(&mut self) -> VersoResult<()> {
        if !self.active_tx.state().is_active() {
            return Err(VersoError::TransactionNotActive {
                worker_id: self.worker_id(),
            });
        }

        // Drop every version this transaction wrote; nothing else can key
        // on its start timestamp.
        let start_ts = self.active_tx.start_ts();
        self.history
            .purge_versions(start_ts, start_ts, &mut |_, _, _, _| {});

        self.state.active_tx_id.store(0, AtomicOrdering::Release);
        self.active_tx.set_state(TxState::Aborted);
        WorkerStats::incr(&self.state.stats.tx_aborted);
        debug!(
            "transaction aborted, worker_id={}, start_ts={}",
            self.worker_id(),
            start_ts
        );
        Ok(())
    }

    /// Appends a version produced by the active transaction and returns
    /// the command id it was stored under.
    pub fn put_version(
        &mut self,
        tree_id: TreeId,
        is_remove: bool,
        payload_size: usize,
        writer: &mut dyn FnMut(&mut [u8]),
    ) -> VersoResult<CommandId> {
        if !self.active_tx.state().is_active() {
            return Err(VersoError::TransactionNotActive {
                worker_id: self.worker_id(),
            });
        }

        let mut command_id = CommandId::new(self.command_id);
        self.command_id += 1;
        if is_remove {
            command_id = command_id.mark_remove();
        }

        self.history.put_version(
            self.active_tx.start_ts(),
            command_id,
            tree_id,
            is_remove,
            payload_size,
            writer,
        );
        self.active_tx.mark_written();
        Ok(command_id)
    }

    /// Collects the cleaned active start timestamps of all siblings
    /// (excluding this worker); idle siblings contribute nothing.
    pub(crate) fn sibling_active_tx_ids(&self) -> Vec<TxId> {
        self.store
            .workers
            .iter()
            .filter(|sibling| sibling.worker_id != self.state.worker_id)
            .filter_map(|sibling| sibling.active_tx())
            .map(|info| info.tx_id)
            .collect()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.worker_id())
            .field("active_tx", &self.active_tx)
            .finish()
    }
}
