//! Watermark publication: per-worker and global GC lower bounds.
//!
//! A watermark is a timestamp below which no live transaction can observe
//! anything; versions older than it are safe to reclaim. Two watermarks are
//! tracked per worker:
//!
//! - `wmk_of_all_tx` — bound over every active transaction, long-running
//!   ones included. Update versions below it are dead.
//! - `wmk_of_short_tx` — bound over the short-running transactions only.
//!   Remove tombstones below it can migrate to the graveyard, where a
//!   long-running reader can still resolve them.
//!
//! The pair must be read consistently (one writer epoch), but the read path
//! cannot afford a mutex per worker. Publication therefore uses a sequence
//! lock: the writer makes the version odd, stores both watermarks, and
//! makes the version even again; readers spin while the version is odd and
//! restart if it moved across their snapshot.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::{Mutex, MutexGuard};
use verso_common::types::TxId;

/// Per-worker watermark state, published by whichever worker runs the GC
/// round and read by every worker.
#[derive(Debug, Default)]
pub struct WorkerWatermarks {
    /// Sequence-lock word. Odd while the writer is inside.
    version: AtomicU64,
    /// Versions (of this worker) below this are invisible to all active
    /// transactions.
    wmk_of_all_tx: AtomicU64,
    /// Versions below this are invisible to all active short-running
    /// transactions.
    wmk_of_short_tx: AtomicU64,
    /// Commit timestamp of this worker's most recent commit.
    latest_commit_ts: AtomicU64,
    /// Value of `latest_commit_ts` at the last watermark publication. When
    /// the two match, the worker committed nothing since the last GC round
    /// and its published watermarks can be reused as-is.
    updated_latest_commit_ts: AtomicU64,
}

impl WorkerWatermarks {
    /// Creates zeroed watermark state. A zero watermark makes nothing
    /// reclaimable, which is the correct initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a consistent watermark pair (sequence-lock writer side).
    ///
    /// Watermarks never move backwards: GC rounds only learn about more
    /// commits, never fewer.
    pub fn publish(&self, wmk_of_all_tx: TxId, wmk_of_short_tx: TxId) {
        debug_assert!(
            wmk_of_all_tx.as_u64() >= self.wmk_of_all_tx.load(AtomicOrdering::Relaxed),
            "watermark of all transactions must not decrease"
        );
        debug_assert!(
            wmk_of_short_tx.as_u64() >= self.wmk_of_short_tx.load(AtomicOrdering::Relaxed),
            "watermark of short transactions must not decrease"
        );

        self.version.fetch_add(1, AtomicOrdering::Release);
        self.wmk_of_all_tx
            .store(wmk_of_all_tx.as_u64(), AtomicOrdering::Release);
        self.wmk_of_short_tx
            .store(wmk_of_short_tx.as_u64(), AtomicOrdering::Release);
        self.version.fetch_add(1, AtomicOrdering::Release);
    }

    /// Reads a consistent watermark pair (sequence-lock reader side).
    ///
    /// Spins only while the writer's brief critical section is open.
    pub fn read(&self) -> (TxId, TxId) {
        loop {
            let version = self.version.load(AtomicOrdering::Acquire);
            if version & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let all = self.wmk_of_all_tx.load(AtomicOrdering::Acquire);
            let short = self.wmk_of_short_tx.load(AtomicOrdering::Acquire);

            if self.version.load(AtomicOrdering::Acquire) == version {
                return (TxId::new(all), TxId::new(short));
            }
        }
    }

    /// Records a commit of the owning worker.
    pub fn record_commit(&self, commit_ts: TxId) {
        self.latest_commit_ts
            .store(commit_ts.as_u64(), AtomicOrdering::Release);
    }

    /// The most recent commit timestamp of the owning worker.
    pub fn latest_commit_ts(&self) -> TxId {
        TxId::new(self.latest_commit_ts.load(AtomicOrdering::Acquire))
    }

    /// True when no commit happened since the last watermark publication.
    pub fn is_up_to_date(&self) -> bool {
        self.updated_latest_commit_ts.load(AtomicOrdering::Acquire)
            == self.latest_commit_ts.load(AtomicOrdering::Acquire)
    }

    /// Marks the published watermarks as covering the commits seen so far.
    pub fn mark_updated(&self) {
        self.updated_latest_commit_ts.store(
            self.latest_commit_ts.load(AtomicOrdering::Acquire),
            AtomicOrdering::Release,
        );
    }
}

/// Global watermark state shared by all workers.
///
/// Atomics are readable by anyone at any time; the publishing critical
/// section (one GC round recomputing the whole set) is guarded by a mutex
/// that is only ever try-locked. A worker that loses the race simply skips
/// its round.
#[derive(Debug, Default)]
pub struct GlobalWatermarks {
    /// Start timestamp of the oldest active transaction, any kind.
    oldest_active_tx: AtomicU64,
    /// Start timestamp of the oldest active short-running transaction.
    oldest_active_short_tx: AtomicU64,
    /// Start timestamp of the newest active long-running transaction.
    newest_long_tx: AtomicU64,
    /// Minimum of all workers' `wmk_of_all_tx`.
    wmk_of_all_tx: AtomicU64,
    /// Minimum of all workers' `wmk_of_short_tx`.
    wmk_of_short_tx: AtomicU64,
    update_mutex: Mutex<()>,
}

impl GlobalWatermarks {
    /// Creates zeroed global state. The zero watermark makes
    /// `visible_for_all` false for every transaction id, as intended before
    /// the first GC round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to enter the publishing critical section. Never blocks.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.update_mutex.try_lock()
    }

    /// Publishes the active-transaction scan results.
    ///
    /// Caller must hold the guard returned by [`Self::try_lock`].
    pub fn update_active_tx_info(&self, oldest: TxId, oldest_short: TxId, newest_long: TxId) {
        self.oldest_active_tx
            .store(oldest.as_u64(), AtomicOrdering::Release);
        self.oldest_active_short_tx
            .store(oldest_short.as_u64(), AtomicOrdering::Release);
        self.newest_long_tx
            .store(newest_long.as_u64(), AtomicOrdering::Release);
    }

    /// Publishes the global watermark minima.
    ///
    /// Caller must hold the guard returned by [`Self::try_lock`].
    pub fn update_wmks(&self, wmk_of_all_tx: TxId, wmk_of_short_tx: TxId) {
        debug_assert!(
            wmk_of_all_tx.as_u64() >= self.wmk_of_all_tx.load(AtomicOrdering::Relaxed),
            "global watermark must not decrease"
        );
        self.wmk_of_all_tx
            .store(wmk_of_all_tx.as_u64(), AtomicOrdering::Release);
        self.wmk_of_short_tx
            .store(wmk_of_short_tx.as_u64(), AtomicOrdering::Release);
    }

    /// Start timestamp of the oldest active transaction.
    pub fn oldest_active_tx(&self) -> TxId {
        TxId::new(self.oldest_active_tx.load(AtomicOrdering::Acquire))
    }

    /// Start timestamp of the oldest active short-running transaction.
    pub fn oldest_active_short_tx(&self) -> TxId {
        TxId::new(self.oldest_active_short_tx.load(AtomicOrdering::Acquire))
    }

    /// Start timestamp of the newest active long-running transaction.
    pub fn newest_long_tx(&self) -> TxId {
        TxId::new(self.newest_long_tx.load(AtomicOrdering::Acquire))
    }

    /// Global lower watermark over all transactions.
    pub fn wmk_of_all_tx(&self) -> TxId {
        TxId::new(self.wmk_of_all_tx.load(AtomicOrdering::Acquire))
    }

    /// Global lower watermark over short-running transactions.
    pub fn wmk_of_short_tx(&self) -> TxId {
        TxId::new(self.wmk_of_short_tx.load(AtomicOrdering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_watermarks_zero() {
        let wmks = WorkerWatermarks::new();
        assert_eq!(wmks.read(), (TxId::INVALID, TxId::INVALID));

        let global = GlobalWatermarks::new();
        assert_eq!(global.wmk_of_all_tx(), TxId::INVALID);
        assert_eq!(global.wmk_of_short_tx(), TxId::INVALID);
    }

    #[test]
    fn test_publish_read_roundtrip() {
        let wmks = WorkerWatermarks::new();
        wmks.publish(TxId::new(10), TxId::new(20));
        assert_eq!(wmks.read(), (TxId::new(10), TxId::new(20)));

        wmks.publish(TxId::new(15), TxId::new(25));
        assert_eq!(wmks.read(), (TxId::new(15), TxId::new(25)));
    }

    #[test]
    fn test_commit_tracking() {
        let wmks = WorkerWatermarks::new();
        // Nothing committed, nothing published: up to date.
        assert!(wmks.is_up_to_date());

        wmks.record_commit(TxId::new(5));
        assert!(!wmks.is_up_to_date());
        assert_eq!(wmks.latest_commit_ts(), TxId::new(5));

        wmks.mark_updated();
        assert!(wmks.is_up_to_date());
    }

    #[test]
    fn test_seqlock_pair_consistency() {
        // The writer always publishes pairs (n, n + 1). Any reader snapshot
        // must come from a single writer epoch.
        let wmks = Arc::new(WorkerWatermarks::new());
        let writer = {
            let wmks = Arc::clone(&wmks);
            thread::spawn(move || {
                for n in 1..=2000u64 {
                    wmks.publish(TxId::new(n), TxId::new(n + 1));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let wmks = Arc::clone(&wmks);
                thread::spawn(move || {
                    let mut seen = 0u64;
                    while seen < 2000 {
                        let (all, short) = wmks.read();
                        if all.is_valid() {
                            assert_eq!(short.as_u64(), all.as_u64() + 1);
                        }
                        assert!(all.as_u64() >= seen);
                        seen = all.as_u64();
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_global_try_lock_never_blocks() {
        let global = GlobalWatermarks::new();
        let guard = global.try_lock();
        assert!(guard.is_some());
        // Second attempt while held must fail rather than wait.
        assert!(global.try_lock().is_none());
        drop(guard);
        assert!(global.try_lock().is_some());
    }

    #[test]
    fn test_global_active_tx_info() {
        let global = GlobalWatermarks::new();
        let _guard = global.try_lock().unwrap();
        global.update_active_tx_info(TxId::new(3), TxId::new(7), TxId::new(5));
        assert_eq!(global.oldest_active_tx(), TxId::new(3));
        assert_eq!(global.oldest_active_short_tx(), TxId::new(7));
        assert_eq!(global.newest_long_tx(), TxId::new(5));
    }
}
