//! Garbage collection: watermark recomputation, version purge, and
//! tombstone migration.
//!
//! GC is cooperative and runs on whichever worker happens to commit. A
//! probabilistic gate keeps the recomputation cost at roughly one scan per
//! N commits, and the global mutex is only ever try-locked, so a worker
//! that loses the race skips its round and retries at its next commit.

use rand::Rng;
use tracing::{debug, trace};
use verso_common::types::TxId;

use super::{Worker, WorkerStats};
use crate::history::{HistoryStorage, TreeRegistry};

impl Worker {
    /// Runs one GC round: recompute watermarks, purge dead update
    /// versions, and migrate tombstones to the graveyard.
    ///
    /// Driven from the worker thread after a writing commit. A no-op when
    /// GC is disabled.
    pub fn garbage_collection(&mut self) {
        if !self.store.config().enable_gc {
            return;
        }

        self.update_global_tx_watermarks();
        self.update_local_watermarks();

        // Remove versions that no transaction can still observe.
        if self.cleaned_wmk_of_short_tx <= self.local_wmk_of_all_tx {
            trace!(
                "purging history, worker_id={}, to_ts={}",
                self.worker_id(),
                self.local_wmk_of_all_tx
            );
            let registry = &self.tree_registry;
            let worker_id = self.state.worker_id();
            let mut purged = 0u64;
            self.history.purge_versions(
                TxId::INVALID,
                self.local_wmk_of_all_tx,
                &mut |version_tx_id, tree_id, payload, called_before| {
                    registry.garbage_collect(
                        tree_id,
                        payload,
                        worker_id,
                        version_tx_id,
                        called_before,
                    );
                    purged += 1;
                },
            );
            WorkerStats::add(&self.state.stats().versions_purged, purged);
            self.cleaned_wmk_of_short_tx = self.local_wmk_of_all_tx.next();
        } else {
            trace!(
                "skipping history purge, worker_id={}, cleaned={}, wmk_all={}",
                self.worker_id(),
                self.cleaned_wmk_of_short_tx,
                self.local_wmk_of_all_tx
            );
        }

        // Move tombstones the long-running readers may still need into the
        // graveyard.
        if self.store.config().enable_long_running_tx
            && self.local_wmk_of_all_tx < self.local_wmk_of_short_tx
            && self.cleaned_wmk_of_short_tx <= self.local_wmk_of_short_tx
        {
            trace!(
                "promoting tombstones, worker_id={}, from_ts={}, to_ts={}",
                self.worker_id(),
                self.cleaned_wmk_of_short_tx,
                self.local_wmk_of_short_tx
            );
            let registry = &self.tree_registry;
            let worker_id = self.state.worker_id();
            let mut promoted = 0u64;
            self.history.visit_removed_versions(
                self.cleaned_wmk_of_short_tx,
                self.local_wmk_of_short_tx,
                &mut |version_tx_id, tree_id, payload, called_before| {
                    registry.garbage_collect(
                        tree_id,
                        payload,
                        worker_id,
                        version_tx_id,
                        called_before,
                    );
                    promoted += 1;
                },
            );
            WorkerStats::add(&self.state.stats().tombstones_promoted, promoted);
            self.cleaned_wmk_of_short_tx = self.local_wmk_of_short_tx.next();
        }

        WorkerStats::incr(&self.state.stats().gc_runs);
    }

    /// Recomputes the per-worker and global watermarks.
    ///
    /// Gated probabilistically at 1/N (N = worker count) unless eager GC is
    /// on, then by the global try-lock. Either gate failing skips the round
    /// entirely; the next committing worker retries.
    pub(crate) fn update_global_tx_watermarks(&self) {
        let workers = self.store.workers();
        if workers.is_empty() {
            return;
        }

        let meet_gc_probability = self.store.config().enable_eager_gc
            || rand::thread_rng().gen_range(0..workers.len()) == 0;
        if !meet_gc_probability {
            trace!("skipping watermark update, worker_id={}, lost the draw", self.worker_id());
            return;
        }
        let Some(_guard) = self.store.global_wmk().try_lock() else {
            trace!(
                "skipping watermark update, worker_id={}, another worker holds the lock",
                self.worker_id()
            );
            return;
        };

        // Scan the active-transaction words. "No active transaction"
        // behaves as +inf for the oldest and -inf for the newest, so an
        // idle system lets everything age out.
        let mut oldest_tx = TxId::MAX;
        let mut oldest_short_tx = TxId::MAX;
        let mut newest_long_tx = TxId::INVALID;
        for sibling in workers {
            let Some(info) = sibling.active_tx() else {
                continue;
            };
            // Read-committed transactions never pin versions.
            if info.read_committed {
                continue;
            }

            oldest_tx = oldest_tx.min(info.tx_id);
            if info.long_running {
                newest_long_tx = newest_long_tx.max(info.tx_id);
            } else {
                oldest_short_tx = oldest_short_tx.min(info.tx_id);
            }
        }

        let global = self.store.global_wmk();
        global.update_active_tx_info(oldest_tx, oldest_short_tx, newest_long_tx);

        assert!(
            self.store.config().enable_long_running_tx || oldest_tx == oldest_short_tx,
            "oldest transaction {} diverged from oldest short-running transaction {} \
             with long-running transactions disabled",
            oldest_tx,
            oldest_short_tx
        );

        // Recompute each worker's lower watermarks, reusing the published
        // pair when that worker committed nothing since the last round.
        let mut global_wmk_of_all_tx = TxId::MAX;
        let mut global_wmk_of_short_tx = TxId::MAX;
        for sibling in workers {
            if sibling.watermarks().is_up_to_date() {
                let (wmk_all, wmk_short) = sibling.watermarks().read();
                trace!(
                    "reusing watermarks for worker {}, nothing committed since last round",
                    sibling.worker_id()
                );
                if wmk_all.is_valid() || wmk_short.is_valid() {
                    global_wmk_of_all_tx = global_wmk_of_all_tx.min(wmk_all);
                    global_wmk_of_short_tx = global_wmk_of_short_tx.min(wmk_short);
                }
                continue;
            }

            let wmk_all = sibling.commit_log().lcb(global.oldest_active_tx());
            let wmk_short = sibling.commit_log().lcb(global.oldest_active_short_tx());
            sibling.watermarks().publish(wmk_all, wmk_short);
            sibling.watermarks().mark_updated();
            debug!(
                "watermarks updated for worker {}, wmk_of_all_tx={}, wmk_of_short_tx={}",
                sibling.worker_id(),
                wmk_all,
                wmk_short
            );

            // A worker with no qualifying commits contributes nothing; its
            // zero watermarks would otherwise pin the global minimum.
            if wmk_all.is_valid() || wmk_short.is_valid() {
                global_wmk_of_all_tx = global_wmk_of_all_tx.min(wmk_all);
                global_wmk_of_short_tx = global_wmk_of_short_tx.min(wmk_short);
            }
        }

        // No worker moved: publishing the same minima again is pointless.
        if global.wmk_of_all_tx() == global_wmk_of_all_tx
            && global.wmk_of_short_tx() == global_wmk_of_short_tx
        {
            return;
        }

        // Still the sentinel: no worker has a usable lower bound yet.
        if global_wmk_of_all_tx == TxId::MAX || global_wmk_of_short_tx == TxId::MAX {
            trace!(
                "no usable global watermarks, wmk_of_all_tx={:?}, wmk_of_short_tx={:?}",
                global_wmk_of_all_tx,
                global_wmk_of_short_tx
            );
            return;
        }

        global.update_wmks(global_wmk_of_all_tx, global_wmk_of_short_tx);
        debug!(
            "global watermarks updated, wmk_of_all_tx={}, wmk_of_short_tx={}",
            global_wmk_of_all_tx, global_wmk_of_short_tx
        );
    }

    /// Snapshots this worker's published watermarks through the sequence
    /// lock.
    pub(crate) fn update_local_watermarks(&mut self) {
        let (wmk_all, wmk_short) = self.state.watermarks().read();
        self.local_wmk_of_all_tx = wmk_all;
        self.local_wmk_of_short_tx = wmk_short;

        debug_assert!(
            !self.store.config().enable_long_running_tx || wmk_all <= wmk_short,
            "watermark of all transactions {} above watermark of short transactions {}",
            wmk_all,
            wmk_short
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use verso_common::config::MvccConfig;
    use verso_common::types::{TreeId, TxId, WorkerId};

    use super::super::{MvccStore, Worker};
    use crate::history::{MemHistoryStorage, TreeRegistry};
    use crate::txn::{IsolationLevel, TxMode};

    /// Registry double that records every handed-back version.
    #[derive(Default)]
    struct RecordingRegistry {
        collected: Mutex<Vec<(u64, u64, bool)>>,
        count: AtomicU64,
    }

    impl TreeRegistry for RecordingRegistry {
        fn garbage_collect(
            &self,
            tree_id: TreeId,
            _payload: &[u8],
            _worker_id: WorkerId,
            version_tx_id: TxId,
            called_before: bool,
        ) {
            self.collected
                .lock()
                .push((version_tx_id.as_u64(), tree_id.as_u64(), called_before));
            self.count.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn eager_store(workers: usize) -> Arc<MvccStore> {
        MvccStore::new(
            MvccConfig::new(workers)
                .with_commit_log_capacity(64)
                .with_eager_gc(true),
        )
        .unwrap()
    }

    fn worker_with_registry(
        store: &Arc<MvccStore>,
        id: u32,
        registry: &Arc<RecordingRegistry>,
    ) -> Worker {
        store.worker(
            WorkerId::new(id),
            Box::new(MemHistoryStorage::new()),
            Arc::<RecordingRegistry>::clone(registry),
        )
    }

    fn commit_version(worker: &mut Worker, tree: u64, is_remove: bool) -> TxId {
        worker
            .begin(IsolationLevel::SnapshotIsolation, TxMode::ShortRunning)
            .unwrap();
        worker
            .put_version(TreeId::new(tree), is_remove, 4, &mut |buf| buf.fill(0))
            .unwrap();
        worker.commit().unwrap()
    }

    #[test]
    fn test_gc_disabled_is_noop() {
        let store = MvccStore::new(
            MvccConfig::new(1)
                .with_commit_log_capacity(64)
                .with_gc(false),
        )
        .unwrap();
        let registry = Arc::new(RecordingRegistry::default());
        let mut worker = worker_with_registry(&store, 0, &registry);

        for _ in 0..10 {
            commit_version(&mut worker, 1, false);
        }
        assert_eq!(registry.count.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(store.global_wmk().wmk_of_all_tx(), TxId::INVALID);
    }

    #[test]
    fn test_idle_system_purges_everything() {
        // With no concurrent readers, the oldest-active scan finds the +inf
        // sentinel, the LCB binds to the newest commit, and every version
        // goes out.
        let store = eager_store(1);
        let registry = Arc::new(RecordingRegistry::default());
        let mut worker = worker_with_registry(&store, 0, &registry);

        let mut last_commit = TxId::INVALID;
        for _ in 0..100 {
            last_commit = commit_version(&mut worker, 1, false);
        }

        assert_eq!(store.global_wmk().wmk_of_all_tx(), last_commit);
        // Every committed version has been handed to the registry; each
        // round purged the version its own commit produced.
        assert_eq!(registry.count.load(AtomicOrdering::SeqCst), 100);
    }

    #[test]
    fn test_watermarks_idempotent_without_new_commits() {
        let store = eager_store(2);
        let registry = Arc::new(RecordingRegistry::default());
        let mut w0 = worker_with_registry(&store, 0, &registry);

        commit_version(&mut w0, 1, false);
        let wmk_all = store.global_wmk().wmk_of_all_tx();
        let wmk_short = store.global_wmk().wmk_of_short_tx();
        assert!(wmk_all.is_valid());

        // No new commits: recomputation must not move anything.
        for _ in 0..5 {
            w0.update_global_tx_watermarks();
        }
        assert_eq!(store.global_wmk().wmk_of_all_tx(), wmk_all);
        assert_eq!(store.global_wmk().wmk_of_short_tx(), wmk_short);
    }

    #[test]
    fn test_active_reader_blocks_purge() {
        let store = eager_store(2);
        let registry = Arc::new(RecordingRegistry::default());
        let mut w0 = worker_with_registry(&store, 0, &registry);
        let mut w1 = worker_with_registry(&store, 1, &registry);

        // W1 holds a snapshot while W0 commits twice.
        commit_version(&mut w0, 1, false);
        let reader_start = w1
            .begin(IsolationLevel::SnapshotIsolation, TxMode::ShortRunning)
            .unwrap();
        let before = registry.count.load(AtomicOrdering::SeqCst);

        let c2 = commit_version(&mut w0, 1, false);
        let c3 = commit_version(&mut w0, 1, false);

        // The reader pins the watermark below its snapshot.
        assert!(store.global_wmk().wmk_of_all_tx() < reader_start);
        assert!(store.global_wmk().wmk_of_all_tx() < c2.min(c3));

        // Versions at or above the pin are still in history.
        let after = registry.count.load(AtomicOrdering::SeqCst);
        assert!(after <= before + 1, "purge ran past an active snapshot");
        w1.commit().unwrap();
    }

    #[test]
    fn test_long_tx_splits_watermarks_and_promotes_tombstones() {
        let store = eager_store(2);
        let registry = Arc::new(RecordingRegistry::default());
        let mut w0 = worker_with_registry(&store, 0, &registry);
        let mut w1 = worker_with_registry(&store, 1, &registry);

        // W1 starts a long-running snapshot; W0 commits updates and
        // tombstones past it.
        commit_version(&mut w0, 1, false);
        let long_start = w1
            .begin(IsolationLevel::SnapshotIsolation, TxMode::LongRunning)
            .unwrap();

        commit_version(&mut w0, 1, false);
        commit_version(&mut w0, 7, true);
        commit_version(&mut w0, 1, false);
        let last = commit_version(&mut w0, 7, true);

        // The long transaction pins the all-tx watermark but not the
        // short-tx watermark.
        let wmk_all = store.global_wmk().wmk_of_all_tx();
        let wmk_short = store.global_wmk().wmk_of_short_tx();
        assert!(wmk_all < long_start);
        assert_eq!(wmk_short, last);
        assert!(wmk_all < wmk_short);

        // The tombstones were promoted to the graveyard (handed to the
        // registry) even though the long reader still runs.
        let promoted: Vec<_> = registry
            .collected
            .lock()
            .iter()
            .filter(|(_, tree, _)| *tree == 7)
            .cloned()
            .collect();
        assert_eq!(promoted.len(), 2);

        w1.commit().unwrap();
    }

    #[test]
    fn test_cleaned_watermark_never_decreases() {
        let store = eager_store(1);
        let registry = Arc::new(RecordingRegistry::default());
        let mut worker = worker_with_registry(&store, 0, &registry);

        let mut last_cleaned = TxId::INVALID;
        for _ in 0..20 {
            commit_version(&mut worker, 1, false);
            assert!(worker.cleaned_wmk_of_short_tx >= last_cleaned);
            last_cleaned = worker.cleaned_wmk_of_short_tx;
        }
        assert!(last_cleaned.is_valid());
    }

    #[test]
    fn test_short_only_watermarks_equal() {
        let store = MvccStore::new(
            MvccConfig::new(2)
                .with_commit_log_capacity(64)
                .with_eager_gc(true)
                .with_long_running_tx(false),
        )
        .unwrap();
        let registry = Arc::new(RecordingRegistry::default());
        let mut w0 = worker_with_registry(&store, 0, &registry);

        for _ in 0..5 {
            commit_version(&mut w0, 1, false);
        }
        assert_eq!(
            store.global_wmk().wmk_of_all_tx(),
            store.global_wmk().wmk_of_short_tx()
        );
    }
}
