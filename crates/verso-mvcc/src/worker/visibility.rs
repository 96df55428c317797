//! Visibility decisions for the snapshot isolation levels.
//!
//! The question "can my transaction see the version written by transaction
//! `t` on worker `w`" reduces to one comparison against the largest commit
//! bound of `w` at my start timestamp. Three short-circuits keep the LCB
//! query off the hot path: the global watermark snapshot taken at begin,
//! and a per-sibling cache of the last LCB answer.

use verso_common::types::{TxId, WorkerId};

use super::Worker;
use crate::txn::IsolationLevel;

impl Worker {
    /// Decides whether the version written by transaction `tx_id` on
    /// worker `worker_id` is visible to this worker's active transaction.
    ///
    /// # Panics
    ///
    /// Panics when the active transaction runs read-committed; that level
    /// must not reach the MVCC visibility path.
    pub fn visible_for_me(&mut self, worker_id: WorkerId, tx_id: TxId) -> bool {
        // Own writes are always visible.
        if self.worker_id() == worker_id {
            return true;
        }

        match self.active_tx.isolation() {
            IsolationLevel::SnapshotIsolation | IsolationLevel::Serializable => {
                // The watermark snapshot from begin may lag the real global
                // watermark, but it is always a safe lower bound.
                if tx_id < self.global_wmk_of_all_tx {
                    return true;
                }

                let slot = worker_id.as_usize();
                let start_ts = self.active_tx.start_ts();

                // Cache hit for this snapshot: the cached LCB is exact.
                if self.lcb_cache_key[slot] == start_ts.as_u64() {
                    return self.lcb_cache_val[slot] >= tx_id.as_u64();
                }

                // A stale cache entry is still a lower bound: anything it
                // already covers stays visible for the newer snapshot.
                if self.lcb_cache_val[slot] >= tx_id.as_u64() {
                    return true;
                }

                let lcb = self.store.workers()[slot].commit_log().lcb(start_ts);
                if lcb.is_valid() {
                    self.lcb_cache_key[slot] = start_ts.as_u64();
                    self.lcb_cache_val[slot] = lcb.as_u64();
                    return lcb >= tx_id;
                }

                false
            }
            IsolationLevel::ReadCommitted => {
                panic!(
                    "unsupported isolation level in visibility check: {}",
                    self.active_tx.isolation()
                );
            }
        }
    }

    /// True when the version written by `tx_id` is visible to every
    /// transaction, present and future: it lies below the global
    /// all-transaction watermark.
    ///
    /// Before the first GC round the watermark is zero and nothing is
    /// visible-for-all.
    pub fn visible_for_all(&self, tx_id: TxId) -> bool {
        tx_id < self.store.global_wmk().wmk_of_all_tx()
    }
}
