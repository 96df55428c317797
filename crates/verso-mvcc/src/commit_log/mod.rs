//! Per-worker commit log: the ordered map from commit to start timestamps.
//!
//! Each worker appends one entry per committed writing transaction, in
//! commit order. Sibling workers query the log to answer the visibility
//! question "what is the newest commit of this worker that a snapshot taken
//! at `s` may observe" — the largest commit bound, [`CommitLog::lcb`].
//!
//! The log is kept bounded by [`CommitLog::compact`], which drops every
//! entry that no live transaction's snapshot can still resolve to.

use verso_common::types::TxId;

use crate::latch::HybridLatch;

/// One committed transaction of a worker: `(commit_ts, start_ts)`.
///
/// Ordering is by `commit_ts` first, which is also insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitLogEntry {
    /// Commit timestamp; strictly increasing within one log.
    pub commit_ts: TxId,
    /// Start timestamp of the same transaction.
    pub start_ts: TxId,
}

impl CommitLogEntry {
    /// Creates an entry.
    #[inline]
    #[must_use]
    pub const fn new(commit_ts: TxId, start_ts: TxId) -> Self {
        Self {
            commit_ts,
            start_ts,
        }
    }
}

/// A worker's commit log.
///
/// Mutated by its owning worker (append at commit, compaction at
/// transaction start); read by any worker under the optimistic latch mode.
pub struct CommitLog {
    entries: HybridLatch<Vec<CommitLogEntry>>,
    capacity: usize,
}

impl CommitLog {
    /// Creates an empty log that compacts once `capacity` entries
    /// accumulate.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HybridLatch::new(Vec::new()),
            capacity,
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns true once the log has reached its compaction threshold.
    pub fn needs_compaction(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Appends a committed transaction.
    ///
    /// The caller guarantees `commit_ts` exceeds every commit timestamp
    /// already in the log; commit timestamps are consumed in order.
    pub fn append(&self, start_ts: TxId, commit_ts: TxId) {
        let mut entries = self.entries.write();
        debug_assert!(entries.len() < self.capacity, "commit log over capacity");
        debug_assert!(
            entries.last().map_or(true, |last| last.commit_ts < commit_ts),
            "commit timestamps must be appended in increasing order"
        );
        debug_assert!(start_ts < commit_ts);
        entries.push(CommitLogEntry::new(commit_ts, start_ts));
    }

    /// Largest commit bound: the greatest `commit_ts` in the log strictly
    /// below `start_ts`, i.e. the newest commit of this worker that a
    /// snapshot taken at `start_ts` observes.
    ///
    /// Returns [`TxId::INVALID`] when no commit of this worker is visible
    /// at `start_ts`. Runs under the optimistic latch and restarts on
    /// version mismatch, so a call racing an append either sees the log
    /// before or after the append, never a torn state.
    pub fn lcb(&self, start_ts: TxId) -> TxId {
        loop {
            match self
                .entries
                .optimistic_read(|entries| Self::lcb_unlatched(entries, start_ts))
            {
                Ok(found) => {
                    return found.map_or(TxId::INVALID, |entry| entry.commit_ts);
                }
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Binary search for the last entry with `commit_ts < start_ts`.
    fn lcb_unlatched(entries: &[CommitLogEntry], start_ts: TxId) -> Option<CommitLogEntry> {
        let idx = entries.partition_point(|entry| entry.commit_ts < start_ts);
        if idx == 0 {
            return None;
        }
        let entry = entries[idx - 1];
        debug_assert!(entry.start_ts < start_ts);
        Some(entry)
    }

    /// Compacts the log down to the entries some live transaction can still
    /// resolve to: the most recent entry (so siblings always see this
    /// worker's newest commit) plus, for every active sibling transaction,
    /// the entry its snapshot binds to.
    ///
    /// No-op below the capacity threshold.
    pub fn compact(&self, active_sibling_tx: &[TxId]) {
        if !self.needs_compaction() {
            return;
        }

        let mut keep = std::collections::BTreeSet::new();
        {
            let entries = self.entries.read();
            if let Some(latest) = entries.last() {
                keep.insert(*latest);
            }
            for &start_ts in active_sibling_tx {
                if !start_ts.is_valid() {
                    continue;
                }
                if let Some(entry) = Self::lcb_unlatched(&entries, start_ts) {
                    keep.insert(entry);
                }
            }
        }

        let mut entries = self.entries.write();
        entries.clear();
        entries.extend(keep);
    }

    /// Snapshot of the entries, oldest first. Test and introspection aid.
    pub fn entries(&self) -> Vec<CommitLogEntry> {
        self.entries.read().clone()
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ts(v: u64) -> TxId {
        TxId::new(v)
    }

    #[test]
    fn test_lcb_empty() {
        let log = CommitLog::new(16);
        assert_eq!(log.lcb(ts(100)), TxId::INVALID);
    }

    #[test]
    fn test_lcb_bounds() {
        let log = CommitLog::new(16);
        log.append(ts(10), ts(11));
        log.append(ts(13), ts(14));

        // Query below the first commit: nothing visible.
        assert_eq!(log.lcb(ts(10)), TxId::INVALID);
        // Exactly at a commit: strict bound, the earlier entry does not
        // qualify until the snapshot is past it.
        assert_eq!(log.lcb(ts(11)), TxId::INVALID);
        assert_eq!(log.lcb(ts(12)), ts(11));
        assert_eq!(log.lcb(ts(14)), ts(11));
        assert_eq!(log.lcb(ts(15)), ts(14));
        // The +inf sentinel binds to the newest commit.
        assert_eq!(log.lcb(TxId::MAX), ts(14));
    }

    #[test]
    fn test_commit_ts_strictly_increasing() {
        let log = CommitLog::new(16);
        log.append(ts(1), ts(2));
        log.append(ts(3), ts(4));
        log.append(ts(5), ts(6));

        let entries = log.entries();
        for pair in entries.windows(2) {
            assert!(pair[0].commit_ts < pair[1].commit_ts);
            assert!(pair[1].start_ts > pair[0].commit_ts);
        }
    }

    #[test]
    fn test_compact_below_capacity_is_noop() {
        let log = CommitLog::new(16);
        log.append(ts(1), ts(2));
        log.compact(&[ts(3)]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_compact_keeps_latest_and_sibling_bounds() {
        // Worker committed at 2, 4, 6, 8; one sibling active at start_ts 5,
        // one idle. Kept: the sibling's bound (4, _) and the latest (8, _).
        let log = CommitLog::new(4);
        log.append(ts(1), ts(2));
        log.append(ts(3), ts(4));
        log.append(ts(5), ts(6));
        log.append(ts(7), ts(8));
        assert!(log.needs_compaction());

        log.compact(&[ts(5), TxId::INVALID]);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].commit_ts, ts(4));
        assert_eq!(entries[1].commit_ts, ts(8));

        // The sibling's visibility answer is unchanged by compaction.
        assert_eq!(log.lcb(ts(5)), ts(4));
        assert_eq!(log.lcb(TxId::MAX), ts(8));
    }

    #[test]
    fn test_compact_no_active_siblings() {
        let log = CommitLog::new(4);
        for i in 0..4u64 {
            log.append(ts(2 * i + 1), ts(2 * i + 2));
        }
        log.compact(&[]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.lcb(TxId::MAX), ts(8));
    }

    #[test]
    fn test_concurrent_lcb_and_append() {
        // An lcb racing appends must only ever return a commit_ts that was
        // appended, and results must be monotone for a fixed query once
        // observed.
        let log = Arc::new(CommitLog::new(100_000));
        let appender = {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..10_000u64 {
                    log.append(ts(2 * i + 1), ts(2 * i + 2));
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    let mut last = 0u64;
                    for _ in 0..10_000 {
                        let got = log.lcb(TxId::MAX).as_u64();
                        // Every observed commit_ts is even (only even values
                        // are appended) and never goes backwards.
                        assert_eq!(got % 2, 0);
                        assert!(got >= last);
                        last = got;
                    }
                })
            })
            .collect();

        appender.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
