//! In-memory history storage.
//!
//! A `BTreeMap` keyed by `(start_ts, command_id)` so that range purges and
//! tombstone visitations are ordered scans. Payloads live in [`Bytes`]
//! buffers filled by the caller's writer closure.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use verso_common::types::{CommandId, TreeId, TxId};

use super::{HistoryStorage, VersionVisitor};

/// Key of one version record.
type VersionKey = (u64, u32);

#[derive(Debug)]
struct VersionRecord {
    tree_id: TreeId,
    is_remove: bool,
    payload: Bytes,
    /// Set once a visitor has seen this record; later rounds report
    /// `called_before = true`.
    visited: bool,
}

/// In-memory [`HistoryStorage`] implementation.
///
/// One instance per worker; the mutex is uncontended in normal operation
/// because only the owning worker touches its partition.
#[derive(Debug, Default)]
pub struct MemHistoryStorage {
    versions: Mutex<BTreeMap<VersionKey, VersionRecord>>,
}

impl MemHistoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions.
    pub fn len(&self) -> usize {
        self.versions.lock().len()
    }

    /// Returns true if the store holds no versions.
    pub fn is_empty(&self) -> bool {
        self.versions.lock().is_empty()
    }

    fn range_bounds(from_ts: TxId, to_ts: TxId) -> (Bound<VersionKey>, Bound<VersionKey>) {
        (
            Bound::Included((from_ts.as_u64(), 0)),
            Bound::Included((to_ts.as_u64(), u32::MAX)),
        )
    }
}

impl HistoryStorage for MemHistoryStorage {
    fn put_version(
        &self,
        start_ts: TxId,
        command_id: CommandId,
        tree_id: TreeId,
        is_remove: bool,
        payload_size: usize,
        writer: &mut dyn FnMut(&mut [u8]),
    ) {
        let mut payload = BytesMut::zeroed(payload_size);
        writer(&mut payload);

        let record = VersionRecord {
            tree_id,
            is_remove,
            payload: payload.freeze(),
            visited: false,
        };

        let mut versions = self.versions.lock();
        versions.insert((start_ts.as_u64(), command_id.as_u32()), record);
    }

    fn purge_versions(&self, from_ts: TxId, to_ts: TxId, visitor: &mut VersionVisitor<'_>) {
        if from_ts > to_ts {
            return;
        }

        let mut versions = self.versions.lock();
        let keys: Vec<VersionKey> = versions
            .range(Self::range_bounds(from_ts, to_ts))
            .map(|(key, _)| *key)
            .collect();

        for key in keys {
            if let Some(record) = versions.remove(&key) {
                visitor(
                    TxId::new(key.0),
                    record.tree_id,
                    &record.payload,
                    record.visited,
                );
            }
        }
    }

    fn visit_removed_versions(
        &self,
        from_ts: TxId,
        to_ts: TxId,
        visitor: &mut VersionVisitor<'_>,
    ) {
        if from_ts > to_ts {
            return;
        }

        let mut versions = self.versions.lock();
        for (key, record) in versions.range_mut(Self::range_bounds(from_ts, to_ts)) {
            if !record.is_remove {
                continue;
            }
            visitor(
                TxId::new(key.0),
                record.tree_id,
                &record.payload,
                record.visited,
            );
            record.visited = true;
        }
    }
}
