//! Version history storage and the tree-registry callback contract.
//!
//! The concurrency-control core appends opaque version payloads keyed by
//! `(start_ts, command_id)` and later purges ranges of them once the
//! watermarks pass. Payload layout belongs to the owning tree; the core
//! only shepherds bytes between the writer and the registry callback.

mod memory;

pub use memory::MemHistoryStorage;

use verso_common::types::{CommandId, TreeId, TxId, WorkerId};

/// Callback invoked for every version handed back during a purge or a
/// removed-version visitation.
///
/// Arguments: the creating transaction's start timestamp, the owning tree,
/// the payload, and whether this version was already handed to a visitor in
/// an earlier round.
pub type VersionVisitor<'a> = dyn FnMut(TxId, TreeId, &[u8], bool) + 'a;

/// Append-only, per-worker version store.
///
/// One instance per worker; writes and purges run only on the owning
/// worker. Implementations need `Send` so a worker handle can move to its
/// thread, but no `Sync` is required.
pub trait HistoryStorage: Send {
    /// Appends a version record keyed by `(start_ts, command_id)`.
    ///
    /// `writer` fills the `payload_size`-byte payload in place.
    fn put_version(
        &self,
        start_ts: TxId,
        command_id: CommandId,
        tree_id: TreeId,
        is_remove: bool,
        payload_size: usize,
        writer: &mut dyn FnMut(&mut [u8]),
    );

    /// Removes every version with `start_ts` in `[from_ts, to_ts]`,
    /// handing each to `visitor` before it is dropped.
    fn purge_versions(&self, from_ts: TxId, to_ts: TxId, visitor: &mut VersionVisitor<'_>);

    /// Visits (without removing) the remove tombstones with `start_ts` in
    /// `[from_ts, to_ts]`, so they can be promoted to the graveyard.
    fn visit_removed_versions(&self, from_ts: TxId, to_ts: TxId, visitor: &mut VersionVisitor<'_>);
}

/// Registry of index structures that own version payloads.
///
/// When a version leaves the history store (purge) or a tombstone is
/// promoted to the graveyard, the owning tree releases or relocates the
/// payload structurally through this callback.
pub trait TreeRegistry: Send + Sync {
    /// Hands a version back to its owning tree.
    ///
    /// `called_before` is true when this version was already handed over in
    /// an earlier round, letting the tree skip repeated work.
    fn garbage_collect(
        &self,
        tree_id: TreeId,
        payload: &[u8],
        worker_id: WorkerId,
        version_tx_id: TxId,
        called_before: bool,
    );
}
