//! # verso-mvcc
//!
//! Multi-version concurrency control for VersoDB.
//!
//! This crate implements snapshot-isolation visibility over a fixed pool of
//! worker threads, with no central serialization point on the read path:
//!
//! - Per-worker **commit logs** mapping commit to start timestamps, read by
//!   siblings under an optimistic hybrid latch
//! - A **visibility oracle** answering "is this version visible to my
//!   snapshot" from largest-commit-bound queries and per-sibling caches
//! - **Watermark** computation bounding the oldest observable timestamp,
//!   published through per-worker sequence locks
//! - A cooperative **garbage collector** purging dead versions and
//!   shepherding remove tombstones through a two-stage graveyard
//! - An ordered **commit chain** that consumes commit timestamps in
//!   allocation order regardless of commit completion order
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use verso_common::config::MvccConfig;
//! use verso_common::types::{TreeId, TxId, WorkerId};
//! use verso_mvcc::history::{MemHistoryStorage, TreeRegistry};
//! use verso_mvcc::txn::{IsolationLevel, TxMode};
//! use verso_mvcc::worker::MvccStore;
//!
//! struct Registry;
//!
//! impl TreeRegistry for Registry {
//!     fn garbage_collect(&self, _: TreeId, _: &[u8], _: WorkerId, _: TxId, _: bool) {}
//! }
//!
//! let store = MvccStore::new(MvccConfig::new(2)).unwrap();
//! let mut worker = store.worker(
//!     WorkerId::new(0),
//!     Box::new(MemHistoryStorage::new()),
//!     Arc::new(Registry),
//! );
//!
//! worker.begin(IsolationLevel::SnapshotIsolation, TxMode::ShortRunning).unwrap();
//! worker.put_version(TreeId::new(1), false, 8, &mut |buf| buf.fill(0)).unwrap();
//! let commit_ts = worker.commit().unwrap();
//! assert!(commit_ts.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit_log;
pub mod history;
pub mod latch;
pub mod txn;
pub mod watermark;
pub mod worker;

pub use commit_log::{CommitLog, CommitLogEntry};
pub use history::{HistoryStorage, MemHistoryStorage, TreeRegistry};
pub use latch::{HybridLatch, NeedRetry};
pub use txn::{
    CommitCallback, CommitChain, CommitContext, IsolationLevel, TimestampOracle, Transaction,
    TxMode, TxState,
};
pub use watermark::{GlobalWatermarks, WorkerWatermarks};
pub use worker::{ActiveTxInfo, MvccStore, Worker, WorkerState, WorkerStats};
