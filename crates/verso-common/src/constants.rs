//! System-wide constants for VersoDB.
//!
//! This module defines constants used across the concurrency-control
//! subsystem.

// =============================================================================
// Worker Constants
// =============================================================================

/// Default number of worker threads.
///
/// Matches the typical small-deployment core count. Deployments size this
/// from the machine topology at startup.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Maximum number of worker threads.
///
/// Worker ids are dense small integers assigned once at startup and never
/// reused, so the array of workers is fixed for the process lifetime.
pub const MAX_WORKERS: usize = 1024;

// =============================================================================
// Commit Log Constants
// =============================================================================

/// Default capacity of a worker's commit log before compaction runs.
///
/// One entry is appended per committed writing transaction; compaction at
/// transaction start keeps the log bounded regardless of commit rate.
pub const DEFAULT_COMMIT_LOG_CAPACITY: usize = 4096;

/// Minimum commit log capacity.
///
/// Compaction keeps at most one entry per live sibling plus the latest
/// entry, so a tiny capacity would thrash.
pub const MIN_COMMIT_LOG_CAPACITY: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_sane() {
        assert!(DEFAULT_WORKER_COUNT <= MAX_WORKERS);
        assert!(MIN_COMMIT_LOG_CAPACITY <= DEFAULT_COMMIT_LOG_CAPACITY);
    }
}
