//! Concurrency-control configuration.

use crate::constants::{
    DEFAULT_COMMIT_LOG_CAPACITY, DEFAULT_WORKER_COUNT, MAX_WORKERS, MIN_COMMIT_LOG_CAPACITY,
};

/// Configuration for the MVCC subsystem.
///
/// The worker count is fixed for the lifetime of the store; the remaining
/// switches tune garbage collection.
#[derive(Debug, Clone)]
pub struct MvccConfig {
    /// Number of worker threads. Sizes the worker array; worker ids are
    /// dense in `[0, worker_count)`.
    pub worker_count: usize,

    /// Master switch for garbage collection. When false, watermarks are
    /// never advanced and no versions are purged.
    pub enable_gc: bool,

    /// Bypass the probabilistic GC gate and attempt GC on every commit.
    pub enable_eager_gc: bool,

    /// Allow transactions to be classified long-running. When false, the
    /// oldest active transaction and the oldest short-running transaction
    /// must always coincide.
    pub enable_long_running_tx: bool,

    /// Commit log capacity; reaching it triggers compaction at the next
    /// transaction start.
    pub commit_log_capacity: usize,
}

impl Default for MvccConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            enable_gc: true,
            enable_eager_gc: false,
            enable_long_running_tx: true,
            commit_log_capacity: DEFAULT_COMMIT_LOG_CAPACITY,
        }
    }
}

impl MvccConfig {
    /// Creates a configuration for the given worker count.
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// Sets the GC master switch.
    #[must_use]
    pub fn with_gc(mut self, enable: bool) -> Self {
        self.enable_gc = enable;
        self
    }

    /// Sets eager GC (no probabilistic gate).
    #[must_use]
    pub fn with_eager_gc(mut self, enable: bool) -> Self {
        self.enable_eager_gc = enable;
        self
    }

    /// Sets whether long-running transactions are allowed.
    #[must_use]
    pub fn with_long_running_tx(mut self, enable: bool) -> Self {
        self.enable_long_running_tx = enable;
        self
    }

    /// Sets the commit log capacity.
    #[must_use]
    pub fn with_commit_log_capacity(mut self, capacity: usize) -> Self {
        self.commit_log_capacity = capacity;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("Worker count must be positive".to_string());
        }

        if self.worker_count > MAX_WORKERS {
            return Err(format!(
                "Worker count {} exceeds maximum {}",
                self.worker_count, MAX_WORKERS
            ));
        }

        if self.commit_log_capacity < MIN_COMMIT_LOG_CAPACITY {
            return Err(format!(
                "Commit log capacity must be at least {}",
                MIN_COMMIT_LOG_CAPACITY
            ));
        }

        // Compaction keeps one entry per live sibling plus the latest; the
        // capacity must leave room for that lower bound.
        if self.commit_log_capacity <= self.worker_count {
            return Err("Commit log capacity must exceed the worker count".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MvccConfig::default();
        assert!(config.enable_gc);
        assert!(!config.enable_eager_gc);
        assert!(config.enable_long_running_tx);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = MvccConfig::new(8)
            .with_eager_gc(true)
            .with_long_running_tx(false)
            .with_commit_log_capacity(64);

        assert_eq!(config.worker_count, 8);
        assert!(config.enable_eager_gc);
        assert!(!config.enable_long_running_tx);
        assert_eq!(config.commit_log_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        // Zero workers
        let config = MvccConfig::new(0);
        assert!(config.validate().is_err());

        // Too many workers
        let config = MvccConfig::new(MAX_WORKERS + 1);
        assert!(config.validate().is_err());

        // Capacity too small
        let config = MvccConfig::new(2).with_commit_log_capacity(2);
        assert!(config.validate().is_err());

        // Capacity not above worker count
        let config = MvccConfig::new(16).with_commit_log_capacity(16);
        assert!(config.validate().is_err());
    }
}
