//! # verso-common
//!
//! Common types, errors, and configuration for VersoDB.
//!
//! This crate provides the foundational types shared across the VersoDB
//! components:
//!
//! - **Types**: Core identifiers (`TxId`, `WorkerId`, `TreeId`, `CommandId`)
//! - **Errors**: Unified error handling with `VersoError`
//! - **Config**: Concurrency-control configuration structures
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use verso_common::types::{TxId, WorkerId};
//! use verso_common::error::VersoResult;
//!
//! fn example() -> VersoResult<()> {
//!     let tx = TxId::new(42);
//!     let worker = WorkerId::new(0);
//!     assert!(tx.is_valid());
//!     assert_eq!(worker.as_usize(), 0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::MvccConfig;
pub use constants::*;
pub use error::{VersoError, VersoResult};
pub use types::{CommandId, TreeId, TxId, WorkerId};
