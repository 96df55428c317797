//! Core types for VersoDB.

mod ids;

pub use ids::{CommandId, TreeId, TxId, WorkerId};
