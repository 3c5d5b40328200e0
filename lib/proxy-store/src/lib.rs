//! In-memory, revisioned store of services and endpoints for a service proxy
//!
//! This library provides:
//! - A store that serializes writers and lets readers wait for a revision
//! - Transactions scoped to a single `update` or `view` callback
//! - Per-source endpoint partitions merged on read
//! - Prometheus metrics for commits and reads
//!
//! Feeders write through [`Store::update`]; consumers read through
//! [`Store::view`]. Each feeder owns a source identifier and replaces the
//! endpoints it reports for a service as a whole.

pub mod error;
pub mod metrics;
mod source_index;
mod state;
pub mod store;
pub mod txn;

pub use error::{Result, StoreError};
pub use metrics::StoreMetrics;
pub use store::Store;
pub use txn::{ReadTx, SyncKind, Txn, WriteTx};

/// Store revision. Starts at 0 and grows by one per committed update.
pub type Revision = u64;

/// Revision passed to [`Store::view`] to read whatever is current
pub const LATEST: Revision = 0;
