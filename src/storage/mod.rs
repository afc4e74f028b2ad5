//! Record Store Module
//!
//! Implements the shared key-value table every consumer group reads and writes.
//!
//! ## Core Concepts
//! - **Composite keys**: rows are addressed by `(partition_key, sort_key)`.
//! - **Sharding**: `Partitioner` spreads keys over a fixed set of `DashMap` shards so
//!   writers on different keys never contend on the same lock.
//! - **Expiry**: a row past its `expires_at` is reported as absent immediately and is
//!   physically removed later by the background reclaimer.
//! - **Conflicts**: concurrent writes to one key are last-write-wins; no merge happens here.

pub mod handlers;
pub mod memory;
pub mod partitioner;
pub mod protocol;
pub mod types;
