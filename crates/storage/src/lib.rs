// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-storage: the durable bead (task) store.
//!
//! Layout mirrors classic snapshot-plus-WAL recovery: every mutation is a
//! [`BeadEvent`] appended (and fsynced) to a JSONL WAL before it is applied
//! to the in-memory [`BeadGraph`]; snapshots bound replay time and are the
//! only compaction point.

pub mod event;
pub mod graph;
pub mod snapshot;
pub mod store;
pub mod wal;

pub use event::BeadEvent;
pub use graph::BeadGraph;
pub use snapshot::{Snapshot, SnapshotError};
pub use store::{default_dir, BeadFilter, BeadStore, StoreError};
pub use wal::{Wal, WalEntry, WalError};
