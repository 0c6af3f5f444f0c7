// SPDX-License-Identifier: MIT

//! Bead mutation events, the WAL record type.

use anvil_core::{Bead, BeadDep, BeadId};
use serde::{Deserialize, Serialize};

/// One durable mutation of the bead graph.
///
/// Events carry everything `BeadGraph::apply` needs so replay is
/// deterministic and never consults a clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BeadEvent {
    /// Set the root id prefix
    Init { prefix: String },
    /// Insert a fully-formed bead (root or subtask)
    Create { bead: Bead },
    Claim {
        id: BeadId,
        actor: String,
        ts: u64,
    },
    Complete {
        id: BeadId,
        actor: String,
        ts: u64,
    },
    Fail {
        id: BeadId,
        reason: String,
        actor: String,
        ts: u64,
    },
    AddDep { dep: BeadDep },
    RemoveDep { issue: BeadId, depends_on: BeadId },
    Update {
        id: BeadId,
        field: String,
        value: String,
        ts: u64,
    },
    Delete { id: BeadId },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
