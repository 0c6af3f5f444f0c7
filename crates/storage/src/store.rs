// SPDX-License-Identifier: MIT

//! The typed bead-store wrapper: validated operations over the persistent
//! graph.
//!
//! Validation happens here, before anything is logged; the WAL therefore
//! only ever contains applicable events and `BeadGraph::apply` can stay
//! infallible. Every mutation is WAL-append (fsynced) then apply. A
//! snapshot is cut every [`CHECKPOINT_EVERY`] mutations and on close.

use anvil_core::{Bead, BeadDep, BeadId, BeadStatus, Clock, DepKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::event::BeadEvent;
use crate::graph::{BeadGraph, UPDATABLE_FIELDS};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::wal::{Wal, WalError};

/// Mutations between automatic checkpoints.
const CHECKPOINT_EVERY: u64 = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such bead: {0}")]
    NotFound(BeadId),
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("dependency cycle: {0} already depends on {1}")]
    Cycle(BeadId, BeadId),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Status filter for `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BeadFilter {
    #[default]
    All,
    Status(BeadStatus),
}

pub struct BeadStore {
    graph: BeadGraph,
    wal: Wal,
    snapshot_path: PathBuf,
    wal_seq: u64,
    mutations_since_checkpoint: u64,
    clock: Arc<dyn Clock>,
}

/// Default store directory: `<home>/.beads`.
pub fn default_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".beads")
}

impl BeadStore {
    /// Open (or create) the store in `dir`, recovering snapshot + WAL.
    pub fn open(dir: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let snapshot_path = dir.join("beads.snapshot");
        let wal_path = dir.join("beads.wal");

        let (mut graph, snapshot_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => {
                info!(
                    seq = snapshot.seq,
                    beads = snapshot.graph.beads.len(),
                    "loaded bead snapshot"
                );
                (snapshot.graph, snapshot.seq)
            }
            None => (BeadGraph::default(), 0),
        };

        let wal = Wal::open(&wal_path)?;
        let replay = wal.entries_after(snapshot_seq)?;
        let replay_count = replay.len();
        for entry in replay {
            graph.apply(&entry.event);
        }
        if replay_count > 0 {
            info!(count = replay_count, after = snapshot_seq, "replayed bead WAL entries");
        }

        Ok(Self {
            wal_seq: wal.write_seq(),
            graph,
            wal,
            snapshot_path,
            mutations_since_checkpoint: 0,
            clock,
        })
    }

    /// Log, apply, and maybe checkpoint one event.
    fn commit(&mut self, event: BeadEvent) -> Result<(), StoreError> {
        self.wal_seq = self.wal.append(&event)?;
        self.graph.apply(&event);
        self.mutations_since_checkpoint += 1;
        if self.mutations_since_checkpoint >= CHECKPOINT_EVERY {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Cut a snapshot and truncate the WAL through it.
    pub fn checkpoint(&mut self) -> Result<(), StoreError> {
        Snapshot::new(self.wal_seq, self.graph.clone()).save(&self.snapshot_path)?;
        self.wal.truncate_through(self.wal_seq)?;
        self.mutations_since_checkpoint = 0;
        debug!(seq = self.wal_seq, "bead checkpoint complete");
        Ok(())
    }

    /// Set the root id prefix.
    pub fn init(&mut self, prefix: &str) -> Result<(), StoreError> {
        self.commit(BeadEvent::Init {
            prefix: prefix.to_string(),
        })
    }

    /// Create a root bead. Creation never assigns; `claim` does.
    pub fn create(
        &mut self,
        title: &str,
        description: &str,
        _actor: &str,
    ) -> Result<BeadId, StoreError> {
        let id = self.graph.next_root_id();
        let now = self.clock.unix_secs();
        let new = Bead::new(id.clone(), title, description, now);
        self.commit(BeadEvent::Create { bead: new })?;
        Ok(id)
    }

    /// Create a subtask of `parent` and the parent-child edge gating the
    /// parent on it.
    pub fn create_subtask(
        &mut self,
        parent: &BeadId,
        title: &str,
        description: &str,
        _actor: &str,
    ) -> Result<BeadId, StoreError> {
        if !self.graph.beads.contains_key(parent) {
            return Err(StoreError::NotFound(parent.clone()));
        }
        let id = self.graph.next_child_id(parent);
        let now = self.clock.unix_secs();
        let new = Bead::new(id.clone(), title, description, now);
        self.commit(BeadEvent::Create { bead: new })?;
        self.commit(BeadEvent::AddDep {
            dep: BeadDep {
                issue: parent.clone(),
                depends_on: id.clone(),
                kind: DepKind::ParentChild,
            },
        })?;
        Ok(id)
    }

    /// Set assignee and move to `in_progress` atomically.
    pub fn claim(&mut self, id: &BeadId, actor: &str) -> Result<(), StoreError> {
        self.require(id)?;
        let ts = self.clock.unix_secs();
        self.commit(BeadEvent::Claim {
            id: id.clone(),
            actor: actor.to_string(),
            ts,
        })
    }

    pub fn complete(&mut self, id: &BeadId, actor: &str) -> Result<(), StoreError> {
        self.require(id)?;
        let ts = self.clock.unix_secs();
        self.commit(BeadEvent::Complete {
            id: id.clone(),
            actor: actor.to_string(),
            ts,
        })
    }

    pub fn fail(&mut self, id: &BeadId, reason: &str, actor: &str) -> Result<(), StoreError> {
        self.require(id)?;
        let ts = self.clock.unix_secs();
        self.commit(BeadEvent::Fail {
            id: id.clone(),
            reason: reason.to_string(),
            actor: actor.to_string(),
            ts,
        })
    }

    pub fn add_dep(&mut self, child: &BeadId, parent: &BeadId) -> Result<(), StoreError> {
        self.require(child)?;
        self.require(parent)?;
        // Reject an edge that would close a cycle
        if self.depends_transitively(parent, child) {
            return Err(StoreError::Cycle(parent.clone(), child.clone()));
        }
        self.commit(BeadEvent::AddDep {
            dep: BeadDep {
                issue: child.clone(),
                depends_on: parent.clone(),
                kind: DepKind::Blocks,
            },
        })
    }

    pub fn remove_dep(&mut self, child: &BeadId, parent: &BeadId) -> Result<(), StoreError> {
        self.require(child)?;
        self.require(parent)?;
        self.commit(BeadEvent::RemoveDep {
            issue: child.clone(),
            depends_on: parent.clone(),
        })
    }

    pub fn update(&mut self, id: &BeadId, field: &str, value: &str) -> Result<(), StoreError> {
        self.require(id)?;
        if !UPDATABLE_FIELDS.contains(&field) {
            return Err(StoreError::InvalidField(field.to_string()));
        }
        if field == "status" && BeadStatus::parse(value).is_none() {
            return Err(StoreError::InvalidField(format!("status={value}")));
        }
        let ts = self.clock.unix_secs();
        self.commit(BeadEvent::Update {
            id: id.clone(),
            field: field.to_string(),
            value: value.to_string(),
            ts,
        })
    }

    pub fn delete(&mut self, id: &BeadId) -> Result<(), StoreError> {
        self.require(id)?;
        self.commit(BeadEvent::Delete { id: id.clone() })
    }

    pub fn get(&self, id: &BeadId) -> Result<&Bead, StoreError> {
        self.graph.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub fn list(&self, filter: BeadFilter) -> Vec<&Bead> {
        self.graph
            .beads
            .values()
            .filter(|b| match filter {
                BeadFilter::All => true,
                BeadFilter::Status(s) => b.status == s,
            })
            .collect()
    }

    pub fn ready(&self, role: Option<&str>) -> Vec<&Bead> {
        self.graph.ready(role)
    }

    pub fn blockers(&self, id: &BeadId) -> Result<Vec<BeadId>, StoreError> {
        self.require(id)?;
        Ok(self.graph.blockers(id))
    }

    pub fn subtree(&self, id: &BeadId) -> Result<Vec<&Bead>, StoreError> {
        self.require(id)?;
        Ok(self.graph.subtree(id))
    }

    pub fn graph(&self) -> &BeadGraph {
        &self.graph
    }

    fn require(&self, id: &BeadId) -> Result<(), StoreError> {
        if self.graph.beads.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    /// Whether `from` reaches `to` over existing dependency edges.
    fn depends_transitively(&self, from: &BeadId, to: &BeadId) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = std::collections::BTreeSet::new();
        while let Some(current) = stack.pop() {
            if &current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            for dep in &self.graph.deps {
                if dep.issue == current {
                    stack.push(dep.depends_on.clone());
                }
            }
        }
        false
    }
}

impl Drop for BeadStore {
    fn drop(&mut self) {
        if self.mutations_since_checkpoint > 0 {
            if let Err(e) = self.checkpoint() {
                tracing::warn!(error = %e, "final bead checkpoint failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
