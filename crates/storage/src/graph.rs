// SPDX-License-Identifier: MIT

//! Materialized bead graph built by replaying [`BeadEvent`]s.
//!
//! Readiness counts every dependency edge: a bead is ready when it is open
//! and each of its predecessors is closed. `blocks` edges are the explicit
//! form; `parent-child` edges (inserted by subtask creation) gate the
//! parent on its children the same way, and additionally drive subtree
//! queries.

use anvil_core::{bead, Bead, BeadDep, BeadId, BeadStatus, DepKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::BeadEvent;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BeadGraph {
    /// Root-id prefix set by `init` (default "an")
    #[serde(default)]
    pub prefix: Option<String>,
    pub beads: BTreeMap<BeadId, Bead>,
    #[serde(default)]
    pub deps: Vec<BeadDep>,
    /// Next root counter (roots are `<prefix>-<n>`)
    #[serde(default)]
    pub root_counter: u64,
    /// Per-parent subtask counters. Kept explicitly so counters are
    /// monotonic even after the highest-numbered child is deleted.
    #[serde(default)]
    pub child_counters: BTreeMap<BeadId, u64>,
}

impl BeadGraph {
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("an")
    }

    /// The id the next root bead will get (allocation happens in `apply`).
    pub fn next_root_id(&self) -> BeadId {
        BeadId::new(format!("{}-{}", self.prefix(), self.root_counter + 1))
    }

    /// The id the next direct subtask of `parent` will get.
    pub fn next_child_id(&self, parent: &BeadId) -> BeadId {
        let n = self.child_counters.get(parent).copied().unwrap_or(0);
        bead::child_id(parent, n + 1)
    }

    pub fn get(&self, id: &BeadId) -> Option<&Bead> {
        self.beads.get(id)
    }

    /// Open predecessor ids of `id`, across both edge kinds.
    pub fn blockers(&self, id: &BeadId) -> Vec<BeadId> {
        self.deps
            .iter()
            .filter(|d| &d.issue == id)
            .filter(|d| {
                self.beads
                    .get(&d.depends_on)
                    .is_some_and(|b| b.status != BeadStatus::Closed)
            })
            .map(|d| d.depends_on.clone())
            .collect()
    }

    /// Ready beads: open, every predecessor closed, and (when a role
    /// filter is given) role unset or matching.
    pub fn ready(&self, role: Option<&str>) -> Vec<&Bead> {
        self.beads
            .values()
            .filter(|b| b.status == BeadStatus::Open)
            .filter(|b| self.blockers(&b.id).is_empty())
            .filter(|b| match (role, &b.role) {
                (Some(filter), Some(r)) => filter == r,
                _ => true,
            })
            .collect()
    }

    /// `id` plus all descendants reachable over parent-child edges.
    pub fn subtree(&self, id: &BeadId) -> Vec<&Bead> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(bead) = self.beads.get(&current) {
                out.push(bead);
            }
            for dep in &self.deps {
                if dep.kind == DepKind::ParentChild && dep.issue == current {
                    stack.push(dep.depends_on.clone());
                }
            }
        }
        out
    }

    /// Apply one event. Replay-safe: unknown ids are ignored rather than
    /// errors, because validation happened before the event was logged.
    pub fn apply(&mut self, event: &BeadEvent) {
        match event {
            BeadEvent::Init { prefix } => {
                self.prefix = Some(prefix.clone());
            }
            BeadEvent::Create { bead: new } => {
                // Advance the counter the new id was drawn from
                if let Some(parent) = bead::parent_id(&new.id) {
                    if let Some(n) = bead::child_counter(&parent, &new.id) {
                        let counter = self.child_counters.entry(parent).or_insert(0);
                        *counter = (*counter).max(n);
                    }
                } else if let Some(n) = new
                    .id
                    .as_str()
                    .strip_prefix(&format!("{}-", self.prefix()))
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    self.root_counter = self.root_counter.max(n);
                }
                self.beads.insert(new.id.clone(), new.clone());
            }
            BeadEvent::Claim { id, actor, ts } => {
                if let Some(b) = self.beads.get_mut(id) {
                    b.assignee = Some(actor.clone());
                    b.status = BeadStatus::InProgress;
                    b.updated_at = *ts;
                }
            }
            BeadEvent::Complete { id, ts, .. } => {
                if let Some(b) = self.beads.get_mut(id) {
                    b.status = BeadStatus::Closed;
                    b.updated_at = *ts;
                }
            }
            BeadEvent::Fail { id, reason, ts, .. } => {
                if let Some(b) = self.beads.get_mut(id) {
                    b.status = BeadStatus::Closed;
                    b.issue_type = format!("failed:{reason}");
                    b.updated_at = *ts;
                }
            }
            BeadEvent::AddDep { dep } => {
                if !self.deps.contains(dep) {
                    self.deps.push(dep.clone());
                }
            }
            BeadEvent::RemoveDep { issue, depends_on } => {
                self.deps
                    .retain(|d| !(&d.issue == issue && &d.depends_on == depends_on));
            }
            BeadEvent::Update { id, field, value, ts } => {
                if let Some(b) = self.beads.get_mut(id) {
                    apply_field(b, field, value);
                    b.updated_at = *ts;
                }
            }
            BeadEvent::Delete { id } => {
                self.beads.remove(id);
                self.deps.retain(|d| &d.issue != id && &d.depends_on != id);
            }
        }
    }
}

/// Set one updatable field. Unknown fields were rejected before logging.
fn apply_field(bead: &mut Bead, field: &str, value: &str) {
    match field {
        "title" => bead.title = value.to_string(),
        "description" => bead.description = value.to_string(),
        "status" => {
            if let Some(status) = BeadStatus::parse(value) {
                bead.status = status;
            }
        }
        "priority" => {
            if let Ok(p) = value.parse() {
                bead.priority = p;
            }
        }
        "issue_type" => bead.issue_type = value.to_string(),
        "assignee" => {
            bead.assignee = (!value.is_empty()).then(|| value.to_string());
        }
        "role" => {
            bead.role = (!value.is_empty()).then(|| value.to_string());
        }
        _ => {}
    }
}

/// Fields accepted by `update`.
pub const UPDATABLE_FIELDS: &[&str] = &[
    "title",
    "description",
    "status",
    "priority",
    "issue_type",
    "assignee",
    "role",
];

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
