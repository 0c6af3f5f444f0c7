// SPDX-License-Identifier: MIT

//! Bead (task) records and dependency edges.
//!
//! Bead ids carry structure: roots are `<prefix>-<n>`, subtasks append a
//! dotted counter (`an-3.1`, `an-3.1.2`). The counter arithmetic lives here
//! so the store and the file server agree on it.

use serde::{Deserialize, Serialize};

use crate::id::BeadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Closed,
}

impl BeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeadStatus::Open => "open",
            BeadStatus::InProgress => "in_progress",
            BeadStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "open" => Some(BeadStatus::Open),
            "in_progress" => Some(BeadStatus::InProgress),
            "closed" => Some(BeadStatus::Closed),
            _ => None,
        }
    }
}

/// Dependency edge type. Only `Blocks` edges gate readiness; `ParentChild`
/// records subtask structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepKind {
    #[serde(rename = "blocks")]
    Blocks,
    #[serde(rename = "parent-child")]
    ParentChild,
}

/// One persistent task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    pub id: BeadId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: BeadStatus,
    /// 0 (urgent) .. 4 (backlog); default 2
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Role filter for `ready`; unset means any role may pick it up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Unix seconds
    pub created_at: u64,
    pub updated_at: u64,
}

fn default_priority() -> u8 {
    2
}

fn default_issue_type() -> String {
    "task".to_string()
}

impl Bead {
    pub fn new(id: BeadId, title: impl Into<String>, description: impl Into<String>, now: u64) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            status: BeadStatus::Open,
            priority: default_priority(),
            issue_type: default_issue_type(),
            assignee: None,
            role: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A directed dependency edge: `issue` depends on `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadDep {
    pub issue: BeadId,
    pub depends_on: BeadId,
    pub kind: DepKind,
}

/// Compose the id of the `n`-th direct child of `parent`.
pub fn child_id(parent: &BeadId, n: u64) -> BeadId {
    BeadId::new(format!("{}.{}", parent, n))
}

/// The parent id of a dotted subtask id, or `None` for roots.
pub fn parent_id(id: &BeadId) -> Option<BeadId> {
    id.as_str().rsplit_once('.').map(|(p, _)| BeadId::new(p))
}

/// The direct-child counter of `id` under `parent`, if `id` is a direct
/// child of `parent` with a numeric suffix.
pub fn child_counter(parent: &BeadId, id: &BeadId) -> Option<u64> {
    let rest = id.as_str().strip_prefix(parent.as_str())?;
    let rest = rest.strip_prefix('.')?;
    if rest.contains('.') {
        return None; // grandchild
    }
    rest.parse().ok()
}

#[cfg(test)]
#[path = "bead_tests.rs"]
mod tests;
