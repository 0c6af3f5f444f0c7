// SPDX-License-Identifier: MIT

//! Events published on the daemon bus and streamed over the `events` file.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Agent identity used for events the daemon itself emits.
pub const SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    StateChange,
    UserSend,
    UserRecv,
    BotSend,
    BotRecv,
}

/// One immutable bus event, serialized as a single JSON line on reads of
/// the `events` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Unix seconds
    pub ts: u64,
    /// Session id, or [`SYSTEM`]
    pub agent: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(ts: u64, agent: impl Into<String>, kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ts,
            agent: agent.into(),
            kind,
            data,
        }
    }

    /// A session state transition.
    pub fn state_change(
        ts: u64,
        agent: impl Into<String>,
        old: SessionState,
        new: SessionState,
    ) -> Self {
        Self::new(
            ts,
            agent,
            EventKind::StateChange,
            serde_json::json!({ "old": old, "new": new }),
        )
    }

    /// Mail movement between a session and the user (or another session).
    pub fn mail(ts: u64, agent: impl Into<String>, kind: EventKind, msg_id: &str) -> Self {
        Self::new(ts, agent, kind, serde_json::json!({ "msg": msg_id }))
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
