// SPDX-License-Identifier: MIT

//! Session lifecycle states and the legal-transition table.
//!
//! The table here is the single source of truth for both the engine's own
//! transitions and validation of manual writes to a session's `state` file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one supervised backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Window spawned, waiting for the backend to become ready
    Starting,
    /// Ready for a prompt
    Idle,
    /// A prompt is in flight
    Running,
    /// Backend process is gone but the window and identity survive
    Stopped,
    /// Startup or send failed; recoverable via refresh or restart
    Error,
    /// Closed. Terminal: the window and FIFO have been torn down.
    Exited,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Error => "error",
            SessionState::Exited => "exited",
        }
    }

    /// Parse the lowercase form used in the `state` file.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "starting" => Some(SessionState::Starting),
            "idle" => Some(SessionState::Idle),
            "running" => Some(SessionState::Running),
            "stopped" => Some(SessionState::Stopped),
            "error" => Some(SessionState::Error),
            "exited" => Some(SessionState::Exited),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Exited)
    }

    /// Whether `from -> to` is a legal edge of the lifecycle machine.
    ///
    /// Self-transitions are not edges; idempotent operations (stop on a
    /// stopped session) are short-circuited by the engine before reaching
    /// this table. `Error` has two recovery edges: `-> Idle` (manual
    /// refresh) and `-> Starting` (restart).
    pub fn can_transition(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        match (from, to) {
            (Starting, Idle) | (Starting, Error) => true,
            (Idle, Running) => true,
            (Running, Idle) | (Running, Error) => true,
            (Stopped, Starting) => true,
            (Error, Idle) | (Error, Starting) => true,
            // Any non-terminal state can be stopped or closed.
            (from, Stopped) => from != Stopped && from != Exited,
            (from, Exited) => from != Exited,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
