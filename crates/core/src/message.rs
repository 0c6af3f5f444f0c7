// SPDX-License-Identifier: MIT

//! Typed mail envelopes exchanged between sessions and the user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved recipient/sender identity for the human operator.
pub const USER: &str = "user";

/// Message type tags. The request/response pairing is a convention between
/// agents; the daemon only special-cases the auto-completed kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    PromptRequest,
    PromptResponse,
    QueryRequest,
    QueryResponse,
    ReviewRequest,
    ReviewResponse,
    ApprovalRequest,
    ApprovalResponse,
    LogError,
}

impl MessageType {
    /// Whether the pump auto-completes this type when delivered to `user`.
    pub fn auto_complete(&self) -> bool {
        matches!(self, MessageType::PromptResponse | MessageType::LogError)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::PromptRequest => "PROMPT_REQUEST",
            MessageType::PromptResponse => "PROMPT_RESPONSE",
            MessageType::QueryRequest => "QUERY_REQUEST",
            MessageType::QueryResponse => "QUERY_RESPONSE",
            MessageType::ReviewRequest => "REVIEW_REQUEST",
            MessageType::ReviewResponse => "REVIEW_RESPONSE",
            MessageType::ApprovalRequest => "APPROVAL_REQUEST",
            MessageType::ApprovalResponse => "APPROVAL_RESPONSE",
            MessageType::LogError => "LOG_ERROR",
        };
        f.write_str(s)
    }
}

/// One mail message.
///
/// `id`, `from`, and `timestamp` are filled in by the daemon when absent;
/// `to` is required but defaulted so that its absence surfaces as a routing
/// error (`missing recipient`) rather than a JSON parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageType,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            from: from.into(),
            to: to.into(),
            kind,
            subject: subject.into(),
            body: body.into(),
            timestamp: 0,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata entry, e.g. the dead-letter failure marker.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
