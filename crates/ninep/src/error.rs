// SPDX-License-Identifier: MIT

//! Protocol and filesystem error types.

use thiserror::Error;

/// Wire-level failures that tear down a connection.
#[derive(Debug, Error)]
pub enum NinepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("short message: {0} bytes")]
    Truncated(usize),
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("malformed {what}")]
    Malformed { what: &'static str },
}

/// A filesystem-level failure, carried to the client as `Rerror`.
///
/// The ename is the complete client-visible payload; detail for the log
/// belongs in tracing at the site of the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{ename}")]
pub struct FsError {
    pub ename: String,
}

impl FsError {
    pub fn new(ename: impl Into<String>) -> Self {
        Self {
            ename: ename.into(),
        }
    }
}

impl From<&str> for FsError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
