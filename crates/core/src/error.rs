// SPDX-License-Identifier: MIT

//! The daemon-wide error taxonomy.
//!
//! Every user-visible failure maps to one [`ErrorKind`]; the kind's display
//! form is the short lowercase string carried in a 9P `Rerror`. Components
//! with richer internal errors (WAL, codec, subprocess) convert at the
//! boundary where the failure becomes user-visible.

/// Classified failure kinds, one per user-visible error string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// PID file belongs to a live process
    AlreadyRunning,
    /// Sandbox launcher absent in strict mode
    SandboxUnavailable,
    /// Error pattern on startup or window gone
    BackendLaunchFailed,
    /// Startup never quiesced
    ReadyTimeout,
    /// Multiplexer window vanished unexpectedly
    WindowDestroyed,
    /// No such session ID
    SessionNotFound,
    /// Disallowed state write
    InvalidStateTransition,
    /// Send attempted while running
    SessionBusy,
    /// Send attempted while starting
    SessionStarting,
    /// Send attempted while stopped
    SessionStopped,
    /// Slash command rejected by the backend handler
    UnsupportedCommand,
    /// In-flight operation observed a stop signal
    Interrupted,
    /// Operation aborted before side effects
    Cancelled,
    /// Operation deadline elapsed
    DeadlineExceeded,
    /// Mail delivery to an unknown recipient
    NoSuchRecipient,
    /// Mail submitted without a `to` field
    MissingRecipient,
    /// Message or bead lookup by ID failed
    NotFound,
    /// Malformed JSON or control command
    BadRequest,
}

impl ErrorKind {
    /// The 9P `Rerror` ename for this kind.
    pub fn ename(&self) -> &'static str {
        match self {
            ErrorKind::AlreadyRunning => "already running",
            ErrorKind::SandboxUnavailable => "sandbox unavailable",
            ErrorKind::BackendLaunchFailed => "backend launch failed",
            ErrorKind::ReadyTimeout => "ready timeout",
            ErrorKind::WindowDestroyed => "window destroyed",
            ErrorKind::SessionNotFound => "session not found",
            ErrorKind::InvalidStateTransition => "invalid state transition",
            ErrorKind::SessionBusy => "session busy",
            ErrorKind::SessionStarting => "session starting",
            ErrorKind::SessionStopped => "session stopped",
            ErrorKind::UnsupportedCommand => "unsupported command",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline exceeded",
            ErrorKind::NoSuchRecipient => "no such recipient",
            ErrorKind::MissingRecipient => "missing recipient",
            ErrorKind::NotFound => "not found",
            ErrorKind::BadRequest => "bad request",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ename())
    }
}

/// A classified error, optionally carrying detail for logs.
///
/// The detail never reaches the 9P wire; clients see only the ename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub detail: Option<String>,
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn ename(&self) -> &'static str {
        self.kind.ename()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.kind, detail),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
