// SPDX-License-Identifier: MIT

//! Terminal multiplexer adapters.
//!
//! One anvil daemon owns one multiplexer session; every supervised backend
//! runs in its own named window of that session. The adapter is a thin
//! wrapper over the multiplexer CLI. It never retries; the session engine
//! decides what a failure means.

mod tmux;

pub use tmux::TmuxMux;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMux, MuxCall};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors from multiplexer operations.
///
/// `Unreachable` means the multiplexer binary itself could not be run;
/// `NoSuchTarget` means the session or window does not exist.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("multiplexer unreachable: {0}")]
    Unreachable(String),
    #[error("no such target: {0}")]
    NoSuchTarget(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// A named window inside a named multiplexer session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowTarget {
    pub session: String,
    pub window: String,
}

impl WindowTarget {
    pub fn new(session: impl Into<String>, window: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            window: window.into(),
        }
    }
}

impl fmt::Display for WindowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.window)
    }
}

/// Adapter over the terminal multiplexer CLI.
#[async_trait]
pub trait Mux: Clone + Send + Sync + 'static {
    /// Idempotently create the named multiplexer session.
    async fn ensure_session(&self, name: &str) -> Result<(), MuxError>;

    /// Create a named window running `command` in `cwd` with extra
    /// environment variables. Returns the PID of the window's shell.
    async fn new_window(
        &self,
        target: &WindowTarget,
        cwd: &Path,
        env: &[(String, String)],
        command: &str,
    ) -> Result<u32, MuxError>;

    /// Kill a window. Killing an already-gone window is not an error.
    async fn kill_window(&self, target: &WindowTarget) -> Result<(), MuxError>;

    async fn window_exists(&self, target: &WindowTarget) -> Result<bool, MuxError>;

    /// Inject text as if typed, without keycode interpretation.
    async fn send_literal(&self, target: &WindowTarget, text: &str) -> Result<(), MuxError>;

    /// Inject key chords (e.g. `C-m`, `C-c`, `Down`).
    async fn send_keys(&self, target: &WindowTarget, keys: &[&str]) -> Result<(), MuxError>;

    /// Mirror the window's output to a FIFO.
    async fn pipe_pane(&self, target: &WindowTarget, fifo: &Path) -> Result<(), MuxError>;

    /// Stop mirroring the window's output.
    async fn close_pipe_pane(&self, target: &WindowTarget) -> Result<(), MuxError>;

    /// PID of the window's foreground process.
    async fn pane_pid(&self, target: &WindowTarget) -> Result<u32, MuxError>;
}
