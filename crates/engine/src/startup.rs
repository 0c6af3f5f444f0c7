// SPDX-License-Identifier: MIT

//! Startup dialog handlers.
//!
//! Some backends open interactive dialogs before their prompt is usable
//! (permission warnings, folder-trust checks, login flows). A handler is a
//! deterministic step function over the cumulative window output: given
//! everything seen so far, it either injects keys, declares itself done,
//! or declares the launch failed. The session engine calls `step` on every
//! poll until `Done` or `Fail`.

use serde::Deserialize;

/// Outcome of one handler step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupStep {
    /// Inject these key chords and keep watching.
    Keys(Vec<String>),
    /// Nothing to do yet; keep watching.
    Wait,
    /// Dialogs are dealt with; hand over to quiescence detection.
    Done,
    /// The backend cannot come up (e.g. not authenticated).
    Fail(String),
}

pub trait StartupHandler: Send + 'static {
    fn step(&mut self, output: &str) -> StartupStep;
}

/// Which handler a backend uses; selected in the registry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupHandlerKind {
    #[default]
    None,
    Claude,
}

impl StartupHandlerKind {
    pub fn build(&self) -> Box<dyn StartupHandler> {
        match self {
            StartupHandlerKind::None => Box::new(NoopHandler),
            StartupHandlerKind::Claude => Box::new(ClaudeHandler::default()),
        }
    }
}

/// Backends without startup dialogs.
pub struct NoopHandler;

impl StartupHandler for NoopHandler {
    fn step(&mut self, _output: &str) -> StartupStep {
        StartupStep::Done
    }
}

/// How many quiet polls [`ClaudeHandler`] waits for a dialog to render
/// before concluding there is none (15 polls ≈ 3s at the default cadence).
const DIALOG_PATIENCE: u32 = 15;

/// Handles the Claude Code startup dialogs.
///
/// Two dialogs are auto-accepted, each at most once:
/// - "Bypass Permissions mode" warning: answer `2` (yes, I accept)
/// - folder trust: answer `1` (yes, I trust this folder)
///
/// A login/onboarding prompt means the backend is not authenticated and
/// cannot be driven; that launch fails. With no dialog on screen the
/// handler waits [`DIALOG_PATIENCE`] polls for the TUI to render one, then
/// reports done.
#[derive(Default)]
pub struct ClaudeHandler {
    accepted_bypass: bool,
    accepted_trust: bool,
    polls: u32,
}

impl StartupHandler for ClaudeHandler {
    fn step(&mut self, output: &str) -> StartupStep {
        if output.contains("Select login method") || output.contains("Choose the text style") {
            return StartupStep::Fail(
                "backend is not authenticated; run it once manually to log in".to_string(),
            );
        }

        let bypass_pending = !self.accepted_bypass
            && output.contains("Bypass Permissions mode")
            && output.contains("1. No")
            && output.contains("2. Yes");
        if bypass_pending {
            self.accepted_bypass = true;
            return StartupStep::Keys(vec!["2".to_string()]);
        }

        let trust_pending = !self.accepted_trust
            && output.contains("Do you trust the files in this folder")
            && output.contains("1. Yes");
        if trust_pending {
            self.accepted_trust = true;
            return StartupStep::Keys(vec!["1".to_string()]);
        }

        self.polls += 1;
        if self.polls < DIALOG_PATIENCE {
            StartupStep::Wait
        } else {
            StartupStep::Done
        }
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
