// SPDX-License-Identifier: MIT

//! In-memory multiplexer fake for engine and daemon tests.
//!
//! Windows are bookkeeping entries; `pipe_pane` really opens the FIFO (in
//! read-write mode so the open never blocks on a missing reader) and tests
//! script backend output through [`FakeMux::emit`]. Killing a window drops
//! the write end, which delivers EOF to the session's reader exactly like a
//! real window teardown.

use super::{Mux, MuxError, WindowTarget};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Record of one adapter call, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum MuxCall {
    EnsureSession(String),
    NewWindow { target: WindowTarget, command: String },
    KillWindow(WindowTarget),
    SendLiteral { target: WindowTarget, text: String },
    SendKeys { target: WindowTarget, keys: Vec<String> },
    PipePane { target: WindowTarget, fifo: PathBuf },
    ClosePipePane(WindowTarget),
}

struct Window {
    pane_pid: u32,
    pipe: Option<std::fs::File>,
}

#[derive(Default)]
struct State {
    sessions: HashSet<String>,
    windows: HashMap<WindowTarget, Window>,
    /// Pipes kept open for windows destroyed via [`FakeMux::destroy_window`]
    orphaned_pipes: Vec<std::fs::File>,
    calls: Vec<MuxCall>,
    next_pid: u32,
    unreachable: bool,
}

/// Scriptable multiplexer fake.
#[derive(Clone, Default)]
pub struct FakeMux {
    state: Arc<Mutex<State>>,
}

impl FakeMux {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().next_pid = 1000;
        fake
    }

    /// Make every subsequent call fail as if the binary were missing.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Write scripted backend output into the window's pipe.
    ///
    /// Panics on an unknown or unpiped window so a mis-scripted test fails
    /// loudly instead of hanging on a quiet reader.
    #[allow(clippy::panic)]
    pub fn emit(&self, target: &WindowTarget, bytes: &[u8]) {
        let mut state = self.state.lock();
        let Some(window) = state.windows.get_mut(target) else {
            panic!("emit to unknown window {target}");
        };
        let Some(pipe) = window.pipe.as_mut() else {
            panic!("emit to unpiped window {target}");
        };
        pipe.write_all(bytes).unwrap_or_else(|e| panic!("emit: {e}"));
        pipe.flush().unwrap_or_else(|e| panic!("emit flush: {e}"));
    }

    /// Simulate the multiplexer forgetting a window behind our back.
    /// The pipe's write end stays open so no EOF races the caller;
    /// `kill_window` is the EOF-delivering teardown.
    pub fn destroy_window(&self, target: &WindowTarget) {
        let mut state = self.state.lock();
        if let Some(window) = state.windows.remove(target) {
            if let Some(pipe) = window.pipe {
                state.orphaned_pipes.push(pipe);
            }
        }
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.state.lock().calls.clone()
    }

    /// Literal text sent to a window, in order.
    pub fn sent_literals(&self, target: &WindowTarget) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MuxCall::SendLiteral { target: t, text } if t == target => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Key chords sent to a window, flattened in order.
    pub fn sent_keys(&self, target: &WindowTarget) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MuxCall::SendKeys { target: t, keys } if t == target => Some(keys.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn check_reachable(&self) -> Result<(), MuxError> {
        if self.state.lock().unreachable {
            Err(MuxError::Unreachable("fake mux unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Mux for FakeMux {
    async fn ensure_session(&self, name: &str) -> Result<(), MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        state.calls.push(MuxCall::EnsureSession(name.to_string()));
        state.sessions.insert(name.to_string());
        Ok(())
    }

    async fn new_window(
        &self,
        target: &WindowTarget,
        _cwd: &Path,
        _env: &[(String, String)],
        command: &str,
    ) -> Result<u32, MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        if !state.sessions.contains(&target.session) {
            return Err(MuxError::NoSuchTarget(target.session.clone()));
        }
        state.calls.push(MuxCall::NewWindow {
            target: target.clone(),
            command: command.to_string(),
        });
        state.next_pid += 1;
        let pane_pid = state.next_pid;
        state
            .windows
            .insert(target.clone(), Window { pane_pid, pipe: None });
        Ok(pane_pid)
    }

    async fn kill_window(&self, target: &WindowTarget) -> Result<(), MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        state.calls.push(MuxCall::KillWindow(target.clone()));
        state.windows.remove(target);
        Ok(())
    }

    async fn window_exists(&self, target: &WindowTarget) -> Result<bool, MuxError> {
        self.check_reachable()?;
        Ok(self.state.lock().windows.contains_key(target))
    }

    async fn send_literal(&self, target: &WindowTarget, text: &str) -> Result<(), MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        if !state.windows.contains_key(target) {
            return Err(MuxError::NoSuchTarget(target.to_string()));
        }
        state.calls.push(MuxCall::SendLiteral {
            target: target.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_keys(&self, target: &WindowTarget, keys: &[&str]) -> Result<(), MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        if !state.windows.contains_key(target) {
            return Err(MuxError::NoSuchTarget(target.to_string()));
        }
        state.calls.push(MuxCall::SendKeys {
            target: target.clone(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        });
        Ok(())
    }

    async fn pipe_pane(&self, target: &WindowTarget, fifo: &Path) -> Result<(), MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        state.calls.push(MuxCall::PipePane {
            target: target.clone(),
            fifo: fifo.to_path_buf(),
        });
        let Some(window) = state.windows.get_mut(target) else {
            return Err(MuxError::NoSuchTarget(target.to_string()));
        };
        // Read-write so the open cannot block waiting for a reader
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(fifo)
            .map_err(|e| MuxError::CommandFailed(format!("open fifo: {e}")))?;
        window.pipe = Some(file);
        Ok(())
    }

    async fn close_pipe_pane(&self, target: &WindowTarget) -> Result<(), MuxError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        state.calls.push(MuxCall::ClosePipePane(target.clone()));
        if let Some(window) = state.windows.get_mut(target) {
            window.pipe = None;
        }
        Ok(())
    }

    async fn pane_pid(&self, target: &WindowTarget) -> Result<u32, MuxError> {
        self.check_reachable()?;
        self.state
            .lock()
            .windows
            .get(target)
            .map(|w| w.pane_pid)
            .ok_or_else(|| MuxError::NoSuchTarget(target.to_string()))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
