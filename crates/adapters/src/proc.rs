// SPDX-License-Identifier: MIT

//! Process-tree inspection via `/proc`.
//!
//! The session engine polls this at ~100ms, so every call is bounded by one
//! or two small `/proc` reads: direct children come from
//! `/proc/<pid>/task/<pid>/children`, names from `/proc/<pid>/comm`.
//! A vanished process is "not busy", never an error - racing exits are
//! expected at this cadence.

use std::path::PathBuf;

/// Inspects a process's descendants to decide whether a backend is
/// working, and carries the signal operations the stop escalation needs
/// (so tests never signal real pids).
pub trait ProcInspector: Clone + Send + Sync + 'static {
    /// PID of the first direct child of `parent` whose command basename
    /// equals `name`, or `None`.
    fn child_by_name(&self, parent: u32, name: &str) -> Option<u32>;

    /// Whether `pid` currently has any direct children. For a backend
    /// process, children are tool invocations, so children == busy.
    fn busy(&self, pid: u32) -> bool;

    /// Whether the process still exists.
    fn alive(&self, pid: u32) -> bool;

    /// Best-effort SIGTERM.
    fn terminate(&self, pid: u32);

    /// Best-effort SIGKILL.
    fn kill(&self, pid: u32);
}

/// `/proc`-backed inspector used in production.
#[derive(Clone)]
pub struct ProcfsInspector {
    root: PathBuf,
}

impl Default for ProcfsInspector {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsInspector {
    /// `root` is `/proc` in production; tests point it at a fixture tree.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn children_of(&self, pid: u32) -> Vec<u32> {
        let path = self
            .root
            .join(pid.to_string())
            .join("task")
            .join(pid.to_string())
            .join("children");
        match std::fs::read_to_string(path) {
            Ok(contents) => contents
                .split_ascii_whitespace()
                .filter_map(|tok| tok.parse().ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn comm_of(&self, pid: u32) -> Option<String> {
        let path = self.root.join(pid.to_string()).join("comm");
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
    }
}

impl ProcInspector for ProcfsInspector {
    fn child_by_name(&self, parent: u32, name: &str) -> Option<u32> {
        if parent == 0 {
            return None;
        }
        self.children_of(parent)
            .into_iter()
            .find(|&child| self.comm_of(child).is_some_and(|comm| comm == name))
    }

    fn busy(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        !self.children_of(pid).is_empty()
    }

    fn alive(&self, pid: u32) -> bool {
        pid != 0 && self.root.join(pid.to_string()).exists()
    }

    fn terminate(&self, pid: u32) {
        if pid != 0 {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }
    }

    fn kill(&self, pid: u32) {
        if pid != 0 {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGKILL,
            );
        }
    }
}

/// Scriptable inspector for engine tests. No call ever touches a real
/// process; signals are recorded for assertions.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeProcInspector {
    inner: std::sync::Arc<parking_lot::Mutex<FakeProcState>>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
struct FakeProcState {
    children: std::collections::HashMap<u32, Vec<(u32, String)>>,
    alive: std::collections::HashSet<u32>,
    signals: Vec<(u32, &'static str)>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeProcInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` (named `name`) as a direct child of `parent`.
    pub fn add_child(&self, parent: u32, child: u32, name: &str) {
        let mut state = self.inner.lock();
        state.children.entry(parent).or_default().push((child, name.to_string()));
        state.alive.insert(child);
    }

    /// Remove every child of `parent` (the process went quiet).
    pub fn clear_children(&self, parent: u32) {
        self.inner.lock().children.remove(&parent);
    }

    pub fn set_alive(&self, pid: u32, alive: bool) {
        let mut state = self.inner.lock();
        if alive {
            state.alive.insert(pid);
        } else {
            state.alive.remove(&pid);
        }
    }

    /// Signals sent so far, as `(pid, "TERM"|"KILL")`.
    pub fn signals(&self) -> Vec<(u32, &'static str)> {
        self.inner.lock().signals.clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProcInspector for FakeProcInspector {
    fn child_by_name(&self, parent: u32, name: &str) -> Option<u32> {
        self.inner
            .lock()
            .children
            .get(&parent)?
            .iter()
            .find(|(_, n)| n == name)
            .map(|(pid, _)| *pid)
    }

    fn busy(&self, pid: u32) -> bool {
        self.inner
            .lock()
            .children
            .get(&pid)
            .is_some_and(|kids| !kids.is_empty())
    }

    fn alive(&self, pid: u32) -> bool {
        self.inner.lock().alive.contains(&pid)
    }

    fn terminate(&self, pid: u32) {
        self.inner.lock().signals.push((pid, "TERM"));
    }

    fn kill(&self, pid: u32) {
        let mut state = self.inner.lock();
        state.signals.push((pid, "KILL"));
        state.alive.remove(&pid);
    }
}

#[cfg(test)]
#[path = "proc_tests.rs"]
mod tests;
