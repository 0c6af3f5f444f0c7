// SPDX-License-Identifier: MIT

//! The per-session engine: one backend process, one window, one FIFO.
//!
//! All mutable state sits behind one mutex. Long operations (startup,
//! send, stop) hold it only for state flips and run their waits with the
//! lock released, so reads never block behind a slow backend. A
//! `transitioning` flag bars concurrent stop/restart/close; reader
//! generations make a restarted session's old reader harmless.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anvil_adapters::{fifo, Fifo, Mux, MuxError, ProcInspector, ReaderMsg, WindowTarget};
use anvil_core::{Error, ErrorKind, SessionId, SessionState};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::startup::{StartupHandlerKind, StartupStep};

/// Minimum output before startup or a response can be considered complete.
const MIN_OUTPUT_BYTES: usize = 50;

/// Accumulated-output cap; the front half is dropped when exceeded.
const MAX_BUFFER_BYTES: usize = 512 * 1024;

/// Stop escalation waits: after each C-c, then after SIGTERM.
const STOP_INT_WAIT: Duration = Duration::from_millis(500);
const STOP_TERM_WAIT: Duration = Duration::from_millis(300);

/// Engine timing knobs, defaulted from the environment overrides.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub poll: Duration,
    pub quiesce: Duration,
    pub ready_timeout: Duration,
    pub settle: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            poll: anvil_adapters::poll_interval(),
            quiesce: anvil_adapters::quiesce_window(),
            ready_timeout: anvil_adapters::ready_timeout(),
            settle: anvil_adapters::send_settle(),
        }
    }
}

/// Everything needed to launch (and relaunch) one session.
#[derive(Clone)]
pub struct SessionConfig {
    pub id: SessionId,
    pub backend: String,
    /// Sandbox-wrapped command line the window runs
    pub command: String,
    /// Process name for the tree inspector
    pub process_name: String,
    pub cwd: PathBuf,
    pub role: Option<String>,
    pub tasks: Vec<String>,
    pub env: Vec<(String, String)>,
    pub target: WindowTarget,
    pub fifo_path: PathBuf,
    /// Initial prompt-prefix context
    pub context: String,
    pub slash_commands: Vec<String>,
    pub startup_handler: StartupHandlerKind,
    // Timing knobs; per-session so tests can shrink them
    pub poll: Duration,
    pub quiesce: Duration,
    pub ready_timeout: Duration,
    pub settle: Duration,
}

/// One row of the `list` file.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub alias: Option<String>,
    pub state: SessionState,
    pub pid: u32,
    pub cwd: PathBuf,
}

type ChangeCallback = Box<dyn Fn(&SessionId, SessionState, SessionState) + Send + Sync>;

struct EngineState {
    state: SessionState,
    transitioning: bool,
    generation: u64,
    pane_pid: u32,
    backend_pid: u32,
    buffer: Vec<u8>,
    last_output: Instant,
    idle_since: Instant,
    stop_requested: bool,
    alias: Option<String>,
    context: String,
}

pub struct Session<M: Mux, P: ProcInspector> {
    cfg: SessionConfig,
    mux: M,
    proc: P,
    state: Mutex<EngineState>,
    fifo: Mutex<Option<Fifo>>,
    reader_tx: mpsc::Sender<ReaderMsg>,
    on_change: Mutex<Option<ChangeCallback>>,
}

impl<M: Mux, P: ProcInspector> std::fmt::Debug for Session<M, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.cfg.id).finish()
    }
}

impl<M: Mux, P: ProcInspector> Session<M, P> {
    /// Build the session in `starting`; `start()` launches the backend.
    pub fn new(cfg: SessionConfig, mux: M, proc: P) -> Arc<Self> {
        let (reader_tx, reader_rx) = mpsc::channel(256);
        let context = cfg.context.clone();
        let session = Arc::new(Self {
            cfg,
            mux,
            proc,
            state: Mutex::new(EngineState {
                state: SessionState::Starting,
                transitioning: false,
                generation: 0,
                pane_pid: 0,
                backend_pid: 0,
                buffer: Vec::new(),
                last_output: Instant::now(),
                idle_since: Instant::now(),
                stop_requested: false,
                alias: None,
                context,
            }),
            fifo: Mutex::new(None),
            reader_tx,
            on_change: Mutex::new(None),
        });
        tokio::spawn(output_task(Arc::downgrade(&session), reader_rx));
        session
    }

    /// Wire the state-change notifier (invoked outside the state lock).
    pub fn set_on_change(&self, cb: ChangeCallback) {
        *self.on_change.lock() = Some(cb);
    }

    // --- observers ---

    pub fn id(&self) -> &SessionId {
        &self.cfg.id
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().state
    }

    pub fn info(&self) -> SessionInfo {
        let st = self.state.lock();
        SessionInfo {
            id: self.cfg.id.clone(),
            alias: st.alias.clone(),
            state: st.state,
            pid: st.backend_pid,
            cwd: self.cfg.cwd.clone(),
        }
    }

    pub fn alias(&self) -> Option<String> {
        self.state.lock().alias.clone()
    }

    pub fn set_alias(&self, alias: Option<String>) {
        self.state.lock().alias = alias;
    }

    pub fn context(&self) -> String {
        self.state.lock().context.clone()
    }

    pub fn set_context(&self, context: String) {
        self.state.lock().context = context;
    }

    pub fn pid(&self) -> u32 {
        self.state.lock().backend_pid
    }

    pub fn backend(&self) -> &str {
        &self.cfg.backend
    }

    pub fn cwd(&self) -> &std::path::Path {
        &self.cfg.cwd
    }

    pub fn role(&self) -> Option<&str> {
        self.cfg.role.as_deref()
    }

    pub fn tasks(&self) -> &[String] {
        &self.cfg.tasks
    }

    pub fn target(&self) -> &WindowTarget {
        &self.cfg.target
    }

    /// How long the session has been idle (zero if not idle).
    pub fn idle_for(&self) -> Duration {
        let st = self.state.lock();
        if st.state == SessionState::Idle {
            st.idle_since.elapsed()
        } else {
            Duration::ZERO
        }
    }

    // --- lifecycle ---

    /// Initial launch: window, FIFO, reader, startup handler, ready wait.
    pub async fn start(&self) -> Result<(), Error> {
        self.state.lock().stop_requested = false;

        let pane_pid = match self
            .mux
            .new_window(&self.cfg.target, &self.cfg.cwd, &self.cfg.env, &self.cfg.command)
            .await
        {
            Ok(pid) => pid,
            Err(e) => {
                let _ = self.transition(SessionState::Error);
                return Err(Error::with(ErrorKind::BackendLaunchFailed, e.to_string()));
            }
        };

        if let Err(e) = self.wire_pipe(pane_pid).await {
            let _ = self.transition(SessionState::Error);
            return Err(e);
        }

        self.wait_ready().await
    }

    /// Create the FIFO, attach pipe-pane, and spawn a fresh reader.
    async fn wire_pipe(&self, pane_pid: u32) -> Result<(), Error> {
        // Retire the previous FIFO before creating at the same path, so
        // its deferred unlink cannot delete the replacement
        if let Some(old) = self.fifo.lock().take() {
            old.unlink();
        }
        let new_fifo = Fifo::create(&self.cfg.fifo_path)
            .map_err(|e| Error::with(ErrorKind::BackendLaunchFailed, format!("fifo: {e}")))?;
        self.mux
            .pipe_pane(&self.cfg.target, new_fifo.path())
            .await
            .map_err(|e| Error::with(ErrorKind::BackendLaunchFailed, e.to_string()))?;

        let generation = {
            let mut st = self.state.lock();
            st.pane_pid = pane_pid;
            st.backend_pid = 0;
            st.generation += 1;
            st.buffer.clear();
            st.last_output = Instant::now();
            st.generation
        };
        // The superseded reader's chunks are discarded by generation
        *self.fifo.lock() = Some(new_fifo);
        fifo::spawn_reader(self.cfg.fifo_path.clone(), generation, self.reader_tx.clone());
        Ok(())
    }

    /// Drive the startup handler, then wait for output quiescence.
    async fn wait_ready(&self) -> Result<(), Error> {
        let mut handler = self.cfg.startup_handler.build();
        let deadline = Instant::now() + self.cfg.ready_timeout;
        let mut handler_done = false;

        loop {
            {
                // Supersession guard: a concurrent stop/close (or a crash
                // EOF) moves the state away from starting
                let st = self.state.lock();
                if st.stop_requested || st.state != SessionState::Starting {
                    return Err(Error::new(ErrorKind::Interrupted));
                }
            }
            if Instant::now() > deadline {
                let tail = self.output_tail(512);
                let _ = self.transition(SessionState::Error);
                return Err(Error::with(ErrorKind::ReadyTimeout, tail));
            }

            if !handler_done {
                let output = {
                    let st = self.state.lock();
                    String::from_utf8_lossy(&st.buffer).into_owned()
                };
                match handler.step(&output) {
                    StartupStep::Keys(keys) => {
                        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                        if let Err(e) = self.mux.send_keys(&self.cfg.target, &refs).await {
                            let _ = self.transition(SessionState::Error);
                            return Err(Error::with(
                                ErrorKind::BackendLaunchFailed,
                                e.to_string(),
                            ));
                        }
                    }
                    StartupStep::Wait => {}
                    StartupStep::Done => handler_done = true,
                    StartupStep::Fail(reason) => {
                        let _ = self.transition(SessionState::Error);
                        return Err(Error::with(ErrorKind::BackendLaunchFailed, reason));
                    }
                }
            } else {
                // Resolve the backend pid under the pane shell, then check
                // quiescence: enough output, no new bytes, no tool children
                let (pane_pid, len, quiet) = {
                    let st = self.state.lock();
                    (
                        st.pane_pid,
                        st.buffer.len(),
                        st.last_output.elapsed() >= self.cfg.quiesce,
                    )
                };
                let backend_pid = self
                    .proc
                    .child_by_name(pane_pid, &self.cfg.process_name)
                    .unwrap_or(0);
                self.state.lock().backend_pid = backend_pid;

                let busy = backend_pid != 0 && self.proc.busy(backend_pid);
                if len >= MIN_OUTPUT_BYTES && quiet && !busy {
                    self.transition(SessionState::Idle)?;
                    info!(id = %self.cfg.id, backend_pid, "session ready");
                    return Ok(());
                }
            }

            tokio::time::sleep(self.cfg.poll).await;
        }
    }

    /// Deliver one prompt and wait for the response to complete.
    pub async fn send(&self, prompt: &str, deadline: Duration) -> Result<(), Error> {
        let full = {
            let mut st = self.state.lock();
            match st.state {
                SessionState::Idle => {}
                SessionState::Running => return Err(Error::new(ErrorKind::SessionBusy)),
                SessionState::Starting => return Err(Error::new(ErrorKind::SessionStarting)),
                SessionState::Stopped => return Err(Error::new(ErrorKind::SessionStopped)),
                SessionState::Error => {
                    return Err(Error::with(
                        ErrorKind::InvalidStateTransition,
                        "session in error state",
                    ))
                }
                SessionState::Exited => {
                    return Err(Error::with(ErrorKind::SessionStopped, "session exited"))
                }
            }
            if st.transitioning {
                return Err(Error::with(ErrorKind::SessionBusy, "transition in progress"));
            }

            let is_slash = prompt.starts_with('/');
            if is_slash
                && !self
                    .cfg
                    .slash_commands
                    .iter()
                    .any(|c| c == "*" || c == prompt.split_whitespace().next().unwrap_or(prompt))
            {
                return Err(Error::with(ErrorKind::UnsupportedCommand, prompt.to_string()));
            }

            let full = if is_slash || st.context.is_empty() {
                prompt.to_string()
            } else {
                format!("{}\n\n{}", st.context, prompt)
            };

            st.state = SessionState::Running;
            st.buffer.clear();
            st.last_output = Instant::now();
            st.stop_requested = false;
            full
        };
        self.notify_change(SessionState::Idle, SessionState::Running);

        // Literal text, a settle pause, then the submit chord. The lock is
        // released for all of this; observers read `running`.
        if let Err(e) = self.mux.send_literal(&self.cfg.target, &full).await {
            return Err(self.fail_running(e));
        }
        tokio::time::sleep(self.cfg.settle).await;
        if let Err(e) = self.mux.send_keys(&self.cfg.target, &["C-m"]).await {
            return Err(self.fail_running(e));
        }

        let result = self.wait_completion(deadline).await;

        // Back to idle regardless of wait outcome, unless a stop/close
        // moved the state underneath us
        let became_idle = {
            let mut st = self.state.lock();
            if st.state == SessionState::Running && !st.transitioning {
                st.state = SessionState::Idle;
                st.idle_since = Instant::now();
                true
            } else {
                false
            }
        };
        if became_idle {
            self.notify_change(SessionState::Running, SessionState::Idle);
        }
        result
    }

    async fn wait_completion(&self, deadline: Duration) -> Result<(), Error> {
        let started = Instant::now();
        loop {
            let (len, quiet, backend_pid) = {
                let st = self.state.lock();
                if st.stop_requested {
                    return Err(Error::new(ErrorKind::Interrupted));
                }
                if st.state != SessionState::Running {
                    return Err(Error::with(ErrorKind::Interrupted, "superseded"));
                }
                (
                    st.buffer.len(),
                    st.last_output.elapsed() >= self.cfg.quiesce,
                    st.backend_pid,
                )
            };

            let busy = backend_pid != 0 && self.proc.busy(backend_pid);
            if len >= MIN_OUTPUT_BYTES && quiet && !busy {
                return Ok(());
            }
            if started.elapsed() > deadline {
                return Err(Error::new(ErrorKind::DeadlineExceeded));
            }
            tokio::time::sleep(self.cfg.poll).await;
        }
    }

    /// A mux failure mid-send: the session goes to `error`.
    fn fail_running(&self, e: MuxError) -> Error {
        warn!(id = %self.cfg.id, error = %e, "send failed");
        let _ = self.transition(SessionState::Error);
        Error::with(ErrorKind::BackendLaunchFailed, e.to_string())
    }

    /// Stop the backend, keeping window and FIFO identity for a restart.
    ///
    /// Idempotent on an already-stopped session.
    pub async fn stop(&self) -> Result<(), Error> {
        {
            let mut st = self.state.lock();
            match st.state {
                SessionState::Stopped => return Ok(()),
                SessionState::Exited => {
                    return Err(Error::with(ErrorKind::InvalidStateTransition, "session exited"))
                }
                _ => {}
            }
            if st.transitioning {
                return Err(Error::with(ErrorKind::SessionBusy, "transition in progress"));
            }
            st.transitioning = true;
            st.stop_requested = true;
        }

        let result = self.stop_inner().await;

        let mut st = self.state.lock();
        if st.state != SessionState::Exited {
            st.transitioning = false;
        }
        result
    }

    async fn stop_inner(&self) -> Result<(), Error> {
        let pid = self.state.lock().backend_pid;

        // Escalate: C-c, C-c, SIGTERM, SIGKILL, with waits between
        let _ = self.mux.send_keys(&self.cfg.target, &["C-c"]).await;
        tokio::time::sleep(STOP_INT_WAIT).await;
        if self.proc.alive(pid) {
            let _ = self.mux.send_keys(&self.cfg.target, &["C-c"]).await;
            tokio::time::sleep(STOP_INT_WAIT).await;
            if self.proc.alive(pid) {
                self.proc.terminate(pid);
                tokio::time::sleep(STOP_TERM_WAIT).await;
                if self.proc.alive(pid) {
                    self.proc.kill(pid);
                }
            }
        }

        match self.mux.window_exists(&self.cfg.target).await {
            Ok(true) | Err(_) => {
                self.transition(SessionState::Stopped)?;
                debug!(id = %self.cfg.id, "session stopped");
                Ok(())
            }
            Ok(false) => {
                // The multiplexer tore the window down behind our back
                if let Some(old) = self.fifo.lock().take() {
                    old.unlink();
                }
                self.force_exited();
                Err(Error::new(ErrorKind::WindowDestroyed))
            }
        }
    }

    /// Stop (if needed), rewire the FIFO, relaunch, and wait for ready.
    /// The session id, window name, and FIFO path all survive.
    pub async fn restart(&self) -> Result<(), Error> {
        {
            let st = self.state.lock();
            if st.state == SessionState::Exited {
                return Err(Error::with(ErrorKind::InvalidStateTransition, "session exited"));
            }
        }
        if self.cfg.command.is_empty() {
            return Err(Error::with(ErrorKind::BadRequest, "no stored command"));
        }

        if self.state() != SessionState::Stopped {
            self.stop().await?;
        }

        {
            let mut st = self.state.lock();
            if st.transitioning {
                return Err(Error::with(ErrorKind::SessionBusy, "transition in progress"));
            }
            st.transitioning = true;
            st.stop_requested = false;
        }

        let result = self.restart_inner().await;

        let mut st = self.state.lock();
        if st.state != SessionState::Exited {
            st.transitioning = false;
        }
        result
    }

    async fn restart_inner(&self) -> Result<(), Error> {
        self.transition(SessionState::Starting)?;

        // If the window survived (backend crashed but the pane shell
        // lives), relaunch in place; otherwise recreate under the same
        // name so identity is preserved either way.
        let window_alive = self
            .mux
            .window_exists(&self.cfg.target)
            .await
            .unwrap_or(false);

        let pane_pid = if window_alive {
            let _ = self.mux.close_pipe_pane(&self.cfg.target).await;
            let relaunch = self.relaunch_command_line();
            self.mux
                .send_literal(&self.cfg.target, &relaunch)
                .await
                .map_err(|e| self.launch_error(e))?;
            self.mux
                .send_keys(&self.cfg.target, &["C-m"])
                .await
                .map_err(|e| self.launch_error(e))?;
            self.mux
                .pane_pid(&self.cfg.target)
                .await
                .map_err(|e| self.launch_error(e))?
        } else {
            self.mux
                .new_window(&self.cfg.target, &self.cfg.cwd, &self.cfg.env, &self.cfg.command)
                .await
                .map_err(|e| self.launch_error(e))?
        };

        if let Err(e) = self.wire_pipe(pane_pid).await {
            let _ = self.transition(SessionState::Error);
            return Err(e);
        }
        self.wait_ready().await
    }

    /// `cd` + environment restore + the stored command, for relaunching
    /// inside a surviving pane shell.
    fn relaunch_command_line(&self) -> String {
        use anvil_adapters::subprocess::shell_quote;
        let mut line = format!("cd {}", shell_quote(&self.cfg.cwd.display().to_string()));
        for (key, value) in &self.cfg.env {
            line.push_str(&format!(" && export {}={}", key, shell_quote(value)));
        }
        line.push_str(&format!(" && {}", self.cfg.command));
        line
    }

    fn launch_error(&self, e: MuxError) -> Error {
        let _ = self.transition(SessionState::Error);
        Error::with(ErrorKind::BackendLaunchFailed, e.to_string())
    }

    /// Tear everything down. Terminal; idempotent.
    pub async fn close(&self) -> Result<(), Error> {
        {
            let mut st = self.state.lock();
            if st.state == SessionState::Exited {
                return Ok(());
            }
            // Terminal transition: the flag is never cleared again
            st.transitioning = true;
            st.stop_requested = true;
        }

        let _ = self.mux.kill_window(&self.cfg.target).await;
        if let Some(old) = self.fifo.lock().take() {
            old.unlink();
        }
        self.force_exited();
        info!(id = %self.cfg.id, "session closed");
        Ok(())
    }

    /// Re-detect idle/running from the process tree; recover `error` when
    /// the window is still there.
    pub async fn refresh(&self) -> Result<(), Error> {
        let (state, backend_pid) = {
            let st = self.state.lock();
            (st.state, st.backend_pid)
        };
        match state {
            SessionState::Idle | SessionState::Running => {
                let busy = backend_pid != 0 && self.proc.busy(backend_pid);
                let detected = if busy {
                    SessionState::Running
                } else {
                    SessionState::Idle
                };
                if detected != state {
                    self.transition(detected)?;
                }
                Ok(())
            }
            SessionState::Error => {
                if self
                    .mux
                    .window_exists(&self.cfg.target)
                    .await
                    .unwrap_or(false)
                {
                    self.transition(SessionState::Idle)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Validated manual transition (writes to the `state` file).
    ///
    /// Only transitions with a manual trigger are accepted: `stopped`
    /// (stop), `exited` (close), and `idle` as the recovery edge out of
    /// `error`. States the engine reaches on its own (`starting`,
    /// `running`) cannot be written.
    pub async fn write_state(&self, to: SessionState) -> Result<(), Error> {
        let current = self.state();
        if current == to {
            return Ok(());
        }
        match to {
            SessionState::Stopped => self.stop().await,
            SessionState::Exited => self.close().await,
            SessionState::Idle if current == SessionState::Error => {
                self.transition(SessionState::Idle)
            }
            _ => Err(Error::with(
                ErrorKind::InvalidStateTransition,
                format!("{current} -> {to}"),
            )),
        }
    }

    /// Hand off a prompt asynchronously; the write returns immediately.
    pub fn submit(self: Arc<Self>, prompt: String, deadline: Duration) -> Result<(), Error> {
        {
            let st = self.state.lock();
            match st.state {
                SessionState::Idle => {}
                SessionState::Running => return Err(Error::new(ErrorKind::SessionBusy)),
                SessionState::Starting => return Err(Error::new(ErrorKind::SessionStarting)),
                SessionState::Stopped | SessionState::Exited => {
                    return Err(Error::new(ErrorKind::SessionStopped))
                }
                SessionState::Error => {
                    return Err(Error::with(
                        ErrorKind::InvalidStateTransition,
                        "session in error state",
                    ))
                }
            }
        }
        tokio::spawn(async move {
            if let Err(e) = self.send(&prompt, deadline).await {
                warn!(id = %self.cfg.id, error = %e, "async prompt failed");
            }
        });
        Ok(())
    }

    // --- internals ---

    fn transition(&self, to: SessionState) -> Result<(), Error> {
        let old = {
            let mut st = self.state.lock();
            let old = st.state;
            if old == to {
                return Ok(());
            }
            if !SessionState::can_transition(old, to) {
                return Err(Error::with(
                    ErrorKind::InvalidStateTransition,
                    format!("{old} -> {to}"),
                ));
            }
            st.state = to;
            if to == SessionState::Idle {
                st.idle_since = Instant::now();
            }
            old
        };
        self.notify_change(old, to);
        Ok(())
    }

    /// Unconditional jump to `exited` (any state may close).
    fn force_exited(&self) {
        let old = {
            let mut st = self.state.lock();
            let old = st.state;
            st.state = SessionState::Exited;
            old
        };
        if old != SessionState::Exited {
            self.notify_change(old, SessionState::Exited);
        }
    }

    fn notify_change(&self, old: SessionState, new: SessionState) {
        debug!(id = %self.cfg.id, %old, %new, "state change");
        if let Some(cb) = &*self.on_change.lock() {
            cb(&self.cfg.id, old, new);
        }
    }

    fn output_tail(&self, n: usize) -> String {
        let st = self.state.lock();
        let start = st.buffer.len().saturating_sub(n);
        String::from_utf8_lossy(&st.buffer[start..]).into_owned()
    }

    /// Handle one chunk or EOF from the reader task.
    fn on_reader_msg(&self, msg: ReaderMsg) {
        let eof_transition = {
            let mut st = self.state.lock();
            if msg.generation != st.generation {
                return; // superseded reader
            }
            match msg.data {
                Some(bytes) => {
                    st.buffer.extend_from_slice(&bytes);
                    if st.buffer.len() > MAX_BUFFER_BYTES {
                        let excess = st.buffer.len() - MAX_BUFFER_BYTES / 2;
                        st.buffer.drain(..excess);
                    }
                    st.last_output = Instant::now();
                    false
                }
                None => {
                    // Reader EOF: the window (or its pipe) went away.
                    // A stop/restart/close in progress handles its own
                    // state; otherwise this is a crash -> stopped.
                    !st.transitioning
                        && !matches!(st.state, SessionState::Stopped | SessionState::Exited)
                }
            }
        };
        if eof_transition {
            info!(id = %self.cfg.id, "reader EOF, marking session stopped");
            let _ = self.transition(SessionState::Stopped);
        }
    }
}

/// Owns the reader channel for one session; applies chunks and EOFs.
async fn output_task<M: Mux, P: ProcInspector>(
    weak: Weak<Session<M, P>>,
    mut rx: mpsc::Receiver<ReaderMsg>,
) {
    while let Some(msg) = rx.recv().await {
        let Some(session) = weak.upgrade() else {
            return;
        };
        session.on_reader_msg(msg);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
