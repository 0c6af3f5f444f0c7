// SPDX-License-Identifier: MIT

//! Session registry: identity allocation, alias index, creation wiring.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anvil_adapters::{alias as window_names, Mux, ProcInspector, SandboxComposer, SandboxError,
    TemplateCtx, WindowTarget};
use anvil_core::{
    validate_cwd, validate_name, Clock, Error, ErrorKind, Event, IdGen, SequentialIdGen, SessionId,
};
use parking_lot::RwLock;
use tracing::{error, info};

use crate::backend::BackendRegistry;
use crate::bus::EventBus;
use crate::mailbox::{AliasLookup, Mailbox};
use crate::session::{Session, SessionConfig, SessionInfo, SessionTiming};

/// Environment variables every session gets, on top of the sandbox
/// layers' whitelist.
const BASE_ENV: &[&str] = &["HOME", "PATH", "TERM", "USER"];

/// Static wiring for a manager.
pub struct SessionSetup {
    /// Name of the one multiplexer session all windows live in
    pub mux_session: String,
    /// Directory FIFOs are created in (inside the rendezvous dir)
    pub fifo_dir: PathBuf,
    pub composer: SandboxComposer,
    pub registry: BackendRegistry,
    pub timing: SessionTiming,
}

pub struct SessionManager<M: Mux, P: ProcInspector> {
    setup: SessionSetup,
    mux: M,
    proc: P,
    clock: Arc<dyn Clock>,
    mailbox: Arc<Mailbox>,
    bus: EventBus,
    sessions: RwLock<BTreeMap<SessionId, Arc<Session<M, P>>>>,
    ids: SequentialIdGen,
}

impl<M: Mux, P: ProcInspector> SessionManager<M, P> {
    pub fn new(
        setup: SessionSetup,
        mux: M,
        proc: P,
        mailbox: Arc<Mailbox>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        mailbox.ensure(anvil_core::USER);
        Arc::new(Self {
            setup,
            mux,
            proc,
            clock,
            mailbox,
            bus,
            sessions: RwLock::new(BTreeMap::new()),
            ids: SequentialIdGen::new("s"),
        })
    }

    /// Register this manager as the mailbox's alias-lookup capability.
    /// Weak wiring: the mailbox must not keep the manager alive.
    pub fn register_alias_lookup(self: &Arc<Self>) {
        let as_lookup: Arc<dyn AliasLookup> = Arc::clone(self) as Arc<dyn AliasLookup>;
        self.mailbox.set_alias_lookup(Arc::downgrade(&as_lookup));
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create, register, and asynchronously start a session.
    ///
    /// Returns as soon as the session exists in `starting`; the launch
    /// proceeds in the background and surfaces through the `state` file
    /// and the event stream.
    pub async fn new_session(
        &self,
        backend: &str,
        cwd_raw: &str,
        role: Option<String>,
        tasks: Vec<String>,
    ) -> Result<SessionId, Error> {
        let spec = self
            .setup
            .registry
            .get(backend)
            .ok_or_else(|| Error::with(ErrorKind::BadRequest, format!("unknown backend {backend}")))?
            .clone();
        let cwd = validate_cwd(cwd_raw)?;
        if let Some(role) = &role {
            if !validate_name(role) {
                return Err(Error::with(ErrorKind::BadRequest, format!("bad role {role}")));
            }
        }
        for task in &tasks {
            if !validate_name(task) {
                return Err(Error::with(ErrorKind::BadRequest, format!("bad task {task}")));
            }
        }

        // Compose the sandbox against the live environment
        let template_ctx = TemplateCtx {
            cwd: cwd.clone(),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            env: std::env::vars().collect(),
        };
        let sandbox = self
            .setup
            .composer
            .compose(backend, role.as_deref(), &tasks, &template_ctx)
            .map_err(sandbox_error)?;
        let command = self
            .setup
            .composer
            .wrap(&sandbox, &spec.command)
            .map_err(sandbox_error)?;

        // Captured environment: base set plus the sandbox whitelist
        let mut wanted: Vec<&str> = BASE_ENV.to_vec();
        wanted.extend(sandbox.env.iter().map(String::as_str));
        let env: Vec<(String, String)> = wanted
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| ((*key).to_string(), v)))
            .collect();

        self.mux
            .ensure_session(&self.setup.mux_session)
            .await
            .map_err(|e| Error::with(ErrorKind::BackendLaunchFailed, e.to_string()))?;

        let id = SessionId::new(self.ids.next());
        let window = window_names::window_name(id.as_str(), backend);
        let target = WindowTarget::new(self.setup.mux_session.clone(), window);
        let fifo_path = self.setup.fifo_dir.join(format!("{id}.pipe"));

        let cfg = SessionConfig {
            id: id.clone(),
            backend: backend.to_string(),
            command,
            process_name: spec.process_name(),
            cwd,
            role,
            tasks,
            env,
            target,
            fifo_path,
            context: spec.context.clone(),
            slash_commands: spec.slash_commands.clone(),
            startup_handler: spec.startup_handler,
            poll: self.setup.timing.poll,
            quiesce: self.setup.timing.quiesce,
            ready_timeout: self.setup.timing.ready_timeout,
            settle: self.setup.timing.settle,
        };

        let session = Session::new(cfg, self.mux.clone(), self.proc.clone());

        // State changes go straight onto the event bus
        {
            let bus = self.bus.clone();
            let clock = Arc::clone(&self.clock);
            session.set_on_change(Box::new(move |sid, old, new| {
                bus.publish(Event::state_change(clock.unix_secs(), sid.as_str(), old, new));
            }));
        }

        self.sessions.write().insert(id.clone(), Arc::clone(&session));
        self.mailbox.ensure(id.as_str());
        info!(id = %id, backend, "session created");

        tokio::spawn(async move {
            if let Err(e) = session.start().await {
                error!(id = %session.id(), error = %e, "session launch failed");
            }
        });

        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session<M, P>>> {
        self.sessions.read().get(id).cloned()
    }

    /// Like `get`, but failing with the error file operations surface.
    pub fn require(&self, id: &str) -> Result<Arc<Session<M, P>>, Error> {
        self.get(id)
            .ok_or_else(|| Error::with(ErrorKind::SessionNotFound, id.to_string()))
    }

    pub fn by_alias(&self, alias: &str) -> Option<Arc<Session<M, P>>> {
        self.sessions
            .read()
            .values()
            .find(|s| s.alias().as_deref() == Some(alias))
            .cloned()
    }

    /// Resolve a session id or alias.
    pub fn resolve(&self, name: &str) -> Option<Arc<Session<M, P>>> {
        self.get(name).or_else(|| self.by_alias(name))
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions.read().values().map(|s| s.info()).collect()
    }

    pub fn sessions(&self) -> Vec<Arc<Session<M, P>>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Set or clear an alias; aliases must be unique across sessions.
    pub fn set_alias(&self, id: &str, alias: Option<String>) -> Result<(), Error> {
        let session = self.require(id)?;
        if let Some(alias) = &alias {
            if !validate_name(alias) {
                return Err(Error::with(ErrorKind::BadRequest, format!("bad alias {alias}")));
            }
            if let Some(existing) = self.by_alias(alias) {
                if existing.id() != session.id() {
                    return Err(Error::with(
                        ErrorKind::BadRequest,
                        format!("alias {alias} in use by {}", existing.id()),
                    ));
                }
            }
        }
        session.set_alias(alias);
        Ok(())
    }

    /// Close a session and drop it from the registry and mailbox.
    pub async fn kill(&self, id: &str) -> Result<(), Error> {
        let session = self.require(id)?;
        session.close().await?;
        self.sessions.write().remove(id);
        self.mailbox.remove(id);
        Ok(())
    }

    /// Close every session (daemon shutdown).
    pub async fn close_all(&self) {
        let sessions = self.sessions();
        for session in sessions {
            if let Err(e) = session.close().await {
                error!(id = %session.id(), error = %e, "close failed during shutdown");
            }
        }
        self.sessions.write().clear();
    }
}

impl<M: Mux, P: ProcInspector> AliasLookup for SessionManager<M, P> {
    fn alias_of(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|s| s.alias())
    }
}

fn sandbox_error(e: SandboxError) -> Error {
    match e {
        SandboxError::Unavailable(launcher) => {
            Error::with(ErrorKind::SandboxUnavailable, launcher)
        }
        other => Error::with(ErrorKind::BadRequest, other.to_string()),
    }
}

// pub(crate): the pump tests drive sessions through this rig
#[cfg(test)]
#[path = "manager_tests.rs"]
pub(crate) mod tests;
