// SPDX-License-Identifier: MIT

//! Daemon lifecycle: rendezvous directory, single-instance pidfile,
//! socket, startup wiring, graceful shutdown.

use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Arc;

use anvil_adapters::{sandbox, ProcfsInspector, TmuxMux};
use anvil_core::{SystemClock, UuidIdGen};
use anvil_engine::{
    backend, spawn_pump, BackendRegistry, EventBus, Mailbox, SessionManager, SessionSetup,
    SessionTiming,
};
use anvil_ninep::serve_connection;
use anvil_storage::BeadStore;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::fs::AgentFs;

/// Daemon configuration: every path the daemon owns.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rendezvous directory (socket + pidfile + fifos + log)
    pub rendezvous: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub fifo_dir: PathBuf,
    /// Bead store directory (persists across daemon restarts)
    pub beads_dir: PathBuf,
    /// Name of the multiplexer session hosting all windows
    pub mux_session: String,
}

impl Config {
    /// Resolve the configuration: `ANVIL_DIR` if set, else the well-known
    /// per-user template `/tmp/anvil-<login>`.
    pub fn load() -> Result<Self, LifecycleError> {
        let rendezvous = match crate::env::rendezvous_dir() {
            Some(dir) => dir,
            None => {
                let login = login_name()?;
                PathBuf::from(format!("/tmp/anvil-{login}"))
            }
        };
        Ok(Self::at(rendezvous))
    }

    /// Configuration rooted at an explicit rendezvous directory.
    ///
    /// The multiplexer session name is derived from the directory name so
    /// two daemons with different rendezvous directories never share
    /// windows.
    pub fn at(rendezvous: PathBuf) -> Self {
        let namespace = rendezvous
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "anvil".to_string());
        let beads_dir = crate::env::beads_dir().unwrap_or_else(anvil_storage::default_dir);
        Self {
            socket_path: rendezvous.join("agent"),
            pid_path: rendezvous.join("anvild.pid"),
            version_path: rendezvous.join("anvild.version"),
            log_path: rendezvous.join("anvild.log"),
            fifo_dir: rendezvous.join("fifo"),
            beads_dir,
            mux_session: namespace,
            rendezvous,
        }
    }
}

fn login_name() -> Result<String, LifecycleError> {
    let uid = nix::unistd::Uid::current();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        _ => std::env::var("USER").map_err(|_| LifecycleError::NoLogin),
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine login name")]
    NoLogin,

    #[error("already running (pid {pid})")]
    AlreadyRunning { pid: String },

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("backend registry: {0}")]
    Backend(#[from] backend::BackendError),

    #[error("bead store: {0}")]
    Store(#[from] anvil_storage::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Concrete namespace type the production daemon serves.
pub type DaemonFs = AgentFs<TmuxMux, ProcfsInspector>;

/// A started daemon: listener bound, pidfile held, pump running.
impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").field("config", &self.config).finish()
    }
}

pub struct Daemon {
    pub config: Config,
    pub fs: Arc<DaemonFs>,
    manager: Arc<SessionManager<TmuxMux, ProcfsInspector>>,
    listener: UnixListener,
    pump: tokio::task::JoinHandle<()>,
}

/// Start the daemon: acquire the rendezvous directory and pidfile, wire
/// the engine, bind the socket.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    // 1. Rendezvous directory, owner-only
    create_private_dir(&config.rendezvous)?;
    create_private_dir(&config.fifo_dir)?;

    // 2. Single instance via O_EXCL pidfile (stale files are retried once)
    acquire_pidfile(&config)?;

    // 3. Version marker
    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // 4. Engine wiring
    let clock: Arc<dyn anvil_core::Clock> = Arc::new(SystemClock);
    let store = BeadStore::open(&config.beads_dir, Arc::clone(&clock))?;
    let registry = BackendRegistry::load(&backend::default_registry_path())?;
    let mailbox = Arc::new(Mailbox::new(UuidIdGen));
    let bus = EventBus::new();

    let setup = SessionSetup {
        mux_session: config.mux_session.clone(),
        fifo_dir: config.fifo_dir.clone(),
        composer: sandbox::SandboxComposer::new(sandbox::default_config_dir()),
        registry,
        timing: SessionTiming::default(),
    };
    let manager = SessionManager::new(
        setup,
        TmuxMux::new(),
        ProcfsInspector::default(),
        Arc::clone(&mailbox),
        bus,
        Arc::clone(&clock),
    );
    manager.register_alias_lookup();

    let fs = Arc::new(AgentFs::new(Arc::clone(&manager), store, clock));

    // 5. Socket last, so a bound socket implies a working daemon
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    // 6. Pump
    let pump = spawn_pump(
        Arc::clone(&manager),
        anvil_adapters::pump_period(),
        anvil_adapters::nudge_after(),
    );

    info!(socket = %config.socket_path.display(), "daemon ready");
    Ok(Daemon {
        config,
        fs,
        manager,
        listener,
        pump,
    })
}

impl Daemon {
    /// Accept connections until `shutdown` fires.
    pub async fn serve(&self, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let fs = Arc::clone(&self.fs);
                        tokio::spawn(serve_connection(fs, stream));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = shutdown.notified() => return,
            }
        }
    }

    /// Drain: stop the pump, close every session, checkpoint beads,
    /// release the rendezvous files.
    pub async fn shutdown(self) {
        info!("shutting down");
        self.pump.abort();
        self.manager.close_all().await;

        if let Err(e) = self.fs.checkpoint_store() {
            warn!(error = %e, "bead checkpoint on shutdown failed");
        }

        for path in [
            &self.config.socket_path,
            &self.config.pid_path,
            &self.config.version_path,
        ] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "cleanup failed");
                }
            }
        }
        info!("daemon stopped");
    }
}

fn create_private_dir(path: &std::path::Path) -> Result<(), LifecycleError> {
    match std::fs::DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // Re-assert owner-only permissions on a pre-existing dir
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the pidfile with `O_EXCL`. A pidfile naming a dead process is
/// removed and retried once; a live process is `AlreadyRunning`.
fn acquire_pidfile(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    for attempt in 0..2 {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&config.pid_path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let contents = std::fs::read_to_string(&config.pid_path).unwrap_or_default();
                let pid = contents.trim().to_string();
                let live = pid
                    .parse::<i32>()
                    .ok()
                    .is_some_and(|p| {
                        nix::sys::signal::kill(nix::unistd::Pid::from_raw(p), None).is_ok()
                    });
                if live || attempt == 1 {
                    return Err(LifecycleError::AlreadyRunning { pid });
                }
                warn!(pid = %pid, "removing stale pidfile");
                std::fs::remove_file(&config.pid_path)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    // Second create_new attempt always returns above
    Err(LifecycleError::AlreadyRunning { pid: String::new() })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
