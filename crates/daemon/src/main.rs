// SPDX-License-Identifier: MIT

//! anvild - the anvil daemon.
//!
//! Serves the agent-orchestration namespace over 9P on a Unix socket in
//! the rendezvous directory. Default startup detaches into the
//! background; `--foreground` (or the re-exec sentinel) stays attached.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use anvil_daemon::{background, env, lifecycle, Config};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

fn main() {
    let mut foreground = std::env::var_os(env::DAEMONIZED_ENV).is_some();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("anvild {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            "--foreground" | "-f" => foreground = true,
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: anvild [--foreground | --help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("anvild: {e}");
            std::process::exit(1);
        }
    };

    if !foreground {
        match background::start_background(&config.pid_path) {
            Ok(pid) => {
                println!("anvild started (pid {pid})");
                return;
            }
            Err(e) => {
                eprintln!("anvild: {e}");
                eprintln!("hint: the daemon log is at {}", config.log_path.display());
                std::process::exit(1);
            }
        }
    }

    std::process::exit(run(config));
}

fn print_help() {
    println!("anvild {}", env!("CARGO_PKG_VERSION"));
    println!("Agent-orchestration daemon serving a 9P control tree.");
    println!();
    println!("USAGE:");
    println!("    anvild [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -f, --foreground   Stay attached instead of daemonizing");
    println!("    -h, --help         Print help information");
    println!("    -V, --version      Print version information");
    println!();
    println!("The rendezvous directory defaults to /tmp/anvil-<login> and");
    println!("can be overridden with ANVIL_DIR. Clients mount the 9P");
    println!("socket at <rendezvous>/agent.");
}

#[tokio::main]
async fn run_async(config: Config) -> i32 {
    let daemon = match lifecycle::startup(config).await {
        Ok(d) => d,
        Err(e @ lifecycle::LifecycleError::AlreadyRunning { .. }) => {
            eprintln!("anvild is {e}");
            return 1;
        }
        Err(e) => {
            error!("failed to start daemon: {e}");
            eprintln!("anvild: {e}");
            return 1;
        }
    };

    let shutdown = Arc::new(Notify::new());

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("signal handler: {e}");
            return 1;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("signal handler: {e}");
            return 1;
        }
    };

    info!(
        socket = %daemon.config.socket_path.display(),
        "anvild listening"
    );

    tokio::select! {
        _ = daemon.serve(Arc::clone(&shutdown)) => {}
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    daemon.shutdown().await;
    0
}

fn run(config: Config) -> i32 {
    // Create the rendezvous dir early so the log file has a home
    let _ = std::fs::create_dir_all(&config.rendezvous);
    rotate_log_if_needed(&config.log_path);
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("anvild: logging setup failed: {e}");
            return 1;
        }
    };

    run_async(config)
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `anvild.log` -> `.1` -> `.2` -> `.3`, deleting the oldest.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent"))?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
