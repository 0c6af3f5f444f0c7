// SPDX-License-Identifier: MIT

//! Background startup: re-exec self detached and wait for the pidfile.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("could not locate own binary: {0}")]
    NoBinary(std::io::Error),
    #[error("failed to spawn daemon: {0}")]
    SpawnFailed(std::io::Error),
    #[error("daemon did not come up within {0:?}")]
    StartupTimeout(Duration),
}

/// How long the parent waits for the child's pidfile.
const STARTUP_WAIT: Duration = Duration::from_secs(1);

/// Re-exec ourselves with the daemonized sentinel set, detach stdio, and
/// wait for the pidfile to appear. Returns the child pid.
pub fn start_background(pid_path: &Path) -> Result<u32, BackgroundError> {
    let exe = std::env::current_exe().map_err(BackgroundError::NoBinary)?;
    let mut cmd = Command::new(exe);
    cmd.env(crate::env::DAEMONIZED_ENV, "1");
    spawn_and_wait(cmd, pid_path, STARTUP_WAIT)
}

/// Spawn `cmd` detached and wait for `pid_path` to appear.
fn spawn_and_wait(
    mut cmd: Command,
    pid_path: &Path,
    wait: Duration,
) -> Result<u32, BackgroundError> {
    let child = cmd
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(BackgroundError::SpawnFailed)?;

    let deadline = Instant::now() + wait;
    while Instant::now() < deadline {
        if pid_path.exists() {
            return Ok(child.id());
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    Err(BackgroundError::StartupTimeout(wait))
}

#[cfg(test)]
#[path = "background_tests.rs"]
mod tests;
