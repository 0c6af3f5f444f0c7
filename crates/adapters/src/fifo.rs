// SPDX-License-Identifier: MIT

//! FIFO lifecycle and the per-session reader task.
//!
//! Each session owns one FIFO that the multiplexer mirrors window output
//! into. A blocking reader streams bytes from the FIFO to a channel; the
//! reader carries a generation number so that a restarted session's fresh
//! reader invalidates any chunks still in flight from the old one.

use std::io::Read;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A chunk of window output (or EOF) from one reader generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderMsg {
    pub generation: u64,
    /// `None` signals EOF: the write side of the FIFO closed.
    pub data: Option<Vec<u8>>,
}

/// Owned FIFO path; unlinked on drop.
#[derive(Debug)]
pub struct Fifo {
    path: PathBuf,
}

impl Fifo {
    /// Create a fresh FIFO at `path` with owner-only permissions,
    /// replacing any leftover file from a previous run.
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(std::io::Error::from)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the FIFO from the filesystem now rather than at drop.
    pub fn unlink(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to unlink fifo");
            }
        }
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        self.unlink();
    }
}

/// Spawn the blocking reader for one FIFO generation.
///
/// The open blocks until the multiplexer attaches the write side, then the
/// loop forwards chunks until EOF or until the receiver is dropped. EOF is
/// reported as a final `data: None` message.
pub fn spawn_reader(path: PathBuf, generation: u64, tx: mpsc::Sender<ReaderMsg>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %path.display(), generation, error = %e, "fifo open failed");
                let _ = tx.blocking_send(ReaderMsg {
                    generation,
                    data: None,
                });
                return;
            }
        };

        let mut buf = [0u8; 4096];
        loop {
            match file.read(&mut buf) {
                Ok(0) => {
                    let _ = tx.blocking_send(ReaderMsg {
                        generation,
                        data: None,
                    });
                    return;
                }
                Ok(n) => {
                    let msg = ReaderMsg {
                        generation,
                        data: Some(buf[..n].to_vec()),
                    };
                    if tx.blocking_send(msg).is_err() {
                        // Receiver gone: the session was closed or restarted
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(path = %path.display(), generation, error = %e, "fifo read failed");
                    let _ = tx.blocking_send(ReaderMsg {
                        generation,
                        data: None,
                    });
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "fifo_tests.rs"]
mod tests;
