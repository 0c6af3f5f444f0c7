// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Sentinel set on the re-exec'd child so it runs in the foreground.
pub const DAEMONIZED_ENV: &str = "ANVIL_DAEMONIZED";

/// Explicit rendezvous directory override.
pub fn rendezvous_dir() -> Option<PathBuf> {
    std::env::var_os("ANVIL_DIR").map(PathBuf::from)
}

/// Bead store directory override (default `<home>/.beads`).
pub fn beads_dir() -> Option<PathBuf> {
    std::env::var_os("ANVIL_BEADS_DIR").map(PathBuf::from)
}
