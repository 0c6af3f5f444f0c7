// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: the terminal multiplexer, `/proc`, FIFOs,
//! and the sandbox launcher.

pub mod alias;
mod env;
pub mod fifo;
pub mod mux;
pub mod proc;
pub mod sandbox;
pub mod subprocess;

pub use env::{nudge_after, poll_interval, pump_period, quiesce_window, ready_timeout, send_settle};
pub use fifo::{spawn_reader, Fifo, ReaderMsg};
pub use mux::{Mux, MuxError, TmuxMux, WindowTarget};
pub use proc::{ProcInspector, ProcfsInspector};
pub use sandbox::{
    Access, NetworkMode, SandboxComposer, SandboxError, SandboxMode, SandboxSpec, TemplateCtx,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use mux::{FakeMux, MuxCall};
#[cfg(any(test, feature = "test-support"))]
pub use proc::FakeProcInspector;
