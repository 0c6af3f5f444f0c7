// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-daemon: the `anvild` binary and its 9P namespace.
//!
//! The library half exists so integration tests can assemble the full
//! namespace over fake adapters and drive it through an in-memory 9P
//! connection.

pub mod background;
pub mod env;
pub mod fs;
pub mod lifecycle;

pub use fs::AgentFs;
pub use lifecycle::{startup, Config, Daemon, LifecycleError};
