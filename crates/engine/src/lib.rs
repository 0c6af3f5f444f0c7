// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-engine: session lifecycle, mail, and events.
//!
//! The engine is generic over the multiplexer and process-tree adapters so
//! every timing-sensitive path can run against fakes in tests.

pub mod backend;
pub mod bus;
pub mod mailbox;
pub mod manager;
pub mod pump;
pub mod session;
pub mod startup;

pub use backend::{BackendRegistry, BackendSpec};
pub use bus::{EventBus, Subscription, SUBSCRIBER_BUFFER};
pub use mailbox::{AliasLookup, AuditTail, Mailbox};
pub use manager::{SessionManager, SessionSetup};
pub use pump::{pump_once, spawn_pump};
pub use session::{Session, SessionConfig, SessionInfo, SessionTiming};
pub use startup::{StartupHandler, StartupHandlerKind, StartupStep};
