// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-core: domain types for the anvil daemon

pub mod bead;
pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod message;
pub mod path;
pub mod session;

pub use bead::{Bead, BeadDep, BeadStatus, DepKind};
pub use clock::{Clock, SystemClock};
pub use error::{Error, ErrorKind};
pub use event::{Event, EventKind};
pub use id::{BeadId, IdGen, MessageId, SequentialIdGen, SessionId, UuidIdGen};
pub use message::{Message, MessageType, USER};
pub use path::{validate_cwd, validate_name};
pub use session::SessionState;

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
