// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-ninep: a 9P2000 wire codec and a generic async file-server loop.
//!
//! The daemon exposes its whole control surface as a synthetic 9P file
//! tree. This crate knows nothing about that tree: it frames and parses
//! 9P2000 messages ([`codec`], [`message`]) and drives a connection against
//! anything implementing [`Filesystem`] ([`server`]).

pub mod codec;
pub mod error;
pub mod message;
pub mod server;

pub use error::{FsError, NinepError};
pub use message::{
    OpenMode, Qid, Rmessage, Stat, Tmessage, DMDIR, MAX_MSIZE, NOFID, NOTAG, QTDIR, QTFILE,
    VERSION9P,
};
pub use server::{serve_connection, Filesystem};
