// SPDX-License-Identifier: MIT

//! Per-recipient mail queues and the audit log.
//!
//! Every message lives in exactly one of `{outbox, inbox, completed}` at
//! any instant; all moves happen under one mutex. The audit log is an
//! append-only text buffer (64 MiB cap, trimmed by a quarter when
//! exceeded) exposed as a backlog-then-live line stream.

use anvil_core::{Error, ErrorKind, IdGen, Message};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// Audit log cap and trim fraction.
const AUDIT_MAX_BYTES: usize = 64 * 1024 * 1024;
const AUDIT_TRIM_DENOMINATOR: usize = 4;

/// Buffered lines per audit tail subscriber.
const TAIL_BUFFER: usize = 256;

/// Resolves a session id to its alias for human-readable audit lines.
///
/// Injected as a capability so the mailbox never holds a session-manager
/// reference (which would close a reference cycle).
pub trait AliasLookup: Send + Sync {
    fn alias_of(&self, id: &str) -> Option<String>;
}

#[derive(Default)]
struct Queues {
    outbox: VecDeque<Message>,
    inbox: Vec<Message>,
    completed: Vec<Message>,
}

#[derive(Default)]
struct AuditLog {
    lines: VecDeque<String>,
    bytes: usize,
    tails: Vec<mpsc::Sender<String>>,
}

impl AuditLog {
    fn append(&mut self, line: String) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line.clone());
        while self.bytes > AUDIT_MAX_BYTES {
            let target = AUDIT_MAX_BYTES - AUDIT_MAX_BYTES / AUDIT_TRIM_DENOMINATOR;
            while self.bytes > target {
                match self.lines.pop_front() {
                    Some(dropped) => self.bytes -= dropped.len() + 1,
                    None => break,
                }
            }
        }
        self.tails.retain(|tx| tx.try_send(line.clone()).is_ok());
    }
}

#[derive(Default)]
struct Inner {
    boxes: HashMap<String, Queues>,
    audit: AuditLog,
}

/// Live tail of the audit log: everything retained so far, then new lines
/// as they are written. A tail that falls [`TAIL_BUFFER`] lines behind is
/// disconnected.
pub struct AuditTail {
    pub backlog: Vec<String>,
    pub rx: mpsc::Receiver<String>,
}

pub struct Mailbox {
    inner: Mutex<Inner>,
    ids: Box<dyn IdGen>,
    aliases: Mutex<Option<Weak<dyn AliasLookup>>>,
}

impl Mailbox {
    pub fn new(ids: impl IdGen) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ids: Box::new(ids),
            aliases: Mutex::new(None),
        }
    }

    /// Wire the alias-lookup capability (weak: the manager owns us).
    pub fn set_alias_lookup(&self, lookup: Weak<dyn AliasLookup>) {
        *self.aliases.lock() = Some(lookup);
    }

    /// Idempotently create the three queues for a recipient.
    pub fn ensure(&self, recipient: &str) {
        self.inner
            .lock()
            .boxes
            .entry(recipient.to_string())
            .or_default();
    }

    /// Remove a recipient's queues entirely (session closed).
    pub fn remove(&self, recipient: &str) {
        self.inner.lock().boxes.remove(recipient);
    }

    pub fn recipients(&self) -> Vec<String> {
        self.inner.lock().boxes.keys().cloned().collect()
    }

    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.inner.lock().boxes.contains_key(recipient)
    }

    /// Queue an outgoing message, assigning id and timestamp if unset.
    pub fn put_outbox(&self, sender: &str, mut msg: Message, now: u64) -> Message {
        if msg.id.is_empty() {
            msg.id = self.ids.next();
        }
        if msg.timestamp == 0 {
            msg.timestamp = now;
        }
        let line = self.audit_line(&msg, "queued");
        let mut inner = self.inner.lock();
        inner
            .boxes
            .entry(sender.to_string())
            .or_default()
            .outbox
            .push_back(msg.clone());
        inner.audit.append(line);
        msg
    }

    pub fn peek_outbox(&self, sender: &str) -> Option<Message> {
        self.inner
            .lock()
            .boxes
            .get(sender)
            .and_then(|q| q.outbox.front().cloned())
    }

    pub fn remove_outbox(&self, sender: &str) -> Option<Message> {
        self.inner
            .lock()
            .boxes
            .get_mut(sender)
            .and_then(|q| q.outbox.pop_front())
    }

    /// Deliver into a recipient's inbox.
    pub fn deliver(&self, recipient: &str, msg: Message) -> Result<(), Error> {
        let line = self.audit_line(&msg, "delivered");
        let mut inner = self.inner.lock();
        let Some(queues) = inner.boxes.get_mut(recipient) else {
            return Err(Error::with(
                ErrorKind::NoSuchRecipient,
                format!("no mailbox for {recipient}"),
            ));
        };
        queues.inbox.push(msg);
        inner.audit.append(line);
        Ok(())
    }

    pub fn peek_inbox(&self, recipient: &str) -> Option<Message> {
        self.inner
            .lock()
            .boxes
            .get(recipient)
            .and_then(|q| q.inbox.first().cloned())
    }

    /// Remove and return the oldest inbox message.
    pub fn pull_inbox(&self, recipient: &str) -> Option<Message> {
        self.inner
            .lock()
            .boxes
            .get_mut(recipient)
            .filter(|q| !q.inbox.is_empty())
            .map(|q| q.inbox.remove(0))
    }

    /// Move an inbox message to completed by id.
    pub fn complete(&self, recipient: &str, msg_id: &str) -> Result<Message, Error> {
        let mut inner = self.inner.lock();
        let Some(queues) = inner.boxes.get_mut(recipient) else {
            return Err(Error::new(ErrorKind::NotFound));
        };
        let Some(pos) = queues.inbox.iter().position(|m| m.id == msg_id) else {
            return Err(Error::with(ErrorKind::NotFound, format!("message {msg_id}")));
        };
        let msg = queues.inbox.remove(pos);
        queues.completed.push(msg.clone());
        let line = self.audit_line_locked(&msg, "completed");
        inner.audit.append(line);
        Ok(msg)
    }

    /// File a message directly into `completed` (dead-letter path).
    pub fn push_completed(&self, recipient: &str, msg: Message) {
        let line = self.audit_line(&msg, "dead-letter");
        let mut inner = self.inner.lock();
        inner
            .boxes
            .entry(recipient.to_string())
            .or_default()
            .completed
            .push(msg);
        inner.audit.append(line);
        debug!(recipient, "message dead-lettered");
    }

    pub fn inbox(&self, recipient: &str) -> Vec<Message> {
        self.inner
            .lock()
            .boxes
            .get(recipient)
            .map(|q| q.inbox.clone())
            .unwrap_or_default()
    }

    pub fn outbox(&self, recipient: &str) -> Vec<Message> {
        self.inner
            .lock()
            .boxes
            .get(recipient)
            .map(|q| q.outbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn completed(&self, recipient: &str) -> Vec<Message> {
        self.inner
            .lock()
            .boxes
            .get(recipient)
            .map(|q| q.completed.clone())
            .unwrap_or_default()
    }

    /// Look up one message anywhere in a recipient's queues.
    pub fn find(&self, recipient: &str, msg_id: &str) -> Option<Message> {
        let inner = self.inner.lock();
        let queues = inner.boxes.get(recipient)?;
        queues
            .inbox
            .iter()
            .chain(queues.completed.iter())
            .chain(queues.outbox.iter())
            .find(|m| m.id == msg_id)
            .cloned()
    }

    /// Subscribe to the audit log.
    pub fn tail_audit(&self) -> AuditTail {
        let (tx, rx) = mpsc::channel(TAIL_BUFFER);
        let mut inner = self.inner.lock();
        let backlog = inner.audit.lines.iter().cloned().collect();
        inner.audit.tails.push(tx);
        AuditTail { backlog, rx }
    }

    fn display_name(&self, id: &str) -> String {
        let lookup = self.aliases.lock().clone();
        lookup
            .and_then(|weak| weak.upgrade())
            .and_then(|l| l.alias_of(id))
            .map(|alias| format!("{id}({alias})"))
            .unwrap_or_else(|| id.to_string())
    }

    fn audit_line(&self, msg: &Message, action: &str) -> String {
        self.audit_line_locked(msg, action)
    }

    // Must not touch `inner`; callers may hold the lock.
    fn audit_line_locked(&self, msg: &Message, action: &str) -> String {
        format!(
            "{} {} {} -> {} [{}] {}",
            msg.timestamp,
            action,
            self.display_name(&msg.from),
            self.display_name(&msg.to),
            msg.kind,
            msg.subject,
        )
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
