// SPDX-License-Identifier: MIT

//! The mailbox pump: outbox draining, user-inbox routing, idle nudges.
//!
//! Runs every 5 seconds (configurable). Delivery failures to unknown
//! recipients dead-letter back to the sender's completed queue; delivery
//! is retried next tick only while the recipient exists, which it no
//! longer does once dead-lettered.

use std::sync::Arc;
use std::time::Duration;

use anvil_adapters::{Mux, ProcInspector};
use anvil_core::{Event, EventKind, Message, SessionState, USER};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::manager::SessionManager;

/// Deadline for a nudge prompt's completion wait.
const NUDGE_DEADLINE: Duration = Duration::from_secs(600);

/// Spawn the pump loop.
pub fn spawn_pump<M: Mux, P: ProcInspector>(
    manager: Arc<SessionManager<M, P>>,
    period: Duration,
    nudge_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            pump_once(&manager, nudge_after).await;
        }
    })
}

/// One pump cycle. Public so tests (and shutdown drains) can run it
/// synchronously.
pub async fn pump_once<M: Mux, P: ProcInspector>(
    manager: &Arc<SessionManager<M, P>>,
    nudge_after: Duration,
) {
    drain_outboxes(manager);
    route_user_inbox(manager);
    nudge_idle_sessions(manager, nudge_after);
}

/// Move every queued message from every outbox to its recipient's inbox.
fn drain_outboxes<M: Mux, P: ProcInspector>(manager: &Arc<SessionManager<M, P>>) {
    let mailbox = manager.mailbox();
    let now = manager.clock().unix_secs();

    for sender in mailbox.recipients() {
        while let Some(msg) = mailbox.peek_outbox(&sender) {
            // Aliases are valid recipient names; resolve before delivery
            let recipient = if msg.to == USER || mailbox.has_recipient(&msg.to) {
                msg.to.clone()
            } else if let Some(session) = manager.resolve(&msg.to) {
                session.id().to_string()
            } else {
                msg.to.clone() // unknown; deliver() will dead-letter
            };

            match mailbox.deliver(&recipient, msg.clone()) {
                Ok(()) => {
                    mailbox.remove_outbox(&sender);
                    publish_mail_events(manager, &msg, now);
                }
                Err(e) => {
                    debug!(from = %msg.from, to = %msg.to, error = %e, "dead-lettering");
                    mailbox.remove_outbox(&sender);
                    let dead = msg.clone().with_metadata(
                        "error",
                        serde_json::json!(format!("no such recipient: {}", msg.to)),
                    );
                    mailbox.push_completed(&sender, dead);
                }
            }
        }
    }
}

/// Sender- and recipient-side events for one delivered message.
fn publish_mail_events<M: Mux, P: ProcInspector>(
    manager: &Arc<SessionManager<M, P>>,
    msg: &Message,
    now: u64,
) {
    let bus = manager.bus();
    let send_kind = if msg.from == USER {
        EventKind::UserSend
    } else {
        EventKind::BotSend
    };
    let recv_kind = if msg.to == USER {
        EventKind::UserRecv
    } else {
        EventKind::BotRecv
    };
    bus.publish(Event::mail(now, msg.from.clone(), send_kind, &msg.id));
    bus.publish(Event::mail(now, msg.to.clone(), recv_kind, &msg.id));
}

/// Auto-complete the message types the operator never acts on.
fn route_user_inbox<M: Mux, P: ProcInspector>(manager: &Arc<SessionManager<M, P>>) {
    let mailbox = manager.mailbox();
    for msg in mailbox.inbox(USER) {
        if msg.kind.auto_complete() {
            if let Err(e) = mailbox.complete(USER, &msg.id) {
                warn!(id = %msg.id, error = %e, "auto-complete failed");
            }
        }
    }
}

/// Prompt idle sessions that have unread mail to go look at it.
fn nudge_idle_sessions<M: Mux, P: ProcInspector>(
    manager: &Arc<SessionManager<M, P>>,
    nudge_after: Duration,
) {
    for session in manager.sessions() {
        if session.state() != SessionState::Idle || session.idle_for() < nudge_after {
            continue;
        }
        let unread = manager.mailbox().inbox(session.id().as_str()).len();
        if unread == 0 {
            continue;
        }
        let prompt = format!(
            "You have {unread} unread message(s) in your inbox. \
             Read each message file under your inbox directory and act on it."
        );
        let id = session.id().clone();
        debug!(%id, unread, "nudging idle session");
        if let Err(e) = session.submit(prompt, NUDGE_DEADLINE) {
            debug!(%id, error = %e, "nudge skipped");
        }
    }
}

#[cfg(test)]
#[path = "pump_tests.rs"]
mod tests;
