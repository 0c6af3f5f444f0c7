// SPDX-License-Identifier: MIT

use super::*;
use crate::manager::tests::{rig, spawn_idle_session};
use anvil_core::{ErrorKind, Message, MessageType, USER};
use std::time::Duration;

fn prompt(from: &str, to: &str) -> Message {
    Message::new(from, to, MessageType::PromptRequest, "subj", "body")
}

#[tokio::test]
async fn outbox_drains_to_the_recipient_inbox() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let b = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();

    mailbox.put_outbox(a.as_str(), prompt(a.as_str(), b.as_str()), 10);
    pump_once(&r.manager, Duration::from_secs(3600)).await;

    assert!(mailbox.outbox(a.as_str()).is_empty());
    let inbox = mailbox.inbox(b.as_str());
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].from, a.as_str());
}

#[tokio::test]
async fn the_whole_outbox_drains_in_one_cycle() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let b = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();

    for _ in 0..5 {
        mailbox.put_outbox(a.as_str(), prompt(a.as_str(), b.as_str()), 10);
    }
    pump_once(&r.manager, Duration::from_secs(3600)).await;
    assert_eq!(mailbox.inbox(b.as_str()).len(), 5);
}

#[tokio::test]
async fn delivery_resolves_aliases() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let b = spawn_idle_session(&r).await;
    r.manager.set_alias(b.as_str(), Some("review".to_string())).unwrap();
    let mailbox = r.manager.mailbox();

    mailbox.put_outbox(a.as_str(), prompt(a.as_str(), "review"), 10);
    pump_once(&r.manager, Duration::from_secs(3600)).await;
    assert_eq!(mailbox.inbox(b.as_str()).len(), 1);
}

#[tokio::test]
async fn unknown_recipient_dead_letters_to_sender() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();

    mailbox.put_outbox(a.as_str(), prompt(a.as_str(), "ghost"), 10);
    pump_once(&r.manager, Duration::from_secs(3600)).await;

    assert!(mailbox.outbox(a.as_str()).is_empty());
    let completed = mailbox.completed(a.as_str());
    assert_eq!(completed.len(), 1);
    assert_eq!(
        completed[0].metadata["error"],
        serde_json::json!("no such recipient: ghost")
    );
    // It never reached anyone's inbox
    assert!(mailbox.inbox(USER).is_empty());
}

#[tokio::test]
async fn prompt_responses_to_user_auto_complete() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();

    let response = Message::new(a.as_str(), USER, MessageType::PromptResponse, "done", "ok");
    mailbox.put_outbox(a.as_str(), response, 10);
    let question = Message::new(a.as_str(), USER, MessageType::ApprovalRequest, "may i", "?");
    mailbox.put_outbox(a.as_str(), question, 11);

    pump_once(&r.manager, Duration::from_secs(3600)).await;

    // The response is auto-completed; the approval request waits
    let inbox = mailbox.inbox(USER);
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, MessageType::ApprovalRequest);
    assert_eq!(mailbox.completed(USER).len(), 1);
    assert_eq!(mailbox.completed(USER)[0].kind, MessageType::PromptResponse);
}

#[tokio::test]
async fn delivery_publishes_send_and_recv_events() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let mut sub = r.manager.bus().subscribe();
    let mailbox = r.manager.mailbox();

    mailbox.put_outbox(
        USER,
        Message::new(USER, a.as_str(), MessageType::PromptRequest, "s", "b"),
        10,
    );
    pump_once(&r.manager, Duration::from_secs(3600)).await;

    let mut kinds = Vec::new();
    while let Some(e) = sub.try_recv() {
        kinds.push(e.kind);
    }
    assert!(kinds.contains(&anvil_core::EventKind::UserSend), "{kinds:?}");
    assert!(kinds.contains(&anvil_core::EventKind::BotRecv), "{kinds:?}");
}

#[tokio::test]
async fn idle_sessions_with_mail_get_nudged() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();
    mailbox
        .deliver(a.as_str(), prompt(USER, a.as_str()))
        .unwrap();

    // nudge_after zero: eligible immediately
    pump_once(&r.manager, Duration::ZERO).await;

    let session = r.manager.get(a.as_str()).unwrap();
    let target = session.target().clone();
    // The nudge is an async submit; wait for the literal to land
    for _ in 0..500 {
        if !r.mux.sent_literals(&target).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let literals = r.mux.sent_literals(&target);
    assert!(
        literals.iter().any(|l| l.contains("unread message")),
        "{literals:?}"
    );
}

#[tokio::test]
async fn sessions_without_mail_are_left_alone() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    pump_once(&r.manager, Duration::ZERO).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let target = r.manager.get(a.as_str()).unwrap().target().clone();
    assert!(r.mux.sent_literals(&target).is_empty());
}

#[tokio::test]
async fn busy_sessions_are_not_nudged() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();
    mailbox.deliver(a.as_str(), prompt(USER, a.as_str())).unwrap();

    // Put the session into running first
    let session = r.manager.get(a.as_str()).unwrap();
    let target = session.target().clone();
    let sender = std::sync::Arc::clone(&session);
    let send = tokio::spawn(async move { sender.send("busy work", Duration::from_secs(5)).await });
    for _ in 0..500 {
        if session.state() == anvil_core::SessionState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    pump_once(&r.manager, Duration::ZERO).await;

    // Only the original prompt was ever injected
    assert_eq!(r.mux.sent_literals(&target), vec!["busy work"]);

    const BANNER: &[u8] =
        b"fake backend 0.1 ready --------------------------------------------\n> ";
    r.mux.emit(&target, BANNER);
    send.await.unwrap().unwrap();
}

#[tokio::test]
async fn submit_failure_does_not_poison_the_pump() {
    let r = rig();
    let a = spawn_idle_session(&r).await;
    let mailbox = r.manager.mailbox();
    mailbox.deliver(a.as_str(), prompt(USER, a.as_str())).unwrap();
    r.manager.get(a.as_str()).unwrap().stop().await.unwrap();

    // Stopped session: nudge is skipped, cycle completes
    pump_once(&r.manager, Duration::ZERO).await;
    let err = r
        .manager
        .get(a.as_str())
        .unwrap()
        .send("x", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionStopped);
}
