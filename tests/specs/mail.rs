// SPDX-License-Identifier: MIT

//! Mail routing through the 9P surface: round trips, dead letters, and
//! the user inbox lifecycle.

use crate::prelude::*;

async fn two_idle_sessions(w: &World, c: &mut Client) {
    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(c, "s1", "idle").await;
    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(2).await;
    wait_for_state(c, "s2", "idle").await;
}

#[tokio::test]
async fn mail_round_trip_between_agents() {
    let w = World::new();
    let mut c = w.connect().await;
    two_idle_sessions(&w, &mut c).await;

    c.write_file(
        "/s1/mail",
        r#"{"to":"s2","type":"PROMPT_REQUEST","subject":"hi","body":"go"}"#,
    )
    .await
    .unwrap();
    w.pump().await;

    let inbox = c.list_dir("/s2/inbox").await.unwrap();
    assert_eq!(inbox.len(), 1);
    let content = c.read_file(&format!("/s2/inbox/{}", inbox[0])).await.unwrap();
    let msg: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(msg["from"], "s1");
    assert_eq!(msg["subject"], "hi");
    assert_eq!(msg["body"], "go");

    // The reply flows back; the user inbox never sees either message
    c.write_file(
        "/s2/mail",
        r#"{"to":"s1","type":"PROMPT_RESPONSE","subject":"re: hi","body":"done"}"#,
    )
    .await
    .unwrap();
    w.pump().await;

    let inbox = c.list_dir("/s1/inbox").await.unwrap();
    assert_eq!(inbox.len(), 1);
    let content = c.read_file(&format!("/s1/inbox/{}", inbox[0])).await.unwrap();
    assert!(content.contains("PROMPT_RESPONSE"));
    assert!(c.list_dir("/user/inbox").await.unwrap().is_empty());
}

#[tokio::test]
async fn dead_letter_returns_to_sender_completed() {
    let w = World::new();
    let mut c = w.connect().await;
    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    c.write_file(
        "/s1/mail",
        r#"{"to":"ghost","type":"QUERY_REQUEST","subject":"anyone?"}"#,
    )
    .await
    .unwrap();
    w.pump().await;

    let completed = c.list_dir("/s1/completed").await.unwrap();
    assert_eq!(completed.len(), 1);
    let content = c
        .read_file(&format!("/s1/completed/{}", completed[0]))
        .await
        .unwrap();
    let msg: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(msg["metadata"]["error"], "no such recipient: ghost");

    // It never reached any inbox
    assert!(c.list_dir("/s1/inbox").await.unwrap().is_empty());
    assert!(c.list_dir("/user/inbox").await.unwrap().is_empty());
}

#[tokio::test]
async fn user_inbox_lifecycle() {
    let w = World::new();
    let mut c = w.connect().await;
    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    // A response auto-completes; a review request waits for the operator
    c.write_file(
        "/s1/mail",
        r#"{"to":"user","type":"PROMPT_RESPONSE","subject":"done","body":"all green"}"#,
    )
    .await
    .unwrap();
    c.write_file(
        "/s1/mail",
        r#"{"to":"user","type":"REVIEW_REQUEST","subject":"please review"}"#,
    )
    .await
    .unwrap();
    w.pump().await;

    let inbox = c.list_dir("/user/inbox").await.unwrap();
    assert_eq!(inbox.len(), 1, "{inbox:?}");
    let content = c.read_file(&format!("/user/inbox/{}", inbox[0])).await.unwrap();
    assert!(content.contains("REVIEW_REQUEST"));

    // Operator completes it; completing again is NotFound
    c.write_file("/user/ctl", &format!("complete {}", inbox[0]))
        .await
        .unwrap();
    assert!(c.list_dir("/user/inbox").await.unwrap().is_empty());
    let err = c
        .write_file("/user/ctl", &format!("complete {}", inbox[0]))
        .await
        .unwrap_err();
    assert_eq!(err, "not found");
}

#[tokio::test]
async fn mail_from_user_reaches_the_agent_and_nudges_it() {
    let w = World::new();
    let mut c = w.connect().await;
    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    c.write_file(
        "/user/mail",
        r#"{"to":"s1","type":"PROMPT_REQUEST","subject":"task","body":"do it"}"#,
    )
    .await
    .unwrap();
    w.pump().await;
    assert_eq!(c.list_dir("/s1/inbox").await.unwrap().len(), 1);

    // With the nudge threshold at zero, the next pump injects a prompt
    anvil_engine::pump_once(&w.manager, std::time::Duration::ZERO).await;
    let target = w.target_of("s1");
    for _ in 0..500 {
        if !w.mux.sent_literals(&target).is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    let literals = w.mux.sent_literals(&target);
    assert!(
        literals.iter().any(|l| l.contains("unread message")),
        "{literals:?}"
    );
}

#[tokio::test]
async fn missing_recipient_is_rejected_at_write_time() {
    let w = World::new();
    let mut c = w.connect().await;
    let err = c
        .write_file("/user/mail", r#"{"type":"PROMPT_REQUEST","subject":"hi"}"#)
        .await
        .unwrap_err();
    assert_eq!(err, "missing recipient");
}
