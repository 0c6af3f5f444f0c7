// SPDX-License-Identifier: MIT

use super::*;
use anvil_core::{MessageType, SequentialIdGen, USER};

fn mailbox() -> Mailbox {
    Mailbox::new(SequentialIdGen::new("m"))
}

fn msg(from: &str, to: &str) -> Message {
    Message::new(from, to, MessageType::PromptRequest, "subj", "body")
}

#[test]
fn put_outbox_fills_id_and_timestamp() {
    let mb = mailbox();
    let queued = mb.put_outbox("s1", msg("s1", "s2"), 1234);
    assert_eq!(queued.id, "m1");
    assert_eq!(queued.timestamp, 1234);

    // Preset values survive
    let mut preset = msg("s1", "s2");
    preset.id = "custom".to_string();
    preset.timestamp = 99;
    let queued = mb.put_outbox("s1", preset, 1234);
    assert_eq!(queued.id, "custom");
    assert_eq!(queued.timestamp, 99);
}

#[test]
fn outbox_is_fifo() {
    let mb = mailbox();
    mb.put_outbox("s1", msg("s1", "a"), 1);
    mb.put_outbox("s1", msg("s1", "b"), 2);

    assert_eq!(mb.peek_outbox("s1").unwrap().to, "a");
    assert_eq!(mb.remove_outbox("s1").unwrap().to, "a");
    assert_eq!(mb.remove_outbox("s1").unwrap().to, "b");
    assert!(mb.remove_outbox("s1").is_none());
}

#[test]
fn deliver_requires_a_known_recipient() {
    let mb = mailbox();
    let err = mb.deliver("ghost", msg("s1", "ghost")).unwrap_err();
    assert_eq!(err.kind, anvil_core::ErrorKind::NoSuchRecipient);

    mb.ensure("s2");
    mb.deliver("s2", msg("s1", "s2")).unwrap();
    assert_eq!(mb.inbox("s2").len(), 1);
}

#[test]
fn message_is_in_exactly_one_queue_at_any_time() {
    let mb = mailbox();
    mb.ensure("s2");
    let queued = mb.put_outbox("s1", msg("s1", "s2"), 1);
    let id = queued.id.clone();

    let in_queues = |mb: &Mailbox| {
        let mut count = 0;
        for who in ["s1", "s2"] {
            count += mb.outbox(who).iter().filter(|m| m.id == id).count();
            count += mb.inbox(who).iter().filter(|m| m.id == id).count();
            count += mb.completed(who).iter().filter(|m| m.id == id).count();
        }
        count
    };
    assert_eq!(in_queues(&mb), 1);

    let taken = mb.remove_outbox("s1").unwrap();
    mb.deliver("s2", taken).unwrap();
    assert_eq!(in_queues(&mb), 1);

    mb.complete("s2", &id).unwrap();
    assert_eq!(in_queues(&mb), 1);
    assert_eq!(mb.completed("s2").len(), 1);
}

#[test]
fn complete_moves_inbox_to_completed_once() {
    let mb = mailbox();
    mb.ensure(USER);
    let queued = mb.put_outbox("s1", msg("s1", USER), 5);
    let taken = mb.remove_outbox("s1").unwrap();
    mb.deliver(USER, taken).unwrap();

    mb.complete(USER, &queued.id).unwrap();
    // Completing an already-completed id fails with NotFound
    let err = mb.complete(USER, &queued.id).unwrap_err();
    assert_eq!(err.kind, anvil_core::ErrorKind::NotFound);
}

#[test]
fn inbox_order_is_delivery_order() {
    let mb = mailbox();
    mb.ensure("s3");
    for n in 0..3 {
        let mut m = msg("s1", "s3");
        m.subject = format!("n{n}");
        let m = mb.put_outbox("s1", m, n);
        mb.remove_outbox("s1").unwrap();
        mb.deliver("s3", m).unwrap();
    }
    let subjects: Vec<_> = mb.inbox("s3").iter().map(|m| m.subject.clone()).collect();
    assert_eq!(subjects, vec!["n0", "n1", "n2"]);

    assert_eq!(mb.pull_inbox("s3").unwrap().subject, "n0");
    assert_eq!(mb.inbox("s3").len(), 2);
}

#[test]
fn copies_are_defensive() {
    let mb = mailbox();
    mb.ensure("s2");
    mb.deliver("s2", msg("s1", "s2")).unwrap();
    let mut copy = mb.inbox("s2");
    copy[0].subject = "mutated".to_string();
    assert_eq!(mb.inbox("s2")[0].subject, "subj");
}

#[test]
fn find_searches_all_queues() {
    let mb = mailbox();
    mb.ensure("s2");
    let queued = mb.put_outbox("s2", msg("s2", USER), 1);
    assert!(mb.find("s2", &queued.id).is_some());
    assert!(mb.find("s2", "m999").is_none());
}

#[tokio::test]
async fn audit_tail_gets_backlog_then_live_lines() {
    let mb = mailbox();
    mb.ensure("s2");
    mb.put_outbox("s1", msg("s1", "s2"), 10);

    let mut tail = mb.tail_audit();
    assert_eq!(tail.backlog.len(), 1);
    assert!(tail.backlog[0].contains("queued"), "{}", tail.backlog[0]);
    assert!(tail.backlog[0].contains("PROMPT_REQUEST"));

    let taken = mb.remove_outbox("s1").unwrap();
    mb.deliver("s2", taken).unwrap();
    let line = tail.rx.recv().await.unwrap();
    assert!(line.contains("delivered"), "{line}");
}

#[test]
fn audit_lines_use_aliases_when_available() {
    struct FixedAliases;
    impl AliasLookup for FixedAliases {
        fn alias_of(&self, id: &str) -> Option<String> {
            (id == "s1").then(|| "builder".to_string())
        }
    }
    let lookup: Arc<dyn AliasLookup> = Arc::new(FixedAliases);

    let mb = mailbox();
    mb.set_alias_lookup(Arc::downgrade(&lookup));
    mb.put_outbox("s1", msg("s1", "user"), 7);

    let tail = mb.tail_audit();
    assert!(tail.backlog[0].contains("s1(builder)"), "{}", tail.backlog[0]);
}
