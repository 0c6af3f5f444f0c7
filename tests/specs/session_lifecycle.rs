// SPDX-License-Identifier: MIT

//! Session lifecycle through the 9P surface: create, prompt, crash,
//! restart, kill, and manual state writes.

use crate::prelude::*;
use anvil_adapters::Mux;

#[tokio::test]
async fn create_prompt_complete() {
    let w = World::new();
    let mut c = w.connect().await;

    // Create: list grows by one, state starting
    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    let list = c.read_file("/list").await.unwrap();
    assert_eq!(list.lines().count(), 1);
    let first: Vec<&str> = list.lines().next().unwrap().split_whitespace().collect();
    assert_eq!(first[0], "s1");
    assert!(first[2] == "starting" || first[2] == "idle", "{list}");

    // Becomes idle within the ready timeout
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    // Subscribe to events before prompting
    let events_fid = c.walk("/events").await.unwrap();
    c.open(events_fid, 0).await.unwrap();

    // Prompt via the legacy direct path
    c.write_file("/s1/in", "hello\n").await.unwrap();
    wait_for_state(&mut c, "s1", "running").await;
    w.mux.emit(&w.target_of("s1"), BANNER);
    wait_for_state(&mut c, "s1", "idle").await;

    // The StateChange to running is observed before the one to idle
    let mut seen = String::new();
    for _ in 0..10 {
        let reply = c
            .rpc(anvil_ninep::Tmessage::Read {
                fid: events_fid,
                offset: 0,
                count: 1 << 16,
            })
            .await;
        match reply {
            anvil_ninep::Rmessage::Read { data } => {
                seen.push_str(&String::from_utf8_lossy(&data));
            }
            other => panic!("unexpected events reply: {other:?}"),
        }
        if seen.contains("\"new\":\"idle\"") {
            break;
        }
    }
    let running_at = seen.find("\"new\":\"running\"").expect(&seen);
    let idle_at = seen.find("\"new\":\"idle\"").unwrap();
    assert!(running_at < idle_at);

    // The prompt reached the window followed by the submit chord
    let target = w.target_of("s1");
    assert_eq!(w.mux.sent_literals(&target), vec!["hello"]);
    assert!(w.mux.sent_keys(&target).contains(&"C-m".to_string()));
}

#[tokio::test]
async fn crash_and_restart_preserve_identity() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    c.write_file("/s1/alias", "builder").await.unwrap();

    // Kill the backend externally: tmux reaps the window, the reader EOFs
    w.mux.kill_window(&w.target_of("s1")).await.unwrap();
    wait_for_state(&mut c, "s1", "stopped").await;

    // Restart from another connection so this one can watch the state walk
    let w2 = w.connect().await;
    let mut restart_client = w2;
    let restart = tokio::spawn(async move {
        restart_client.write_file("/s1/ctl", "restart").await
    });

    wait_for_state(&mut c, "s1", "starting").await;
    w.emit_banner_for_launch(2).await;
    restart.await.unwrap().unwrap();
    wait_for_state(&mut c, "s1", "idle").await;

    // Identity, alias, and cwd all survive
    assert_eq!(c.read_file("/s1/alias").await.unwrap().trim(), "builder");
    assert_eq!(c.read_file("/s1/cwd").await.unwrap().trim(), "/tmp");
    let list = c.read_file("/list").await.unwrap();
    assert_eq!(list.lines().count(), 1);
    assert!(list.starts_with("s1 "), "{list}");
}

#[tokio::test]
async fn invalid_manual_transition_is_rejected() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    let err = c.write_file("/s1/state", "running").await.unwrap_err();
    assert_eq!(err, "invalid state transition");
    assert_eq!(c.read_file("/s1/state").await.unwrap().trim(), "idle");
}

#[tokio::test]
async fn new_then_kill_removes_from_list() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;
    assert!(c.read_file("/list").await.unwrap().contains("s1"));

    c.write_file("/s1/ctl", "kill").await.unwrap();

    assert!(!c.read_file("/list").await.unwrap().contains("s1"));
    // No further reads succeed on the session
    let err = c.read_file("/s1/state").await.unwrap_err();
    assert_eq!(err, "session not found");
    // The window is gone
    assert!(!w
        .mux
        .window_exists(&w.piped_targets()[0])
        .await
        .unwrap_or(true));
}

#[tokio::test]
async fn stop_is_idempotent_through_the_file() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    c.write_file("/s1/ctl", "stop").await.unwrap();
    assert_eq!(c.read_file("/s1/state").await.unwrap().trim(), "stopped");
    // Second stop succeeds with no state change
    c.write_file("/s1/ctl", "stop").await.unwrap();
    assert_eq!(c.read_file("/s1/state").await.unwrap().trim(), "stopped");
}

#[tokio::test]
async fn send_while_running_is_session_busy() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/ctl", "new fake /tmp").await.unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    c.write_file("/s1/in", "first\n").await.unwrap();
    wait_for_state(&mut c, "s1", "running").await;

    let err = c.write_file("/s1/in", "second\n").await.unwrap_err();
    assert_eq!(err, "session busy");

    w.mux.emit(&w.target_of("s1"), BANNER);
    wait_for_state(&mut c, "s1", "idle").await;
}

#[tokio::test]
async fn session_metadata_files_expose_the_record() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/ctl", "new fake /tmp role=builder task=deploy task=docs")
        .await
        .unwrap();
    w.emit_banner_for_launch(1).await;
    wait_for_state(&mut c, "s1", "idle").await;

    assert_eq!(c.read_file("/s1/backend").await.unwrap().trim(), "fake");
    assert_eq!(c.read_file("/s1/role").await.unwrap().trim(), "builder");
    assert_eq!(c.read_file("/s1/tasks").await.unwrap().trim(), "deploy docs");
    let tmux = c.read_file("/s1/tmux").await.unwrap();
    assert!(tmux.starts_with("anvil-spec:"), "{tmux}");

    // Session dir listing carries all the files plus mail dirs
    let names = c.list_dir("/s1").await.unwrap();
    for expected in ["ctl", "state", "context", "alias", "in", "mail", "inbox", "completed"] {
        assert!(names.contains(&expected.to_string()), "{names:?}");
    }
}
