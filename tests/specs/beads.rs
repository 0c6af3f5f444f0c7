// SPDX-License-Identifier: MIT

//! The bead graph through the 9P surface.

use crate::prelude::*;

#[tokio::test]
async fn subtask_gating_scenario() {
    let w = World::new();
    let mut c = w.connect().await;

    // new 'A' 'root' -> an-1; new 'B' 'child' an-1 -> an-1.1
    c.write_file("/beads/ctl", "new 'A' 'root'").await.unwrap();
    c.write_file("/beads/ctl", "new 'B' 'child' an-1").await.unwrap();

    let ready = c.read_file("/beads/ready").await.unwrap();
    let beads: Vec<serde_json::Value> = serde_json::from_str(&ready).unwrap();
    let ids: Vec<&str> = beads.iter().filter_map(|b| b["id"].as_str()).collect();
    assert_eq!(ids, vec!["an-1.1"], "{ready}");

    c.write_file("/beads/ctl", "complete an-1.1").await.unwrap();
    let ready = c.read_file("/beads/ready").await.unwrap();
    let beads: Vec<serde_json::Value> = serde_json::from_str(&ready).unwrap();
    let ids: Vec<&str> = beads.iter().filter_map(|b| b["id"].as_str()).collect();
    assert_eq!(ids, vec!["an-1"], "{ready}");
}

#[tokio::test]
async fn explicit_dependencies_block_readiness() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/beads/ctl", "new 'build'").await.unwrap();
    c.write_file("/beads/ctl", "new 'deploy'").await.unwrap();
    c.write_file("/beads/ctl", "dep an-2 an-1").await.unwrap();

    let ready = c.read_file("/beads/ready").await.unwrap();
    assert!(ready.contains("\"an-1\"") && !ready.contains("\"an-2\""), "{ready}");

    c.write_file("/beads/ctl", "undep an-2 an-1").await.unwrap();
    let ready = c.read_file("/beads/ready").await.unwrap();
    assert!(ready.contains("\"an-2\""), "{ready}");
}

#[tokio::test]
async fn claim_and_fail_through_ctl() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/beads/ctl", "new 'risky'").await.unwrap();
    c.write_file("/beads/ctl", "claim an-1 s3").await.unwrap();
    assert_eq!(c.read_file("/beads/an-1/status").await.unwrap().trim(), "in_progress");
    assert_eq!(c.read_file("/beads/an-1/assignee").await.unwrap().trim(), "s3");

    c.write_file("/beads/ctl", "fail an-1 'environment broken'")
        .await
        .unwrap();
    assert_eq!(c.read_file("/beads/an-1/status").await.unwrap().trim(), "closed");
    let json = c.read_file("/beads/an-1/json").await.unwrap();
    assert!(json.contains("failed:environment broken"), "{json}");
}

#[tokio::test]
async fn init_changes_the_prefix() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/beads/ctl", "init web").await.unwrap();
    c.write_file("/beads/ctl", "new 'frontend'").await.unwrap();
    let listing = c.read_file("/beads/list").await.unwrap();
    assert!(listing.contains("\"web-1\""), "{listing}");
}

#[tokio::test]
async fn bead_directories_track_the_store() {
    let w = World::new();
    let mut c = w.connect().await;

    c.write_file("/beads/ctl", "new 'visible'").await.unwrap();
    let names = c.list_dir("/beads").await.unwrap();
    assert!(names.contains(&"an-1".to_string()), "{names:?}");
    assert!(names.contains(&"ctl".to_string()));
    assert!(names.contains(&"ready".to_string()));

    let fields = c.list_dir("/beads/an-1").await.unwrap();
    for f in ["status", "title", "description", "assignee", "role", "json"] {
        assert!(fields.contains(&f.to_string()), "{fields:?}");
    }

    c.write_file("/beads/ctl", "delete an-1").await.unwrap();
    let err = c.read_file("/beads/an-1/status").await.unwrap_err();
    assert_eq!(err, "not found");
}

#[tokio::test]
async fn malformed_bead_commands_are_bad_requests() {
    let w = World::new();
    let mut c = w.connect().await;
    assert_eq!(
        c.write_file("/beads/ctl", "promote an-1").await.unwrap_err(),
        "bad request"
    );
    assert_eq!(
        c.write_file("/beads/ctl", "fail an-1").await.unwrap_err(),
        "bad request"
    );
}
