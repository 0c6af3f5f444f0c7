// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[test]
fn child_id_appends_a_dotted_counter() {
    let parent = BeadId::new("an-3");
    assert_eq!(child_id(&parent, 1), "an-3.1");
    assert_eq!(child_id(&child_id(&parent, 1), 2), "an-3.1.2");
}

#[parameterized(
    root = { "an-3", None },
    child = { "an-3.1", Some("an-3") },
    grandchild = { "an-3.1.2", Some("an-3.1") },
)]
fn parent_id_strips_one_level(id: &str, expected: Option<&str>) {
    let got = parent_id(&BeadId::new(id));
    assert_eq!(got.as_ref().map(|p| p.as_str()), expected);
}

#[test]
fn child_counter_only_matches_direct_children() {
    let parent = BeadId::new("an-3");
    assert_eq!(child_counter(&parent, &BeadId::new("an-3.7")), Some(7));
    assert_eq!(child_counter(&parent, &BeadId::new("an-3.1.2")), None);
    assert_eq!(child_counter(&parent, &BeadId::new("an-30.1")), None);
    assert_eq!(child_counter(&parent, &BeadId::new("an-4.1")), None);
}

#[test]
fn new_bead_defaults() {
    let b = Bead::new(BeadId::new("an-1"), "title", "desc", 100);
    assert_eq!(b.status, BeadStatus::Open);
    assert_eq!(b.priority, 2);
    assert_eq!(b.issue_type, "task");
    assert_eq!(b.assignee, None);
    assert_eq!((b.created_at, b.updated_at), (100, 100));
}

#[test]
fn status_and_dep_kind_serde_tags() {
    assert_eq!(
        serde_json::to_string(&BeadStatus::InProgress).unwrap(),
        "\"in_progress\""
    );
    assert_eq!(
        serde_json::to_string(&DepKind::ParentChild).unwrap(),
        "\"parent-child\""
    );
    assert_eq!(BeadStatus::parse("closed"), Some(BeadStatus::Closed));
    assert_eq!(BeadStatus::parse("done"), None);
}
