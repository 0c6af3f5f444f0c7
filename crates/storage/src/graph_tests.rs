// SPDX-License-Identifier: MIT

use super::*;
use anvil_core::Bead;

fn create(graph: &mut BeadGraph, id: &str, title: &str) -> BeadId {
    let bead_id = BeadId::new(id);
    graph.apply(&BeadEvent::Create {
        bead: Bead::new(bead_id.clone(), title, "", 1),
    });
    bead_id
}

fn block(graph: &mut BeadGraph, issue: &BeadId, on: &BeadId) {
    graph.apply(&BeadEvent::AddDep {
        dep: BeadDep {
            issue: issue.clone(),
            depends_on: on.clone(),
            kind: DepKind::Blocks,
        },
    });
}

#[test]
fn root_counter_tracks_created_ids() {
    let mut graph = BeadGraph::default();
    assert_eq!(graph.next_root_id(), "an-1");
    create(&mut graph, "an-1", "first");
    assert_eq!(graph.next_root_id(), "an-2");
    create(&mut graph, "an-2", "second");
    assert_eq!(graph.next_root_id(), "an-3");
}

#[test]
fn init_changes_the_prefix() {
    let mut graph = BeadGraph::default();
    graph.apply(&BeadEvent::Init {
        prefix: "web".to_string(),
    });
    assert_eq!(graph.next_root_id(), "web-1");
}

#[test]
fn child_counters_are_monotonic_and_never_reused() {
    let mut graph = BeadGraph::default();
    let parent = create(&mut graph, "an-1", "parent");
    assert_eq!(graph.next_child_id(&parent), "an-1.1");
    create(&mut graph, "an-1.1", "child");
    assert_eq!(graph.next_child_id(&parent), "an-1.2");
    create(&mut graph, "an-1.2", "child2");

    // Deleting the highest child must not roll the counter back
    graph.apply(&BeadEvent::Delete {
        id: BeadId::new("an-1.2"),
    });
    assert_eq!(graph.next_child_id(&parent), "an-1.3");
}

#[test]
fn ready_requires_all_predecessors_closed() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "a");
    let b = create(&mut graph, "an-2", "b");
    block(&mut graph, &b, &a); // b blocked on a

    let ready: Vec<_> = graph.ready(None).iter().map(|x| x.id.clone()).collect();
    assert_eq!(ready, vec![a.clone()]);

    graph.apply(&BeadEvent::Complete {
        id: a.clone(),
        actor: "user".to_string(),
        ts: 2,
    });
    let ready: Vec<_> = graph.ready(None).iter().map(|x| x.id.clone()).collect();
    assert_eq!(ready, vec![b]);
}

#[test]
fn parent_child_edges_gate_the_parent() {
    let mut graph = BeadGraph::default();
    let parent = create(&mut graph, "an-1", "parent");
    let child = create(&mut graph, "an-1.1", "child");
    graph.apply(&BeadEvent::AddDep {
        dep: BeadDep {
            issue: parent.clone(),
            depends_on: child.clone(),
            kind: DepKind::ParentChild,
        },
    });

    let ready: Vec<_> = graph.ready(None).iter().map(|x| x.id.clone()).collect();
    assert_eq!(ready, vec![child.clone()]);

    graph.apply(&BeadEvent::Complete {
        id: child,
        actor: "s1".to_string(),
        ts: 3,
    });
    let ready: Vec<_> = graph.ready(None).iter().map(|x| x.id.clone()).collect();
    assert_eq!(ready, vec![parent]);
}

#[test]
fn in_progress_beads_are_not_ready() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "a");
    graph.apply(&BeadEvent::Claim {
        id: a,
        actor: "s1".to_string(),
        ts: 2,
    });
    assert!(graph.ready(None).is_empty());
}

#[test]
fn ready_honors_the_role_filter() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "any-role");
    let b = create(&mut graph, "an-2", "review-only");
    graph.apply(&BeadEvent::Update {
        id: b.clone(),
        field: "role".to_string(),
        value: "reviewer".to_string(),
        ts: 2,
    });

    let all: Vec<_> = graph.ready(None).iter().map(|x| x.id.clone()).collect();
    assert_eq!(all, vec![a.clone(), b.clone()]);

    let coder: Vec<_> = graph.ready(Some("coder")).iter().map(|x| x.id.clone()).collect();
    assert_eq!(coder, vec![a.clone()]);

    let reviewer: Vec<_> = graph
        .ready(Some("reviewer"))
        .iter()
        .map(|x| x.id.clone())
        .collect();
    assert_eq!(reviewer, vec![a, b]);
}

#[test]
fn blockers_lists_only_open_predecessors() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "a");
    let b = create(&mut graph, "an-2", "b");
    let c = create(&mut graph, "an-3", "c");
    block(&mut graph, &c, &a);
    block(&mut graph, &c, &b);
    graph.apply(&BeadEvent::Complete {
        id: a,
        actor: "u".to_string(),
        ts: 2,
    });
    assert_eq!(graph.blockers(&c), vec![b]);
}

#[test]
fn fail_closes_with_a_reason_tag() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "a");
    graph.apply(&BeadEvent::Fail {
        id: a.clone(),
        reason: "broken env".to_string(),
        actor: "s1".to_string(),
        ts: 9,
    });
    let bead = graph.get(&a).unwrap();
    assert_eq!(bead.status, BeadStatus::Closed);
    assert_eq!(bead.issue_type, "failed:broken env");
    assert_eq!(bead.updated_at, 9);
}

#[test]
fn delete_removes_bead_and_touching_edges() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "a");
    let b = create(&mut graph, "an-2", "b");
    block(&mut graph, &b, &a);
    graph.apply(&BeadEvent::Delete { id: a });
    assert!(graph.deps.is_empty());
    let ready: Vec<_> = graph.ready(None).iter().map(|x| x.id.clone()).collect();
    assert_eq!(ready, vec![b]);
}

#[test]
fn subtree_follows_parent_child_edges_only() {
    let mut graph = BeadGraph::default();
    let root = create(&mut graph, "an-1", "root");
    let child = create(&mut graph, "an-1.1", "child");
    let grandchild = create(&mut graph, "an-1.1.1", "grandchild");
    let unrelated = create(&mut graph, "an-2", "unrelated");
    for (issue, on) in [(&root, &child), (&child, &grandchild)] {
        graph.apply(&BeadEvent::AddDep {
            dep: BeadDep {
                issue: issue.clone(),
                depends_on: on.clone(),
                kind: DepKind::ParentChild,
            },
        });
    }
    block(&mut graph, &root, &unrelated);

    let mut ids: Vec<_> = graph.subtree(&root).iter().map(|b| b.id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec![root, child, grandchild]);
}

#[test]
fn duplicate_edges_collapse() {
    let mut graph = BeadGraph::default();
    let a = create(&mut graph, "an-1", "a");
    let b = create(&mut graph, "an-2", "b");
    block(&mut graph, &b, &a);
    block(&mut graph, &b, &a);
    assert_eq!(graph.deps.len(), 1);
}
