// SPDX-License-Identifier: MIT

use super::*;
use anvil_core::{Bead, BeadId};

#[test]
fn events_round_trip_through_json() {
    let events = vec![
        BeadEvent::Init {
            prefix: "an".to_string(),
        },
        BeadEvent::Create {
            bead: Bead::new(BeadId::new("an-1"), "t", "d", 10),
        },
        BeadEvent::Claim {
            id: BeadId::new("an-1"),
            actor: "s1".to_string(),
            ts: 11,
        },
        BeadEvent::Fail {
            id: BeadId::new("an-1"),
            reason: "flaky".to_string(),
            actor: "s1".to_string(),
            ts: 12,
        },
        BeadEvent::Delete {
            id: BeadId::new("an-1"),
        },
    ];
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let back: BeadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn op_tag_is_snake_case() {
    let json = serde_json::to_value(BeadEvent::RemoveDep {
        issue: BeadId::new("an-2"),
        depends_on: BeadId::new("an-1"),
    })
    .unwrap();
    assert_eq!(json["op"], "remove_dep");
}
