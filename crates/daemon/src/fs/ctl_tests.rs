// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[test]
fn tokenize_splits_on_whitespace() {
    assert_eq!(
        tokenize("new fake /tmp/x").unwrap(),
        vec!["new", "fake", "/tmp/x"]
    );
}

#[test]
fn tokenize_preserves_quoted_spaces() {
    assert_eq!(
        tokenize("new 'fix the build' 'see CI run 41'").unwrap(),
        vec!["new", "fix the build", "see CI run 41"]
    );
}

#[test]
fn tokenize_handles_doubled_quote_escape() {
    assert_eq!(tokenize("fail an-1 'it''s broken'").unwrap(), vec![
        "fail",
        "an-1",
        "it's broken"
    ]);
}

#[test]
fn tokenize_keeps_empty_quoted_tokens() {
    assert_eq!(tokenize("new 'title' ''").unwrap(), vec!["new", "title", ""]);
}

#[test]
fn tokenize_rejects_unterminated_quote() {
    assert!(tokenize("new 'dangling").is_err());
}

#[test]
fn root_new_with_role_and_tasks() {
    let cmd = parse_root("new claude /work/app role=reviewer task=deploy task=docs").unwrap();
    assert_eq!(
        cmd,
        RootCmd::New {
            backend: "claude".to_string(),
            cwd: "/work/app".to_string(),
            role: Some("reviewer".to_string()),
            tasks: vec!["deploy".to_string(), "docs".to_string()],
        }
    );
}

#[test]
fn root_new_minimal() {
    let cmd = parse_root("new fake /tmp/x\n").unwrap();
    assert_eq!(
        cmd,
        RootCmd::New {
            backend: "fake".to_string(),
            cwd: "/tmp/x".to_string(),
            role: None,
            tasks: vec![],
        }
    );
}

#[parameterized(
    missing_cwd = { "new fake" },
    stray_arg = { "new fake /tmp bogus" },
    unknown = { "launch fake /tmp" },
    empty = { "" },
)]
fn root_rejects(line: &str) {
    assert!(parse_root(line).is_err(), "{line}");
}

#[parameterized(
    stop = { "stop", SessionCmd::Stop },
    restart = { "restart", SessionCmd::Restart },
    kill = { "kill", SessionCmd::Kill },
    refresh = { "refresh", SessionCmd::Refresh },
    attach = { "attach", SessionCmd::Attach },
)]
fn session_commands(line: &str, want: SessionCmd) {
    assert_eq!(parse_session(line).unwrap(), want);
}

#[test]
fn session_rejects_arguments_and_unknowns() {
    assert!(parse_session("stop now").is_err());
    assert!(parse_session("pause").is_err());
}

#[test]
fn beads_new_variants() {
    assert_eq!(
        parse_beads("new 'A'").unwrap(),
        BeadCmd::New {
            title: "A".to_string(),
            description: String::new(),
            parent: None,
        }
    );
    assert_eq!(
        parse_beads("new 'A' 'root task'").unwrap(),
        BeadCmd::New {
            title: "A".to_string(),
            description: "root task".to_string(),
            parent: None,
        }
    );
    assert_eq!(
        parse_beads("new 'B' 'child' an-1").unwrap(),
        BeadCmd::New {
            title: "B".to_string(),
            description: "child".to_string(),
            parent: Some("an-1".to_string()),
        }
    );
}

#[test]
fn beads_lifecycle_commands() {
    assert_eq!(parse_beads("init").unwrap(), BeadCmd::Init { prefix: None });
    assert_eq!(
        parse_beads("init web").unwrap(),
        BeadCmd::Init {
            prefix: Some("web".to_string())
        }
    );
    assert_eq!(
        parse_beads("claim an-1 s2").unwrap(),
        BeadCmd::Claim {
            id: "an-1".to_string(),
            actor: Some("s2".to_string())
        }
    );
    assert_eq!(
        parse_beads("fail an-1 'flaky environment'").unwrap(),
        BeadCmd::Fail {
            id: "an-1".to_string(),
            reason: "flaky environment".to_string()
        }
    );
    assert_eq!(
        parse_beads("dep an-2 an-1").unwrap(),
        BeadCmd::Dep {
            child: "an-2".to_string(),
            parent: "an-1".to_string()
        }
    );
    assert_eq!(
        parse_beads("update an-1 role reviewer").unwrap(),
        BeadCmd::Update {
            id: "an-1".to_string(),
            field: "role".to_string(),
            value: "reviewer".to_string()
        }
    );
    assert_eq!(
        parse_beads("delete an-1").unwrap(),
        BeadCmd::Delete {
            id: "an-1".to_string()
        }
    );
}

#[parameterized(
    fail_without_reason = { "fail an-1" },
    unknown = { "promote an-1" },
    too_many = { "complete an-1 an-2" },
)]
fn beads_rejects(line: &str) {
    assert!(parse_beads(line).is_err(), "{line}");
}

#[test]
fn user_complete_strips_json_suffix() {
    assert_eq!(
        parse_user("complete m-17.json").unwrap(),
        UserCmd::Complete {
            msg_id: "m-17".to_string()
        }
    );
    assert_eq!(
        parse_user("complete m-17").unwrap(),
        UserCmd::Complete {
            msg_id: "m-17".to_string()
        }
    );
    assert!(parse_user("complete").is_err());
    assert!(parse_user("finish m-17").is_err());
}
