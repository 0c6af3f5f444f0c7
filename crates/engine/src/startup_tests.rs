// SPDX-License-Identifier: MIT

use super::*;

const BYPASS_DIALOG: &str = "\
WARNING: Claude Code running in Bypass Permissions mode
 ❯ 1. No, exit
   2. Yes, I accept
";

const TRUST_DIALOG: &str = "\
Do you trust the files in this folder?
 ❯ 1. Yes, proceed
   2. No, exit
";

#[test]
fn noop_handler_is_immediately_done() {
    let mut handler = NoopHandler;
    assert_eq!(handler.step(""), StartupStep::Done);
}

#[test]
fn claude_accepts_bypass_dialog_once() {
    let mut handler = ClaudeHandler::default();
    assert_eq!(
        handler.step(BYPASS_DIALOG),
        StartupStep::Keys(vec!["2".to_string()])
    );
    // The dialog text stays in the cumulative output; no second answer
    let next = handler.step(BYPASS_DIALOG);
    assert!(matches!(next, StartupStep::Wait | StartupStep::Done), "{next:?}");
}

#[test]
fn claude_accepts_trust_dialog() {
    let mut handler = ClaudeHandler::default();
    assert_eq!(
        handler.step(TRUST_DIALOG),
        StartupStep::Keys(vec!["1".to_string()])
    );
}

#[test]
fn claude_handles_both_dialogs_in_sequence() {
    let mut handler = ClaudeHandler::default();
    assert_eq!(
        handler.step(BYPASS_DIALOG),
        StartupStep::Keys(vec!["2".to_string()])
    );
    let both = format!("{BYPASS_DIALOG}\n{TRUST_DIALOG}");
    assert_eq!(
        handler.step(&both),
        StartupStep::Keys(vec!["1".to_string()])
    );
}

#[test]
fn claude_fails_on_login_prompt() {
    let mut handler = ClaudeHandler::default();
    let step = handler.step("Select login method:\n 1. Claude account\n");
    assert!(matches!(step, StartupStep::Fail(_)), "{step:?}");

    let mut handler = ClaudeHandler::default();
    let step = handler.step("Choose the text style that looks best\n");
    assert!(matches!(step, StartupStep::Fail(_)));
}

#[test]
fn claude_waits_then_concludes_no_dialog() {
    let mut handler = ClaudeHandler::default();
    let banner = "claude 1.2.3 ready\n> ";
    let mut waits = 0;
    loop {
        match handler.step(banner) {
            StartupStep::Wait => waits += 1,
            StartupStep::Done => break,
            other => panic!("unexpected {other:?}"),
        }
        assert!(waits < 100, "never concluded");
    }
    assert!(waits >= 1, "should wait at least one poll for the TUI");
}

#[test]
fn handler_kind_deserializes_from_registry_strings() {
    #[derive(serde::Deserialize)]
    struct Probe {
        handler: StartupHandlerKind,
    }
    let probe: Probe = toml::from_str("handler = \"claude\"").unwrap();
    assert_eq!(probe.handler, StartupHandlerKind::Claude);
    let probe: Probe = toml::from_str("handler = \"none\"").unwrap();
    assert_eq!(probe.handler, StartupHandlerKind::None);
}
