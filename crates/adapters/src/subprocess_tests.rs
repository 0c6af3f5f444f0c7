// SPDX-License-Identifier: MIT

use super::*;

#[tokio::test]
async fn returns_output_when_command_completes() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn times_out_on_slow_command() {
    let mut cmd = Command::new("sleep");
    cmd.arg("10");
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleep")
        .await
        .unwrap_err();
    assert!(err.contains("timed out"), "{err}");
}

#[tokio::test]
async fn reports_missing_binary() {
    let cmd = Command::new("definitely-not-a-binary-xyz");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing")
        .await
        .unwrap_err();
    assert!(err.contains("failed"), "{err}");
}

#[test]
fn shell_quote_passes_safe_strings_through() {
    assert_eq!(shell_quote("/usr/bin/claude"), "/usr/bin/claude");
    assert_eq!(shell_quote("a-b_c.1"), "a-b_c.1");
}

#[test]
fn shell_quote_wraps_and_escapes() {
    assert_eq!(shell_quote("two words"), "'two words'");
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
    assert_eq!(shell_quote(""), "''");
}
