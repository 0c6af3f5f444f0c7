// SPDX-License-Identifier: MIT

//! Centralized environment variable access for timing knobs.
//!
//! The completion-detection cadence and quiescence window are tunable so
//! tests and slow machines can stretch or shrink them.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Completion/idleness poll cadence (default: 100ms).
pub fn poll_interval() -> Duration {
    parse_duration_ms("ANVIL_POLL_MS").unwrap_or(Duration::from_millis(100))
}

/// Output quiescence window for ready/completion detection (default: 300ms).
pub fn quiesce_window() -> Duration {
    parse_duration_ms("ANVIL_QUIESCE_MS").unwrap_or(Duration::from_millis(300))
}

/// Startup ready timeout (default: 30s).
pub fn ready_timeout() -> Duration {
    parse_duration_ms("ANVIL_READY_TIMEOUT_MS").unwrap_or(Duration::from_secs(30))
}

/// Delay between injecting prompt text and the submit chord (default: 200ms).
pub fn send_settle() -> Duration {
    parse_duration_ms("ANVIL_SETTLE_MS").unwrap_or(Duration::from_millis(200))
}

/// Mailbox pump period (default: 5s).
pub fn pump_period() -> Duration {
    parse_duration_ms("ANVIL_PUMP_MS").unwrap_or(Duration::from_secs(5))
}

/// Idle duration before an agent with pending mail is nudged (default: 15s).
pub fn nudge_after() -> Duration {
    parse_duration_ms("ANVIL_NUDGE_MS").unwrap_or(Duration::from_secs(15))
}
