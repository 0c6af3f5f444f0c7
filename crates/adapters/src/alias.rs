// SPDX-License-Identifier: MIT

//! Window-name generation.
//!
//! tmux window names may not contain `:` or `.`; names are collapsed to a
//! safe alphabet and suffixed with 4 random hex chars so a restarted daemon
//! never collides with leftover windows.

use rand::Rng;

/// Generate a window name for a session: `<id>-<backend>-<hex4>`.
pub fn window_name(session_id: &str, backend: &str) -> String {
    window_name_with(session_id, backend, &mut rand::rng())
}

/// Deterministic variant for tests: the suffix comes from `rng`.
pub fn window_name_with<R: Rng>(session_id: &str, backend: &str, rng: &mut R) -> String {
    let id = sanitize(session_id, 12);
    let backend = sanitize(backend, 15);
    let suffix: String = (0..4).map(|_| format!("{:x}", rng.random::<u8>() % 16)).collect();
    format!("{id}-{backend}-{suffix}")
}

/// Collapse to `[a-z0-9-]`, squeeze repeated hyphens, truncate.
fn sanitize(s: &str, max_len: usize) -> String {
    let lowered: String = s
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '-',
        })
        .collect();

    let collapsed = lowered
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if collapsed.len() <= max_len {
        collapsed
    } else {
        collapsed[..max_len].trim_end_matches('-').to_string()
    }
}

#[cfg(test)]
#[path = "alias_tests.rs"]
mod tests;
