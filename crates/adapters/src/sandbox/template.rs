// SPDX-License-Identifier: MIT

//! `{TOKEN}` expansion in sandbox path templates.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unresolved template variable {{{0}}}")]
    Unresolved(String),
    #[error("unterminated template token")]
    Unterminated,
}

/// Values templates resolve against. `env` is the session's captured
/// environment, so `{VAR}` sees exactly what the backend will see.
#[derive(Debug, Clone, Default)]
pub struct TemplateCtx {
    pub cwd: PathBuf,
    pub home: PathBuf,
    pub env: HashMap<String, String>,
}

impl TemplateCtx {
    fn resolve(&self, token: &str) -> Option<String> {
        match token {
            "CWD" => Some(self.cwd.display().to_string()),
            "HOME" => Some(self.home.display().to_string()),
            "TMPDIR" => Some(
                self.env
                    .get("TMPDIR")
                    .cloned()
                    .unwrap_or_else(|| "/tmp".to_string()),
            ),
            other => self.env.get(other).cloned(),
        }
    }
}

/// Expand every `{NAME}` in `input`. Unknown variables are an error so a
/// typo cannot silently grant or drop a path.
pub fn expand(input: &str, ctx: &TemplateCtx) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(TemplateError::Unterminated);
        };
        let token = &after[..end];
        match ctx.resolve(token) {
            Some(value) => out.push_str(&value),
            None => return Err(TemplateError::Unresolved(token.to_string())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
