// SPDX-License-Identifier: MIT

//! Control-file command grammar.
//!
//! One command per write. Tokens are whitespace-separated; single-quoted
//! strings preserve spaces (`new 'fix tests' 'see CI run 41'`). A doubled
//! quote inside a quoted string escapes it.

use anvil_core::{Error, ErrorKind};

/// Split a control line into tokens, honoring single quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>, Error> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut had_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quotes => {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    current.push('\'');
                } else {
                    in_quotes = false;
                }
            }
            '\'' => {
                in_quotes = true;
                had_quotes = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || had_quotes {
                    tokens.push(std::mem::take(&mut current));
                    had_quotes = false;
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(Error::with(ErrorKind::BadRequest, "unterminated quote"));
    }
    if !current.is_empty() || had_quotes {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Root `ctl`: `new <backend> <absolute-cwd> [role=<r>] [task=<t>]*`
#[derive(Debug, Clone, PartialEq)]
pub enum RootCmd {
    New {
        backend: String,
        cwd: String,
        role: Option<String>,
        tasks: Vec<String>,
    },
}

pub fn parse_root(line: &str) -> Result<RootCmd, Error> {
    let tokens = tokenize(line)?;
    let mut it = tokens.into_iter();
    match it.next().as_deref() {
        Some("new") => {
            let backend = it
                .next()
                .ok_or_else(|| bad("new: missing backend"))?;
            let cwd = it.next().ok_or_else(|| bad("new: missing cwd"))?;
            let mut role = None;
            let mut tasks = Vec::new();
            for arg in it {
                if let Some(r) = arg.strip_prefix("role=") {
                    role = Some(r.to_string());
                } else if let Some(t) = arg.strip_prefix("task=") {
                    tasks.push(t.to_string());
                } else {
                    return Err(bad(format!("new: unexpected argument {arg}")));
                }
            }
            Ok(RootCmd::New {
                backend,
                cwd,
                role,
                tasks,
            })
        }
        Some(other) => Err(bad(format!("unknown command {other}"))),
        None => Err(bad("empty command")),
    }
}

/// Session `ctl`: `stop | restart | kill | refresh | attach`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCmd {
    Stop,
    Restart,
    Kill,
    Refresh,
    Attach,
}

pub fn parse_session(line: &str) -> Result<SessionCmd, Error> {
    let tokens = tokenize(line)?;
    match tokens.as_slice() {
        [cmd] => match cmd.as_str() {
            "stop" => Ok(SessionCmd::Stop),
            "restart" => Ok(SessionCmd::Restart),
            "kill" => Ok(SessionCmd::Kill),
            "refresh" => Ok(SessionCmd::Refresh),
            "attach" => Ok(SessionCmd::Attach),
            other => Err(bad(format!("unknown command {other}"))),
        },
        _ => Err(bad("expected exactly one command")),
    }
}

/// Beads `ctl` commands.
#[derive(Debug, Clone, PartialEq)]
pub enum BeadCmd {
    Init { prefix: Option<String> },
    New {
        title: String,
        description: String,
        parent: Option<String>,
    },
    Claim { id: String, actor: Option<String> },
    Complete { id: String },
    Fail { id: String, reason: String },
    Dep { child: String, parent: String },
    Undep { child: String, parent: String },
    Update {
        id: String,
        field: String,
        value: String,
    },
    Delete { id: String },
}

pub fn parse_beads(line: &str) -> Result<BeadCmd, Error> {
    let tokens = tokenize(line)?;
    let mut it = tokens.into_iter();
    let cmd = it.next().ok_or_else(|| bad("empty command"))?;
    let rest: Vec<String> = it.collect();

    match (cmd.as_str(), rest.as_slice()) {
        ("init", []) => Ok(BeadCmd::Init { prefix: None }),
        ("init", [prefix]) => Ok(BeadCmd::Init {
            prefix: Some(prefix.clone()),
        }),
        ("new", [title]) => Ok(BeadCmd::New {
            title: title.clone(),
            description: String::new(),
            parent: None,
        }),
        ("new", [title, desc]) => Ok(BeadCmd::New {
            title: title.clone(),
            description: desc.clone(),
            parent: None,
        }),
        ("new", [title, desc, parent]) => Ok(BeadCmd::New {
            title: title.clone(),
            description: desc.clone(),
            parent: Some(parent.clone()),
        }),
        ("claim", [id]) => Ok(BeadCmd::Claim {
            id: id.clone(),
            actor: None,
        }),
        ("claim", [id, actor]) => Ok(BeadCmd::Claim {
            id: id.clone(),
            actor: Some(actor.clone()),
        }),
        ("complete", [id]) => Ok(BeadCmd::Complete { id: id.clone() }),
        ("fail", [id, reason]) => Ok(BeadCmd::Fail {
            id: id.clone(),
            reason: reason.clone(),
        }),
        ("dep", [child, parent]) => Ok(BeadCmd::Dep {
            child: child.clone(),
            parent: parent.clone(),
        }),
        ("undep", [child, parent]) => Ok(BeadCmd::Undep {
            child: child.clone(),
            parent: parent.clone(),
        }),
        ("update", [id, field, value]) => Ok(BeadCmd::Update {
            id: id.clone(),
            field: field.clone(),
            value: value.clone(),
        }),
        ("delete", [id]) => Ok(BeadCmd::Delete { id: id.clone() }),
        (other, _) if !matches!(
            other,
            "init" | "new" | "claim" | "complete" | "fail" | "dep" | "undep" | "update" | "delete"
        ) =>
        {
            Err(bad(format!("unknown command {other}")))
        }
        (cmd, args) => Err(bad(format!("{cmd}: wrong arguments ({})", args.len()))),
    }
}

/// User `ctl`: `complete <msg-filename-or-id>`
#[derive(Debug, Clone, PartialEq)]
pub enum UserCmd {
    Complete { msg_id: String },
}

pub fn parse_user(line: &str) -> Result<UserCmd, Error> {
    let tokens = tokenize(line)?;
    match tokens.as_slice() {
        [cmd, arg] if cmd == "complete" => {
            let msg_id = arg.strip_suffix(".json").unwrap_or(arg).to_string();
            Ok(UserCmd::Complete { msg_id })
        }
        [cmd, ..] if cmd == "complete" => Err(bad("complete: missing message id")),
        [other, ..] => Err(bad(format!("unknown command {other}"))),
        [] => Err(bad("empty command")),
    }
}

fn bad(detail: impl Into<String>) -> Error {
    Error::with(ErrorKind::BadRequest, detail)
}

#[cfg(test)]
#[path = "ctl_tests.rs"]
mod tests;
