// SPDX-License-Identifier: MIT

//! Per-file read rendering and write dispatch for the namespace.

use anvil_adapters::{Mux, ProcInspector};
use anvil_core::{BeadId, Error, ErrorKind, Message, SessionState, USER};
use anvil_engine::AuditTail;
use anvil_ninep::FsError;
use anvil_storage::{BeadFilter, StoreError};
use tracing::info;

use super::ctl::{self, BeadCmd, RootCmd, SessionCmd, UserCmd};
use super::{AgentFs, BeadField, Node, SessFile};

/// Whether a node accepts writes at all.
pub(super) fn writable(node: &Node) -> bool {
    match node {
        Node::Ctl | Node::UserCtl | Node::UserMail | Node::BeadsCtl => true,
        Node::SessionFile { kind, .. } => kind.writable(),
        Node::BeadFile { field, .. } => field.writable(),
        _ => false,
    }
}

/// Render a scalar file's current value.
pub(super) fn read_value<M: Mux, P: ProcInspector>(
    fs: &AgentFs<M, P>,
    node: &Node,
) -> Result<Vec<u8>, Error> {
    let value = match node {
        // Write-only files read as empty
        Node::Ctl | Node::UserCtl | Node::UserMail | Node::BeadsCtl => String::new(),
        Node::Events | Node::Log => String::new(),

        Node::List => {
            let mut out = String::new();
            for info in fs.manager.list() {
                let alias = info.alias.as_deref().unwrap_or("-");
                out.push_str(&format!(
                    "{} {} {} {} {}\n",
                    info.id,
                    alias,
                    info.state,
                    info.pid,
                    info.cwd.display()
                ));
            }
            out
        }

        Node::MsgFile { owner, id, .. } => {
            let msg = fs
                .manager
                .mailbox()
                .find(owner, id)
                .ok_or_else(|| Error::new(ErrorKind::NotFound))?;
            let mut json = serde_json::to_string_pretty(&msg)
                .map_err(|e| Error::with(ErrorKind::BadRequest, e.to_string()))?;
            json.push('\n');
            json
        }

        Node::BeadsList => {
            let store = fs.store.lock();
            let beads = store.list(BeadFilter::All);
            let mut json = serde_json::to_string(&beads)
                .map_err(|e| Error::with(ErrorKind::BadRequest, e.to_string()))?;
            json.push('\n');
            json
        }

        Node::BeadsReady => {
            let store = fs.store.lock();
            let beads = store.ready(None);
            let mut json = serde_json::to_string(&beads)
                .map_err(|e| Error::with(ErrorKind::BadRequest, e.to_string()))?;
            json.push('\n');
            json
        }

        Node::BeadFile { id, field } => {
            let store = fs.store.lock();
            let bead = store.get(&BeadId::new(id.clone())).map_err(store_error)?;
            match field {
                BeadField::Status => format!("{}\n", bead.status.as_str()),
                BeadField::Title => format!("{}\n", bead.title),
                BeadField::Description => format!("{}\n", bead.description),
                BeadField::Assignee => format!("{}\n", bead.assignee.as_deref().unwrap_or("-")),
                BeadField::Role => format!("{}\n", bead.role.as_deref().unwrap_or("-")),
                BeadField::Json => {
                    let mut json = serde_json::to_string_pretty(bead)
                        .map_err(|e| Error::with(ErrorKind::BadRequest, e.to_string()))?;
                    json.push('\n');
                    json
                }
            }
        }

        Node::SessionFile { id, kind } => {
            let session = fs.manager.require(id)?;
            match kind {
                SessFile::State => format!("{}\n", session.state()),
                SessFile::Context => format!("{}\n", session.context()),
                SessFile::Alias => format!("{}\n", session.alias().unwrap_or_default()),
                SessFile::Pid => format!("{}\n", session.pid()),
                SessFile::Cwd => format!("{}\n", session.cwd().display()),
                SessFile::Backend => format!("{}\n", session.backend()),
                SessFile::Role => format!("{}\n", session.role().unwrap_or("-")),
                SessFile::Tasks => format!("{}\n", session.tasks().join(" ")),
                SessFile::Tmux => format!("{}\n", session.target()),
                SessFile::Ctl | SessFile::In | SessFile::Mail => String::new(),
            }
        }

        _ => return Err(Error::with(ErrorKind::BadRequest, "not a readable file")),
    };
    Ok(value.into_bytes())
}

/// Serve the next batch from the event stream; blocks until data exists.
pub(super) async fn read_event_stream(
    sub: &mut anvil_engine::Subscription,
    pending: &mut Vec<u8>,
    count: u32,
) -> Result<Vec<u8>, FsError> {
    if pending.is_empty() {
        // Block for the first event, then batch whatever else is buffered
        let Some(event) = sub.recv().await else {
            return Ok(Vec::new()); // subscription cancelled: EOF
        };
        append_json_line(pending, &event)?;
        while pending.len() < count as usize {
            match sub.try_recv() {
                Some(event) => append_json_line(pending, &event)?,
                None => break,
            }
        }
    }
    Ok(drain_up_to(pending, count))
}

/// Serve the next batch from the audit-log tail; backlog first, then live.
pub(super) async fn read_log_stream(
    tail: &mut AuditTail,
    pending: &mut Vec<u8>,
    count: u32,
) -> Result<Vec<u8>, FsError> {
    if pending.is_empty() {
        if tail.backlog.is_empty() {
            let Some(line) = tail.rx.recv().await else {
                return Ok(Vec::new());
            };
            pending.extend_from_slice(line.as_bytes());
            pending.push(b'\n');
        } else {
            for line in tail.backlog.drain(..) {
                pending.extend_from_slice(line.as_bytes());
                pending.push(b'\n');
            }
        }
        while pending.len() < count as usize {
            match tail.rx.try_recv() {
                Ok(line) => {
                    pending.extend_from_slice(line.as_bytes());
                    pending.push(b'\n');
                }
                Err(_) => break,
            }
        }
    }
    Ok(drain_up_to(pending, count))
}

fn append_json_line(pending: &mut Vec<u8>, event: &anvil_core::Event) -> Result<(), FsError> {
    let json =
        serde_json::to_vec(event).map_err(|e| FsError::new(format!("encode: {e}")))?;
    pending.extend_from_slice(&json);
    pending.push(b'\n');
    Ok(())
}

fn drain_up_to(pending: &mut Vec<u8>, count: u32) -> Vec<u8> {
    let take = (count as usize).min(pending.len());
    pending.drain(..take).collect()
}

/// Dispatch one write.
pub(super) async fn write_node<M: Mux, P: ProcInspector>(
    fs: &AgentFs<M, P>,
    node: &Node,
    data: &[u8],
) -> Result<(), Error> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::with(ErrorKind::BadRequest, "write is not utf-8"))?;

    match node {
        Node::Ctl => {
            let RootCmd::New {
                backend,
                cwd,
                role,
                tasks,
            } = ctl::parse_root(text)?;
            let id = fs.manager.new_session(&backend, &cwd, role, tasks).await?;
            info!(%id, "session created via ctl");
            Ok(())
        }

        Node::UserCtl => {
            let UserCmd::Complete { msg_id } = ctl::parse_user(text)?;
            fs.manager.mailbox().complete(USER, &msg_id)?;
            Ok(())
        }

        Node::UserMail => write_mail(fs, USER, text),

        Node::BeadsCtl => write_bead_ctl(fs, text),

        Node::BeadFile { id, field } => {
            let mut store = fs.store.lock();
            store
                .update(&BeadId::new(id.clone()), field.store_field(), text.trim())
                .map_err(store_error)
        }

        Node::SessionFile { id, kind } => {
            let session = fs.manager.require(id)?;
            match kind {
                SessFile::Ctl => match ctl::parse_session(text)? {
                    SessionCmd::Stop => session.stop().await,
                    SessionCmd::Restart => session.restart().await,
                    SessionCmd::Kill => fs.manager.kill(id).await,
                    SessionCmd::Refresh => session.refresh().await,
                    SessionCmd::Attach => {
                        // Validation only: the client attaches with the
                        // multiplexer directly using the `tmux` file
                        Ok(())
                    }
                },
                SessFile::State => {
                    let state = SessionState::parse(text).ok_or_else(|| {
                        Error::with(ErrorKind::BadRequest, format!("bad state {}", text.trim()))
                    })?;
                    if state == SessionState::Exited {
                        // Closing through the state file is the same as kill:
                        // the directory disappears with its session
                        return fs.manager.kill(id).await;
                    }
                    session.write_state(state).await
                }
                SessFile::Context => {
                    session.set_context(text.trim().to_string());
                    Ok(())
                }
                SessFile::Alias => {
                    let alias = text.trim();
                    let alias = (!alias.is_empty()).then(|| alias.to_string());
                    fs.manager.set_alias(id, alias)
                }
                SessFile::In => {
                    let prompt = text.trim_end_matches('\n').to_string();
                    if prompt.is_empty() {
                        return Err(Error::with(ErrorKind::BadRequest, "empty prompt"));
                    }
                    session.submit(prompt, fs.send_deadline)
                }
                SessFile::Mail => write_mail(fs, id, text),
                _ => Err(Error::with(ErrorKind::BadRequest, "read-only file")),
            }
        }

        _ => Err(Error::with(ErrorKind::BadRequest, "not writable")),
    }
}

/// Parse and enqueue one mail message written to a `mail` file.
fn write_mail<M: Mux, P: ProcInspector>(
    fs: &AgentFs<M, P>,
    sender: &str,
    text: &str,
) -> Result<(), Error> {
    let mut msg: Message = serde_json::from_str(text)
        .map_err(|e| Error::with(ErrorKind::BadRequest, format!("bad message json: {e}")))?;
    if msg.from.is_empty() {
        msg.from = sender.to_string();
    }
    if msg.to.is_empty() {
        return Err(Error::new(ErrorKind::MissingRecipient));
    }
    let now = fs.clock.unix_secs();
    fs.manager.mailbox().put_outbox(sender, msg, now);
    Ok(())
}

fn write_bead_ctl<M: Mux, P: ProcInspector>(fs: &AgentFs<M, P>, text: &str) -> Result<(), Error> {
    let mut store = fs.store.lock();
    match ctl::parse_beads(text)? {
        BeadCmd::Init { prefix } => store
            .init(prefix.as_deref().unwrap_or("an"))
            .map_err(store_error),
        BeadCmd::New {
            title,
            description,
            parent,
        } => {
            match parent {
                Some(parent) => store
                    .create_subtask(&BeadId::new(parent), &title, &description, USER)
                    .map(|_| ()),
                None => store.create(&title, &description, USER).map(|_| ()),
            }
            .map_err(store_error)
        }
        BeadCmd::Claim { id, actor } => store
            .claim(&BeadId::new(id), actor.as_deref().unwrap_or(USER))
            .map_err(store_error),
        BeadCmd::Complete { id } => store.complete(&BeadId::new(id), USER).map_err(store_error),
        BeadCmd::Fail { id, reason } => {
            store.fail(&BeadId::new(id), &reason, USER).map_err(store_error)
        }
        BeadCmd::Dep { child, parent } => store
            .add_dep(&BeadId::new(child), &BeadId::new(parent))
            .map_err(store_error),
        BeadCmd::Undep { child, parent } => store
            .remove_dep(&BeadId::new(child), &BeadId::new(parent))
            .map_err(store_error),
        BeadCmd::Update { id, field, value } => store
            .update(&BeadId::new(id), &field, &value)
            .map_err(store_error),
        BeadCmd::Delete { id } => store.delete(&BeadId::new(id)).map_err(store_error),
    }
}

fn store_error(e: StoreError) -> Error {
    match e {
        StoreError::NotFound(id) => Error::with(ErrorKind::NotFound, id.to_string()),
        StoreError::InvalidField(f) => Error::with(ErrorKind::BadRequest, f),
        StoreError::Cycle(a, b) => {
            Error::with(ErrorKind::BadRequest, format!("cycle {a} -> {b}"))
        }
        StoreError::Wal(e) => Error::with(ErrorKind::BadRequest, e.to_string()),
        StoreError::Snapshot(e) => Error::with(ErrorKind::BadRequest, e.to_string()),
    }
}
