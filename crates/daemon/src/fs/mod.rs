// SPDX-License-Identifier: MIT

//! The synthetic 9P namespace.
//!
//! Every daemon operation is a read or write somewhere under:
//!
//! ```text
//! /
//! ├── ctl  list  events  log
//! ├── user/            mail ctl inbox/ completed/
//! ├── beads/           ctl list ready <bead-id>/...
//! └── <session-id>/    ctl state context alias pid cwd backend role
//!                      tasks tmux in mail inbox/ completed/
//! ```
//!
//! Directory listings snapshot at open; scalar files render their current
//! value on every read; `events` and `log` block until data arrives.

pub mod ctl;
mod handlers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anvil_adapters::{Mux, ProcInspector};
use anvil_core::{Clock, Error, ErrorKind};
use anvil_engine::{AuditTail, SessionManager, Subscription};
use anvil_ninep::{codec, FsError, Filesystem, OpenMode, Qid, Stat};
use anvil_storage::BeadStore;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Default deadline for prompt sends initiated through `in` writes.
const SEND_DEADLINE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MailQueue {
    Inbox,
    Completed,
}

impl MailQueue {
    fn dir_name(&self) -> &'static str {
        match self {
            MailQueue::Inbox => "inbox",
            MailQueue::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessFile {
    Ctl,
    State,
    Context,
    Alias,
    Pid,
    Cwd,
    Backend,
    Role,
    Tasks,
    Tmux,
    In,
    Mail,
}

impl SessFile {
    fn name(&self) -> &'static str {
        match self {
            SessFile::Ctl => "ctl",
            SessFile::State => "state",
            SessFile::Context => "context",
            SessFile::Alias => "alias",
            SessFile::Pid => "pid",
            SessFile::Cwd => "cwd",
            SessFile::Backend => "backend",
            SessFile::Role => "role",
            SessFile::Tasks => "tasks",
            SessFile::Tmux => "tmux",
            SessFile::In => "in",
            SessFile::Mail => "mail",
        }
    }

    const ALL: &'static [SessFile] = &[
        SessFile::Ctl,
        SessFile::State,
        SessFile::Context,
        SessFile::Alias,
        SessFile::Pid,
        SessFile::Cwd,
        SessFile::Backend,
        SessFile::Role,
        SessFile::Tasks,
        SessFile::Tmux,
        SessFile::In,
        SessFile::Mail,
    ];

    fn from_name(name: &str) -> Option<SessFile> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    fn writable(&self) -> bool {
        matches!(
            self,
            SessFile::Ctl
                | SessFile::State
                | SessFile::Context
                | SessFile::Alias
                | SessFile::In
                | SessFile::Mail
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeadField {
    Status,
    Title,
    Description,
    Assignee,
    Role,
    Json,
}

impl BeadField {
    fn name(&self) -> &'static str {
        match self {
            BeadField::Status => "status",
            BeadField::Title => "title",
            BeadField::Description => "description",
            BeadField::Assignee => "assignee",
            BeadField::Role => "role",
            BeadField::Json => "json",
        }
    }

    const ALL: &'static [BeadField] = &[
        BeadField::Status,
        BeadField::Title,
        BeadField::Description,
        BeadField::Assignee,
        BeadField::Role,
        BeadField::Json,
    ];

    fn from_name(name: &str) -> Option<BeadField> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// The `json` view is read-only; the scalar fields accept updates.
    fn writable(&self) -> bool {
        !matches!(self, BeadField::Json)
    }

    /// Field name as the bead store knows it.
    fn store_field(&self) -> &'static str {
        self.name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Root,
    Ctl,
    List,
    Events,
    Log,
    UserDir,
    UserMail,
    UserCtl,
    /// `inbox/` or `completed/` for `user` or a session id
    MailDir {
        owner: String,
        queue: MailQueue,
    },
    MsgFile {
        owner: String,
        queue: MailQueue,
        id: String,
    },
    BeadsDir,
    BeadsCtl,
    BeadsList,
    BeadsReady,
    BeadDir(String),
    BeadFile {
        id: String,
        field: BeadField,
    },
    SessionDir(String),
    SessionFile {
        id: String,
        kind: SessFile,
    },
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(
            self,
            Node::Root
                | Node::UserDir
                | Node::MailDir { .. }
                | Node::BeadsDir
                | Node::BeadDir(_)
                | Node::SessionDir(_)
        )
    }

    /// Leaf name, as it appears in its parent directory.
    fn file_name(&self) -> String {
        match self {
            Node::Root => "/".to_string(),
            Node::Ctl | Node::UserCtl | Node::BeadsCtl => "ctl".to_string(),
            Node::List | Node::BeadsList => "list".to_string(),
            Node::Events => "events".to_string(),
            Node::Log => "log".to_string(),
            Node::UserDir => "user".to_string(),
            Node::UserMail => "mail".to_string(),
            Node::MailDir { queue, .. } => queue.dir_name().to_string(),
            Node::MsgFile { id, .. } => format!("{id}.json"),
            Node::BeadsDir => "beads".to_string(),
            Node::BeadsReady => "ready".to_string(),
            Node::BeadDir(id) => id.clone(),
            Node::BeadFile { field, .. } => field.name().to_string(),
            Node::SessionDir(id) => id.clone(),
            Node::SessionFile { kind, .. } => kind.name().to_string(),
        }
    }

    /// Stable key for qid-path allocation.
    fn path_key(&self) -> String {
        match self {
            Node::Root => "/".to_string(),
            Node::Ctl => "/ctl".to_string(),
            Node::List => "/list".to_string(),
            Node::Events => "/events".to_string(),
            Node::Log => "/log".to_string(),
            Node::UserDir => "/user".to_string(),
            Node::UserMail => "/user/mail".to_string(),
            Node::UserCtl => "/user/ctl".to_string(),
            Node::MailDir { owner, queue } => format!("/{owner}/{}", queue.dir_name()),
            Node::MsgFile { owner, queue, id } => {
                format!("/{owner}/{}/{id}", queue.dir_name())
            }
            Node::BeadsDir => "/beads".to_string(),
            Node::BeadsCtl => "/beads/ctl".to_string(),
            Node::BeadsList => "/beads/list".to_string(),
            Node::BeadsReady => "/beads/ready".to_string(),
            Node::BeadDir(id) => format!("/beads/{id}"),
            Node::BeadFile { id, field } => format!("/beads/{id}/{}", field.name()),
            Node::SessionDir(id) => format!("/{id}"),
            Node::SessionFile { id, kind } => format!("/{id}/{}", kind.name()),
        }
    }

    fn parent(&self) -> Node {
        match self {
            Node::Root | Node::Ctl | Node::List | Node::Events | Node::Log => Node::Root,
            Node::UserDir | Node::BeadsDir | Node::SessionDir(_) => Node::Root,
            Node::UserMail | Node::UserCtl => Node::UserDir,
            Node::MailDir { owner, .. } => {
                if owner == anvil_core::USER {
                    Node::UserDir
                } else {
                    Node::SessionDir(owner.clone())
                }
            }
            Node::MsgFile { owner, queue, .. } => Node::MailDir {
                owner: owner.clone(),
                queue: *queue,
            },
            Node::BeadsCtl | Node::BeadsList | Node::BeadsReady | Node::BeadDir(_) => {
                Node::BeadsDir
            }
            Node::BeadFile { id, .. } => Node::BeadDir(id.clone()),
            Node::SessionFile { id, .. } => Node::SessionDir(id.clone()),
        }
    }
}

/// Per-fid open state.
enum Open {
    File,
    /// Packed stat entries, snapshotted at open time
    Dir(Vec<u8>),
    Events {
        sub: Subscription,
        pending: Vec<u8>,
    },
    Log {
        tail: AuditTail,
        pending: Vec<u8>,
    },
}

impl std::fmt::Debug for AgentFid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentFid").field("node", &self.node).finish()
    }
}

pub struct AgentFid {
    node: Node,
    open: Option<Open>,
}

/// The daemon namespace served over 9P.
pub struct AgentFs<M: Mux, P: ProcInspector> {
    pub(crate) manager: Arc<SessionManager<M, P>>,
    pub(crate) store: Mutex<BeadStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) send_deadline: Duration,
    qids: Mutex<QidTable>,
}

#[derive(Default)]
struct QidTable {
    paths: HashMap<String, u64>,
    next: u64,
}

impl<M: Mux, P: ProcInspector> AgentFs<M, P> {
    pub fn new(
        manager: Arc<SessionManager<M, P>>,
        store: BeadStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            manager,
            store: Mutex::new(store),
            clock,
            send_deadline: SEND_DEADLINE,
            qids: Mutex::new(QidTable::default()),
        }
    }

    /// Flush the bead store to its snapshot (shutdown path).
    pub fn checkpoint_store(&self) -> Result<(), anvil_storage::StoreError> {
        self.store.lock().checkpoint()
    }

    fn qid_for(&self, node: &Node) -> Qid {
        let mut table = self.qids.lock();
        let key = node.path_key();
        let QidTable { paths, next } = &mut *table;
        let path = *paths.entry(key).or_insert_with(|| {
            *next += 1;
            *next
        });
        if node.is_dir() {
            Qid::dir(path)
        } else {
            Qid::file(path)
        }
    }

    /// Resolve one name under a directory node.
    fn child(&self, node: &Node, name: &str) -> Result<Node, Error> {
        match node {
            Node::Root => match name {
                "ctl" => Ok(Node::Ctl),
                "list" => Ok(Node::List),
                "events" => Ok(Node::Events),
                "log" => Ok(Node::Log),
                "user" => Ok(Node::UserDir),
                "beads" => Ok(Node::BeadsDir),
                other => {
                    let session = self
                        .manager
                        .resolve(other)
                        .ok_or_else(|| Error::with(ErrorKind::SessionNotFound, other))?;
                    Ok(Node::SessionDir(session.id().to_string()))
                }
            },
            Node::UserDir => match name {
                "mail" => Ok(Node::UserMail),
                "ctl" => Ok(Node::UserCtl),
                "inbox" => Ok(Node::MailDir {
                    owner: anvil_core::USER.to_string(),
                    queue: MailQueue::Inbox,
                }),
                "completed" => Ok(Node::MailDir {
                    owner: anvil_core::USER.to_string(),
                    queue: MailQueue::Completed,
                }),
                _ => Err(Error::new(ErrorKind::NotFound)),
            },
            Node::MailDir { owner, queue } => {
                let id = name.strip_suffix(".json").unwrap_or(name);
                let msg = self
                    .manager
                    .mailbox()
                    .find(owner, id)
                    .ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                Ok(Node::MsgFile {
                    owner: owner.clone(),
                    queue: *queue,
                    id: msg.id,
                })
            }
            Node::BeadsDir => match name {
                "ctl" => Ok(Node::BeadsCtl),
                "list" => Ok(Node::BeadsList),
                "ready" => Ok(Node::BeadsReady),
                other => {
                    let store = self.store.lock();
                    store
                        .get(&anvil_core::BeadId::new(other))
                        .map_err(|_| Error::new(ErrorKind::NotFound))?;
                    Ok(Node::BeadDir(other.to_string()))
                }
            },
            Node::BeadDir(id) => BeadField::from_name(name)
                .map(|field| Node::BeadFile {
                    id: id.clone(),
                    field,
                })
                .ok_or_else(|| Error::new(ErrorKind::NotFound)),
            Node::SessionDir(id) => {
                // The directory vanishes with its session
                self.manager.require(id)?;
                match name {
                    "inbox" => Ok(Node::MailDir {
                        owner: id.clone(),
                        queue: MailQueue::Inbox,
                    }),
                    "completed" => Ok(Node::MailDir {
                        owner: id.clone(),
                        queue: MailQueue::Completed,
                    }),
                    other => SessFile::from_name(other)
                        .map(|kind| Node::SessionFile {
                            id: id.clone(),
                            kind,
                        })
                        .ok_or_else(|| Error::new(ErrorKind::NotFound)),
                }
            }
            _ => Err(Error::with(ErrorKind::BadRequest, "walk in non-directory")),
        }
    }

    /// Entries of a directory, computed fresh (snapshot happens at open).
    fn entries(&self, node: &Node) -> Result<Vec<Node>, Error> {
        match node {
            Node::Root => {
                let mut entries = vec![
                    Node::Ctl,
                    Node::List,
                    Node::Events,
                    Node::Log,
                    Node::UserDir,
                    Node::BeadsDir,
                ];
                for info in self.manager.list() {
                    entries.push(Node::SessionDir(info.id.to_string()));
                }
                Ok(entries)
            }
            Node::UserDir => Ok(vec![
                Node::UserMail,
                Node::UserCtl,
                Node::MailDir {
                    owner: anvil_core::USER.to_string(),
                    queue: MailQueue::Inbox,
                },
                Node::MailDir {
                    owner: anvil_core::USER.to_string(),
                    queue: MailQueue::Completed,
                },
            ]),
            Node::MailDir { owner, queue } => {
                let mailbox = self.manager.mailbox();
                let msgs = match queue {
                    MailQueue::Inbox => mailbox.inbox(owner),
                    MailQueue::Completed => mailbox.completed(owner),
                };
                Ok(msgs
                    .into_iter()
                    .map(|m| Node::MsgFile {
                        owner: owner.clone(),
                        queue: *queue,
                        id: m.id,
                    })
                    .collect())
            }
            Node::BeadsDir => {
                let mut entries = vec![Node::BeadsCtl, Node::BeadsList, Node::BeadsReady];
                let store = self.store.lock();
                for bead in store.list(anvil_storage::BeadFilter::All) {
                    entries.push(Node::BeadDir(bead.id.to_string()));
                }
                Ok(entries)
            }
            Node::BeadDir(id) => Ok(BeadField::ALL
                .iter()
                .map(|field| Node::BeadFile {
                    id: id.clone(),
                    field: *field,
                })
                .collect()),
            Node::SessionDir(id) => {
                self.manager.require(id)?;
                let mut entries: Vec<Node> = SessFile::ALL
                    .iter()
                    .map(|kind| Node::SessionFile {
                        id: id.clone(),
                        kind: *kind,
                    })
                    .collect();
                entries.push(Node::MailDir {
                    owner: id.clone(),
                    queue: MailQueue::Inbox,
                });
                entries.push(Node::MailDir {
                    owner: id.clone(),
                    queue: MailQueue::Completed,
                });
                Ok(entries)
            }
            _ => Err(Error::with(ErrorKind::BadRequest, "not a directory")),
        }
    }

    fn stat_node(&self, node: &Node) -> Result<Stat, Error> {
        let length = if node.is_dir() {
            0
        } else {
            handlers::read_value(self, node).map(|v| v.len() as u64).unwrap_or(0)
        };
        Ok(Stat::synthetic(
            node.file_name(),
            self.qid_for(node),
            length,
            self.clock.unix_secs() as u32,
        ))
    }

    /// Pack a directory's entries for a snapshot-at-open read.
    fn pack_dir(&self, node: &Node) -> Result<Vec<u8>, Error> {
        let mut packed = Vec::new();
        for entry in self.entries(node)? {
            let stat = self.stat_node(&entry)?;
            packed.extend_from_slice(&codec::encode_stat(&stat));
        }
        Ok(packed)
    }
}

fn to_fs_error(e: Error) -> FsError {
    FsError::new(e.ename())
}

#[async_trait]
impl<M: Mux, P: ProcInspector> Filesystem for AgentFs<M, P> {
    type Fid = AgentFid;

    async fn attach(&self, _uname: &str, _aname: &str) -> Result<AgentFid, FsError> {
        Ok(AgentFid {
            node: Node::Root,
            open: None,
        })
    }

    fn clone_fid(&self, fid: &AgentFid) -> AgentFid {
        AgentFid {
            node: fid.node.clone(),
            open: None,
        }
    }

    fn qid(&self, fid: &AgentFid) -> Qid {
        self.qid_for(&fid.node)
    }

    async fn walk(&self, fid: &AgentFid, name: &str) -> Result<AgentFid, FsError> {
        let node = if name == ".." {
            fid.node.parent()
        } else {
            self.child(&fid.node, name).map_err(to_fs_error)?
        };
        Ok(AgentFid { node, open: None })
    }

    async fn open(&self, fid: &mut AgentFid, mode: OpenMode) -> Result<Qid, FsError> {
        if fid.node.is_dir() {
            if mode.writable() {
                return Err(FsError::new("is a directory"));
            }
            let packed = self.pack_dir(&fid.node).map_err(to_fs_error)?;
            fid.open = Some(Open::Dir(packed));
        } else {
            if mode.writable() && !handlers::writable(&fid.node) {
                return Err(FsError::new("permission denied"));
            }
            fid.open = Some(match &fid.node {
                Node::Events => Open::Events {
                    sub: self.manager.bus().subscribe(),
                    pending: Vec::new(),
                },
                Node::Log => Open::Log {
                    tail: self.manager.mailbox().tail_audit(),
                    pending: Vec::new(),
                },
                _ => Open::File,
            });
        }
        Ok(self.qid_for(&fid.node))
    }

    async fn read(&self, fid: &mut AgentFid, offset: u64, count: u32) -> Result<Vec<u8>, FsError> {
        match fid.open.as_mut() {
            Some(Open::Dir(packed)) => Ok(slice_at(packed, offset, count)),
            Some(Open::Events { sub, pending }) => {
                handlers::read_event_stream(sub, pending, count).await
            }
            Some(Open::Log { tail, pending }) => {
                handlers::read_log_stream(tail, pending, count).await
            }
            Some(Open::File) => {
                let value = handlers::read_value(self, &fid.node).map_err(to_fs_error)?;
                Ok(slice_at(&value, offset, count))
            }
            None => Err(FsError::new("fid not open")),
        }
    }

    async fn write(&self, fid: &mut AgentFid, _offset: u64, data: &[u8]) -> Result<u32, FsError> {
        if !matches!(fid.open, Some(Open::File)) {
            return Err(FsError::new("fid not open for writing"));
        }
        handlers::write_node(self, &fid.node, data)
            .await
            .map_err(to_fs_error)?;
        Ok(data.len() as u32)
    }

    async fn stat(&self, fid: &AgentFid) -> Result<Stat, FsError> {
        self.stat_node(&fid.node).map_err(to_fs_error)
    }

    async fn remove(&self, fid: AgentFid) -> Result<(), FsError> {
        match fid.node {
            Node::MsgFile {
                owner,
                queue: MailQueue::Inbox,
                id,
            } => {
                self.manager
                    .mailbox()
                    .complete(&owner, &id)
                    .map(|_| ())
                    .map_err(to_fs_error)
            }
            _ => Err(FsError::new("remove not allowed")),
        }
    }
}

/// Slice `value[offset..offset+count]`, empty past the end.
fn slice_at(value: &[u8], offset: u64, count: u32) -> Vec<u8> {
    let start = (offset as usize).min(value.len());
    let end = (start + count as usize).min(value.len());
    value[start..end].to_vec()
}

// Crate-internal helpers for lifecycle tests, which exercise the store
// through the namespace rather than reaching into it.
#[cfg(test)]
impl<M: Mux, P: ProcInspector> AgentFs<M, P> {
    pub(crate) async fn write_test_bead_ctl(&self, cmd: &str) -> Result<(), FsError> {
        handlers::write_node(self, &Node::BeadsCtl, cmd.as_bytes())
            .await
            .map_err(to_fs_error)
    }

    pub(crate) async fn read_test_bead_list(&self) -> Result<String, FsError> {
        let value = handlers::read_value(self, &Node::BeadsList).map_err(to_fs_error)?;
        Ok(String::from_utf8_lossy(&value).into_owned())
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
