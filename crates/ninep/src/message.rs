// SPDX-License-Identifier: MIT

//! 9P2000 message types, qids, and stat records.

/// Protocol version string negotiated in Tversion/Rversion.
pub const VERSION9P: &str = "9P2000";

/// Largest message this server will negotiate (1 MiB).
pub const MAX_MSIZE: u32 = 1024 * 1024;

/// Tag value used by Tversion.
pub const NOTAG: u16 = 0xFFFF;

/// Fid value meaning "no fid" (afid on unauthenticated attach).
pub const NOFID: u32 = 0xFFFF_FFFF;

/// Qid type bit: directory.
pub const QTDIR: u8 = 0x80;

/// Qid type: plain file.
pub const QTFILE: u8 = 0x00;

/// Stat mode bit: directory.
pub const DMDIR: u32 = 0x8000_0000;

/// Open modes (low bits of Topen mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    Exec,
}

impl OpenMode {
    /// Decode the access portion of a Topen/Tcreate mode byte.
    pub fn from_bits(mode: u8) -> Option<Self> {
        match mode & 0x03 {
            0 => Some(OpenMode::Read),
            1 => Some(OpenMode::Write),
            2 => Some(OpenMode::ReadWrite),
            3 => Some(OpenMode::Exec),
            _ => None,
        }
    }

    pub fn readable(&self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite | OpenMode::Exec)
    }

    pub fn writable(&self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// Unique file identity: type byte, version, and a 64-bit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qid {
    pub qtype: u8,
    pub version: u32,
    pub path: u64,
}

impl Qid {
    pub fn dir(path: u64) -> Self {
        Self {
            qtype: QTDIR,
            version: 0,
            path,
        }
    }

    pub fn file(path: u64) -> Self {
        Self {
            qtype: QTFILE,
            version: 0,
            path,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.qtype & QTDIR != 0
    }
}

/// A 9P2000 stat record (the inner structure, without the Rstat wrapper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub qid: Qid,
    pub mode: u32,
    pub atime: u32,
    pub mtime: u32,
    pub length: u64,
    pub name: String,
    pub uid: String,
    pub gid: String,
    pub muid: String,
}

impl Stat {
    /// A stat for a synthetic file or directory.
    pub fn synthetic(name: impl Into<String>, qid: Qid, length: u64, mtime: u32) -> Self {
        let mode = if qid.is_dir() { DMDIR | 0o700 } else { 0o600 };
        Self {
            qid,
            mode,
            atime: mtime,
            mtime,
            length,
            name: name.into(),
            uid: String::new(),
            gid: String::new(),
            muid: String::new(),
        }
    }
}

/// Client requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Tmessage {
    Version { msize: u32, version: String },
    Auth { afid: u32, uname: String, aname: String },
    Attach { fid: u32, afid: u32, uname: String, aname: String },
    Flush { oldtag: u16 },
    Walk { fid: u32, newfid: u32, wnames: Vec<String> },
    Open { fid: u32, mode: u8 },
    Create { fid: u32, name: String, perm: u32, mode: u8 },
    Read { fid: u32, offset: u64, count: u32 },
    Write { fid: u32, offset: u64, data: Vec<u8> },
    Clunk { fid: u32 },
    Remove { fid: u32 },
    Stat { fid: u32 },
    Wstat { fid: u32, stat: Vec<u8> },
}

/// Server replies.
#[derive(Debug, Clone, PartialEq)]
pub enum Rmessage {
    Version { msize: u32, version: String },
    Error { ename: String },
    Attach { qid: Qid },
    Flush,
    Walk { wqids: Vec<Qid> },
    Open { qid: Qid, iounit: u32 },
    Read { data: Vec<u8> },
    Write { count: u32 },
    Clunk,
    Remove,
    Stat { stat: Stat },
}

impl Tmessage {
    /// Human name for tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Tmessage::Version { .. } => "Tversion",
            Tmessage::Auth { .. } => "Tauth",
            Tmessage::Attach { .. } => "Tattach",
            Tmessage::Flush { .. } => "Tflush",
            Tmessage::Walk { .. } => "Twalk",
            Tmessage::Open { .. } => "Topen",
            Tmessage::Create { .. } => "Tcreate",
            Tmessage::Read { .. } => "Tread",
            Tmessage::Write { .. } => "Twrite",
            Tmessage::Clunk { .. } => "Tclunk",
            Tmessage::Remove { .. } => "Tremove",
            Tmessage::Stat { .. } => "Tstat",
            Tmessage::Wstat { .. } => "Twstat",
        }
    }
}
