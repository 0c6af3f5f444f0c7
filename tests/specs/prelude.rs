// SPDX-License-Identifier: MIT

//! Shared harness: a daemon namespace over fakes plus a minimal 9P client.

use std::sync::Arc;
use std::time::Duration;

use anvil_adapters::{FakeMux, FakeProcInspector, MuxCall, SandboxComposer, WindowTarget};
use anvil_core::{FakeClock, UuidIdGen};
use anvil_daemon::AgentFs;
use anvil_engine::{
    BackendRegistry, EventBus, Mailbox, SessionManager, SessionSetup, SessionTiming,
};
use anvil_ninep::codec::{encode_tmessage, read_rmessage};
use anvil_ninep::{serve_connection, Qid, Rmessage, Tmessage, NOFID, VERSION9P};
use anvil_storage::BeadStore;
use tokio::io::{AsyncWriteExt, DuplexStream};

/// Output long enough to clear the readiness threshold.
pub const BANNER: &[u8] =
    b"fake backend 0.1 ready --------------------------------------------\n> ";

pub struct World {
    pub manager: Arc<SessionManager<FakeMux, FakeProcInspector>>,
    pub mux: FakeMux,
    pub proc: FakeProcInspector,
    fs: Arc<AgentFs<FakeMux, FakeProcInspector>>,
    _dir: tempfile::TempDir,
}

impl World {
    pub fn new() -> World {
        let dir = tempfile::tempdir().unwrap();
        let setup = SessionSetup {
            mux_session: "anvil-spec".to_string(),
            fifo_dir: dir.path().to_path_buf(),
            composer: SandboxComposer::new(dir.path().join("sandbox"))
                .with_launcher("definitely-not-installed-xyz"),
            registry: BackendRegistry::builtin(),
            timing: SessionTiming {
                poll: Duration::from_millis(10),
                quiesce: Duration::from_millis(40),
                ready_timeout: Duration::from_secs(5),
                settle: Duration::from_millis(1),
            },
        };
        let mux = FakeMux::new();
        let proc = FakeProcInspector::new();
        let clock: Arc<dyn anvil_core::Clock> = Arc::new(FakeClock::new());
        let mailbox = Arc::new(Mailbox::new(UuidIdGen));
        let manager = SessionManager::new(
            setup,
            mux.clone(),
            proc.clone(),
            mailbox,
            EventBus::new(),
            Arc::clone(&clock),
        );
        manager.register_alias_lookup();
        let store = BeadStore::open(&dir.path().join("beads"), Arc::clone(&clock)).unwrap();
        let fs = Arc::new(AgentFs::new(Arc::clone(&manager), store, clock));

        World {
            manager,
            mux,
            proc,
            fs,
            _dir: dir,
        }
    }

    /// Open a fresh 9P connection to the daemon.
    pub async fn connect(&self) -> Client {
        let (local, remote) = tokio::io::duplex(256 * 1024);
        tokio::spawn(serve_connection(Arc::clone(&self.fs), remote));
        let mut client = Client {
            stream: local,
            next_tag: 1,
            next_fid: 1,
        };
        let reply = client
            .rpc(Tmessage::Version {
                msize: 64 * 1024,
                version: VERSION9P.to_string(),
            })
            .await;
        assert!(matches!(reply, Rmessage::Version { .. }));
        let reply = client
            .rpc(Tmessage::Attach {
                fid: 0,
                afid: NOFID,
                uname: "operator".to_string(),
                aname: String::new(),
            })
            .await;
        assert!(matches!(reply, Rmessage::Attach { .. }));
        client
    }

    /// Run one mailbox pump cycle.
    pub async fn pump(&self) {
        anvil_engine::pump_once(&self.manager, Duration::from_secs(3600)).await;
    }

    pub fn piped_targets(&self) -> Vec<WindowTarget> {
        self.mux
            .calls()
            .iter()
            .filter_map(|c| match c {
                MuxCall::PipePane { target, .. } => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait for the nth (1-based) window to be piped, then emit the banner.
    pub async fn emit_banner_for_launch(&self, nth: usize) {
        for _ in 0..500 {
            if self.piped_targets().len() >= nth {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let targets = self.piped_targets();
        assert!(targets.len() >= nth, "launch #{nth} never piped");
        self.mux.emit(&targets[nth - 1], BANNER);
    }

    pub fn target_of(&self, id: &str) -> WindowTarget {
        self.manager.get(id).unwrap().target().clone()
    }
}

pub struct Client {
    stream: DuplexStream,
    next_tag: u16,
    next_fid: u32,
}

impl Client {
    pub async fn rpc(&mut self, msg: Tmessage) -> Rmessage {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1).max(1);
        let frame = encode_tmessage(tag, &msg);
        self.stream.write_all(&frame).await.unwrap();
        loop {
            let (rtag, reply) = tokio::time::timeout(
                Duration::from_secs(10),
                read_rmessage(&mut self.stream),
            )
            .await
            .expect("9p reply timed out")
            .unwrap();
            if rtag == tag {
                return reply;
            }
        }
    }

    /// Walk to a path, returning the fid.
    pub async fn walk(&mut self, path: &str) -> Result<u32, String> {
        let fid = self.next_fid;
        self.next_fid += 1;
        let wnames: Vec<String> = path
            .split('/')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let expected = wnames.len();
        match self
            .rpc(Tmessage::Walk {
                fid: 0,
                newfid: fid,
                wnames,
            })
            .await
        {
            Rmessage::Walk { wqids } if wqids.len() == expected => Ok(fid),
            Rmessage::Walk { .. } => Err("partial walk".to_string()),
            Rmessage::Error { ename } => Err(ename),
            other => panic!("unexpected walk reply: {other:?}"),
        }
    }

    pub async fn open(&mut self, fid: u32, mode: u8) -> Result<Qid, String> {
        match self.rpc(Tmessage::Open { fid, mode }).await {
            Rmessage::Open { qid, .. } => Ok(qid),
            Rmessage::Error { ename } => Err(ename),
            other => panic!("unexpected open reply: {other:?}"),
        }
    }

    pub async fn clunk(&mut self, fid: u32) {
        let reply = self.rpc(Tmessage::Clunk { fid }).await;
        assert!(matches!(reply, Rmessage::Clunk), "{reply:?}");
    }

    /// Read a whole scalar file as a string.
    pub async fn read_file(&mut self, path: &str) -> Result<String, String> {
        let fid = self.walk(path).await?;
        self.open(fid, 0).await?;
        let reply = self
            .rpc(Tmessage::Read {
                fid,
                offset: 0,
                count: 1 << 20,
            })
            .await;
        let result = match reply {
            Rmessage::Read { data } => Ok(String::from_utf8_lossy(&data).into_owned()),
            Rmessage::Error { ename } => Err(ename),
            other => panic!("unexpected read reply: {other:?}"),
        };
        self.clunk(fid).await;
        result
    }

    /// Write a string to a file (one command / one payload per write).
    pub async fn write_file(&mut self, path: &str, data: &str) -> Result<(), String> {
        let fid = self.walk(path).await?;
        self.open(fid, 1).await?;
        let reply = self
            .rpc(Tmessage::Write {
                fid,
                offset: 0,
                data: data.as_bytes().to_vec(),
            })
            .await;
        let result = match reply {
            Rmessage::Write { .. } => Ok(()),
            Rmessage::Error { ename } => Err(ename),
            other => panic!("unexpected write reply: {other:?}"),
        };
        self.clunk(fid).await;
        result
    }

    /// Directory entry names (snapshot at open).
    pub async fn list_dir(&mut self, path: &str) -> Result<Vec<String>, String> {
        let fid = self.walk(path).await?;
        self.open(fid, 0).await?;
        let mut names = Vec::new();
        let mut offset = 0u64;
        loop {
            let reply = self
                .rpc(Tmessage::Read {
                    fid,
                    offset,
                    count: 1 << 16,
                })
                .await;
            let data = match reply {
                Rmessage::Read { data } => data,
                Rmessage::Error { ename } => {
                    self.clunk(fid).await;
                    return Err(ename);
                }
                other => panic!("unexpected dir read reply: {other:?}"),
            };
            if data.is_empty() {
                break;
            }
            offset += data.len() as u64;
            let mut rest = data.as_slice();
            while rest.len() >= 2 {
                let size = u16::from_le_bytes([rest[0], rest[1]]) as usize;
                let stat = anvil_ninep::codec::decode_stat(&rest[..size + 2]).unwrap();
                names.push(stat.name);
                rest = &rest[size + 2..];
            }
        }
        self.clunk(fid).await;
        Ok(names)
    }
}

/// Poll the `state` file until it matches.
pub async fn wait_for_state(client: &mut Client, id: &str, want: &str) {
    for _ in 0..1000 {
        if let Ok(state) = client.read_file(&format!("/{id}/state")).await {
            if state.trim() == want {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {id} never reached {want}");
}
