// SPDX-License-Identifier: MIT

//! Generic 9P2000 connection loop.
//!
//! One task reads T-messages and dispatches each into its own task, so a
//! read that blocks (the event stream) never stalls the connection; a
//! writer task serializes replies, which may therefore complete out of
//! order by tag, as 9P permits. Per-fid state is behind an async mutex so
//! concurrent requests on one handle serialize.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, trace, warn};

use crate::codec::{read_tmessage, write_rmessage};
use crate::error::{FsError, NinepError};
use crate::message::{OpenMode, Qid, Rmessage, Tmessage, MAX_MSIZE, VERSION9P};

/// The synthetic filesystem a connection serves.
///
/// `Fid` is per-handle state: what a walked path points at plus whatever
/// the open established (directory snapshots, stream subscriptions). The
/// server owns the fid table; implementations own what a fid means.
#[async_trait]
pub trait Filesystem: Send + Sync + 'static {
    type Fid: Send + Sync + 'static;

    /// Produce the root fid for a new attach.
    async fn attach(&self, uname: &str, aname: &str) -> Result<Self::Fid, FsError>;

    /// Duplicate an un-opened fid (Twalk with newfid, zero names).
    fn clone_fid(&self, fid: &Self::Fid) -> Self::Fid;

    fn qid(&self, fid: &Self::Fid) -> Qid;

    /// Walk one name component from `fid`.
    async fn walk(&self, fid: &Self::Fid, name: &str) -> Result<Self::Fid, FsError>;

    /// Prepare a fid for I/O. Directory listings snapshot here.
    async fn open(&self, fid: &mut Self::Fid, mode: OpenMode) -> Result<Qid, FsError>;

    /// Read from an opened fid. May block (streaming files).
    async fn read(&self, fid: &mut Self::Fid, offset: u64, count: u32)
        -> Result<Vec<u8>, FsError>;

    /// Write to an opened fid.
    async fn write(&self, fid: &mut Self::Fid, offset: u64, data: &[u8])
        -> Result<u32, FsError>;

    async fn stat(&self, fid: &Self::Fid) -> Result<crate::message::Stat, FsError>;

    /// Remove the file a fid points at. The fid is clunked regardless.
    async fn remove(&self, fid: Self::Fid) -> Result<(), FsError>;

    /// Release a fid. Default: drop it.
    async fn clunk(&self, fid: Self::Fid) {
        drop(fid);
    }
}

// Tag table entries are touched from async contexts on both sides of an
// await, so the table stays tokio-flavored rather than parking_lot.
type PendingTable = Mutex<HashMap<u16, Arc<Notify>>>;

struct Connection<F: Filesystem> {
    fs: Arc<F>,
    fids: Mutex<HashMap<u32, Arc<Mutex<F::Fid>>>>,
    /// In-flight tags and their cancellation handles.
    pending: PendingTable,
    reply_tx: mpsc::Sender<(u16, Rmessage)>,
}

/// Serve one accepted connection until EOF or protocol error.
pub async fn serve_connection<F, S>(fs: Arc<F>, stream: S)
where
    F: Filesystem,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (reply_tx, mut reply_rx) = mpsc::channel::<(u16, Rmessage)>(64);

    // Writer task: the single owner of the write half
    let writer_task = tokio::spawn(async move {
        while let Some((tag, msg)) = reply_rx.recv().await {
            if let Err(e) = write_rmessage(&mut writer, tag, &msg).await {
                debug!(error = %e, "9p write failed, dropping connection");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let conn = Arc::new(Connection {
        fs,
        fids: Mutex::new(HashMap::new()),
        pending: Mutex::new(HashMap::new()),
        reply_tx,
    });

    loop {
        let (tag, msg) = match read_tmessage(&mut reader).await {
            Ok(parsed) => parsed,
            Err(NinepError::ConnectionClosed) => break,
            Err(e) => {
                warn!(error = %e, "9p read failed, dropping connection");
                break;
            }
        };
        trace!(tag, msg = msg.name(), "9p request");

        match msg {
            // Version resets the connection synchronously
            Tmessage::Version { msize, .. } => {
                conn.fids.lock().await.clear();
                let msize = msize.min(MAX_MSIZE);
                conn.reply(
                    tag,
                    Rmessage::Version {
                        msize,
                        version: VERSION9P.to_string(),
                    },
                )
                .await;
            }
            // Flush is handled inline so it can see the pending table
            Tmessage::Flush { oldtag } => {
                conn.flush(oldtag).await;
                conn.reply(tag, Rmessage::Flush).await;
            }
            other => {
                let conn = Arc::clone(&conn);
                let cancel = Arc::new(Notify::new());
                conn.pending.lock().await.insert(tag, Arc::clone(&cancel));
                tokio::spawn(async move {
                    let reply = tokio::select! {
                        reply = conn.handle(other) => reply,
                        _ = cancel.notified() => Rmessage::Error {
                            ename: "interrupted".to_string(),
                        },
                    };
                    conn.pending.lock().await.remove(&tag);
                    conn.reply(tag, reply).await;
                });
            }
        }
    }

    // Reader gone: close the reply channel so the writer task exits
    drop(conn);
    let _ = writer_task.await;
}

impl<F: Filesystem> Connection<F> {
    async fn reply(&self, tag: u16, msg: Rmessage) {
        let _ = self.reply_tx.send((tag, msg)).await;
    }

    /// Cancel the task serving `oldtag` and wait for it to unwind.
    async fn flush(&self, oldtag: u16) {
        let notify = self.pending.lock().await.get(&oldtag).cloned();
        let Some(notify) = notify else {
            return; // already answered
        };
        notify.notify_waiters();
        // Wait for the handler to drain; bounded to keep flush prompt
        for _ in 0..200 {
            if !self.pending.lock().await.contains_key(&oldtag) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    async fn handle(&self, msg: Tmessage) -> Rmessage {
        match self.dispatch(msg).await {
            Ok(reply) => reply,
            Err(e) => Rmessage::Error { ename: e.ename },
        }
    }

    async fn dispatch(&self, msg: Tmessage) -> Result<Rmessage, FsError> {
        match msg {
            Tmessage::Version { .. } | Tmessage::Flush { .. } => {
                // Handled inline by the connection loop
                Err(FsError::new("bad request"))
            }
            Tmessage::Auth { .. } => Err(FsError::new("authentication not required")),
            Tmessage::Attach {
                fid, uname, aname, ..
            } => {
                let root = self.fs.attach(&uname, &aname).await?;
                let qid = self.fs.qid(&root);
                self.bind(fid, root).await?;
                Ok(Rmessage::Attach { qid })
            }
            Tmessage::Walk { fid, newfid, wnames } => self.walk(fid, newfid, wnames).await,
            Tmessage::Open { fid, mode } => {
                let mode =
                    OpenMode::from_bits(mode).ok_or_else(|| FsError::new("bad open mode"))?;
                let handle = self.lookup(fid).await?;
                let mut guard = handle.lock().await;
                let qid = self.fs.open(&mut guard, mode).await?;
                Ok(Rmessage::Open { qid, iounit: 0 })
            }
            Tmessage::Create { .. } => Err(FsError::new("create not allowed")),
            Tmessage::Read { fid, offset, count } => {
                let handle = self.lookup(fid).await?;
                let mut guard = handle.lock().await;
                let data = self.fs.read(&mut guard, offset, count).await?;
                Ok(Rmessage::Read { data })
            }
            Tmessage::Write { fid, offset, data } => {
                let handle = self.lookup(fid).await?;
                let mut guard = handle.lock().await;
                let count = self.fs.write(&mut guard, offset, &data).await?;
                Ok(Rmessage::Write { count })
            }
            Tmessage::Clunk { fid } => {
                let handle = self.unbind(fid).await?;
                if let Ok(inner) = Arc::try_unwrap(handle).map(|m| m.into_inner()) {
                    self.fs.clunk(inner).await;
                }
                Ok(Rmessage::Clunk)
            }
            Tmessage::Remove { fid } => {
                let handle = self.unbind(fid).await?;
                match Arc::try_unwrap(handle).map(|m| m.into_inner()) {
                    Ok(inner) => {
                        self.fs.remove(inner).await?;
                        Ok(Rmessage::Remove)
                    }
                    Err(_) => Err(FsError::new("fid busy")),
                }
            }
            Tmessage::Stat { fid } => {
                let handle = self.lookup(fid).await?;
                let guard = handle.lock().await;
                let stat = self.fs.stat(&guard).await?;
                Ok(Rmessage::Stat { stat })
            }
            Tmessage::Wstat { .. } => Err(FsError::new("wstat not allowed")),
        }
    }

    async fn walk(&self, fid: u32, newfid: u32, wnames: Vec<String>) -> Result<Rmessage, FsError> {
        let source = self.lookup(fid).await?;
        let guard = source.lock().await;
        let mut current = self.fs.clone_fid(&guard);
        drop(guard);

        let mut wqids = Vec::with_capacity(wnames.len());
        for (i, name) in wnames.iter().enumerate() {
            match self.fs.walk(&current, name).await {
                Ok(next) => {
                    wqids.push(self.fs.qid(&next));
                    current = next;
                }
                Err(e) if i == 0 => return Err(e),
                // Partial walk: report how far we got, bind nothing
                Err(_) => return Ok(Rmessage::Walk { wqids }),
            }
        }

        self.bind(newfid, current).await?;
        Ok(Rmessage::Walk { wqids })
    }

    async fn bind(&self, fid: u32, state: F::Fid) -> Result<(), FsError> {
        let mut fids = self.fids.lock().await;
        // Rebinding an existing fid implicitly clunks the old state
        fids.insert(fid, Arc::new(Mutex::new(state)));
        Ok(())
    }

    async fn lookup(&self, fid: u32) -> Result<Arc<Mutex<F::Fid>>, FsError> {
        self.fids
            .lock()
            .await
            .get(&fid)
            .cloned()
            .ok_or_else(|| FsError::new("unknown fid"))
    }

    async fn unbind(&self, fid: u32) -> Result<Arc<Mutex<F::Fid>>, FsError> {
        self.fids
            .lock()
            .await
            .remove(&fid)
            .ok_or_else(|| FsError::new("unknown fid"))
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
