// SPDX-License-Identifier: MIT

//! 9P2000 wire encoding.
//!
//! Frame layout: `size[4] type[1] tag[2] body`, all little-endian; `size`
//! includes itself. Strings are `len[2]` + UTF-8 bytes. Stats nest a
//! redundant inner size prefix, per the protocol.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::NinepError;
use crate::message::{Qid, Rmessage, Stat, Tmessage, MAX_MSIZE};

// Message type bytes
const TVERSION: u8 = 100;
const RVERSION: u8 = 101;
const TAUTH: u8 = 102;
const TATTACH: u8 = 104;
const RATTACH: u8 = 105;
const RERROR: u8 = 107;
const TFLUSH: u8 = 108;
const RFLUSH: u8 = 109;
const TWALK: u8 = 110;
const RWALK: u8 = 111;
const TOPEN: u8 = 112;
const ROPEN: u8 = 113;
const TCREATE: u8 = 114;
const TREAD: u8 = 116;
const RREAD: u8 = 117;
const TWRITE: u8 = 118;
const RWRITE: u8 = 119;
const TCLUNK: u8 = 120;
const RCLUNK: u8 = 121;
const TREMOVE: u8 = 122;
const RREMOVE: u8 = 123;
const TSTAT: u8 = 124;
const RSTAT: u8 = 125;
const TWSTAT: u8 = 126;

/// Read one framed T-message. Returns `(tag, message)`.
pub async fn read_tmessage<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<(u16, Tmessage), NinepError> {
    let frame = read_frame(reader).await?;
    decode_tmessage(&frame)
}

/// Write one framed R-message.
pub async fn write_rmessage<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    tag: u16,
    msg: &Rmessage,
) -> Result<(), NinepError> {
    let frame = encode_rmessage(tag, msg);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a raw frame: `type[1] tag[2] body`, without the size prefix.
async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, NinepError> {
    let mut size_buf = [0u8; 4];
    match reader.read_exact(&mut size_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(NinepError::ConnectionClosed);
        }
        Err(e) => return Err(NinepError::Io(e)),
    }
    let size = u32::from_le_bytes(size_buf);
    if size < 7 {
        return Err(NinepError::Truncated(size as usize));
    }
    if size > MAX_MSIZE {
        return Err(NinepError::MessageTooLarge {
            size,
            max: MAX_MSIZE,
        });
    }

    let mut frame = vec![0u8; size as usize - 4];
    reader.read_exact(&mut frame).await?;
    Ok(frame)
}

/// Decode one T-message from a frame (type byte + tag + body).
pub fn decode_tmessage(frame: &[u8]) -> Result<(u16, Tmessage), NinepError> {
    let mut cur = Cursor::new(frame);
    let mtype = ReadBytesExt::read_u8(&mut cur)?;
    let tag = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?;

    let msg = match mtype {
        TVERSION => Tmessage::Version {
            msize: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            version: read_string(&mut cur)?,
        },
        TAUTH => Tmessage::Auth {
            afid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            uname: read_string(&mut cur)?,
            aname: read_string(&mut cur)?,
        },
        TATTACH => Tmessage::Attach {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            afid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            uname: read_string(&mut cur)?,
            aname: read_string(&mut cur)?,
        },
        TFLUSH => Tmessage::Flush {
            oldtag: ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?,
        },
        TWALK => {
            let fid = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
            let newfid = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
            let nwname = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?;
            let mut wnames = Vec::with_capacity(nwname as usize);
            for _ in 0..nwname {
                wnames.push(read_string(&mut cur)?);
            }
            Tmessage::Walk { fid, newfid, wnames }
        }
        TOPEN => Tmessage::Open {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            mode: ReadBytesExt::read_u8(&mut cur)?,
        },
        TCREATE => Tmessage::Create {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            name: read_string(&mut cur)?,
            perm: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            mode: ReadBytesExt::read_u8(&mut cur)?,
        },
        TREAD => Tmessage::Read {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            offset: ReadBytesExt::read_u64::<LittleEndian>(&mut cur)?,
            count: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
        },
        TWRITE => {
            let fid = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
            let offset = ReadBytesExt::read_u64::<LittleEndian>(&mut cur)?;
            let count = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)? as usize;
            let mut data = vec![0u8; count];
            std::io::Read::read_exact(&mut cur, &mut data)
                .map_err(|_| NinepError::Malformed { what: "Twrite data" })?;
            Tmessage::Write { fid, offset, data }
        }
        TCLUNK => Tmessage::Clunk {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
        },
        TREMOVE => Tmessage::Remove {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
        },
        TSTAT => Tmessage::Stat {
            fid: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
        },
        TWSTAT => {
            let fid = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
            let n = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)? as usize;
            let mut stat = vec![0u8; n];
            std::io::Read::read_exact(&mut cur, &mut stat)
                .map_err(|_| NinepError::Malformed { what: "Twstat stat" })?;
            Tmessage::Wstat { fid, stat }
        }
        other => return Err(NinepError::UnknownType(other)),
    };

    Ok((tag, msg))
}

/// Encode one R-message into a full frame including the size prefix.
pub fn encode_rmessage(tag: u16, msg: &Rmessage) -> Vec<u8> {
    let mut body = Vec::with_capacity(32);
    let mtype = match msg {
        Rmessage::Version { msize, version } => {
            write_u32(&mut body, *msize);
            write_string(&mut body, version);
            RVERSION
        }
        Rmessage::Error { ename } => {
            write_string(&mut body, ename);
            RERROR
        }
        Rmessage::Attach { qid } => {
            write_qid(&mut body, qid);
            RATTACH
        }
        Rmessage::Flush => RFLUSH,
        Rmessage::Walk { wqids } => {
            write_u16(&mut body, wqids.len() as u16);
            for qid in wqids {
                write_qid(&mut body, qid);
            }
            RWALK
        }
        Rmessage::Open { qid, iounit } => {
            write_qid(&mut body, qid);
            write_u32(&mut body, *iounit);
            ROPEN
        }
        Rmessage::Read { data } => {
            write_u32(&mut body, data.len() as u32);
            body.extend_from_slice(data);
            RREAD
        }
        Rmessage::Write { count } => {
            write_u32(&mut body, *count);
            RWRITE
        }
        Rmessage::Clunk => RCLUNK,
        Rmessage::Remove => RREMOVE,
        Rmessage::Stat { stat } => {
            let encoded = encode_stat(stat);
            // Rstat carries stat[n]: an outer length then the stat bytes
            write_u16(&mut body, encoded.len() as u16);
            body.extend_from_slice(&encoded);
            RSTAT
        }
    };

    let mut frame = Vec::with_capacity(body.len() + 7);
    write_u32(&mut frame, (body.len() + 7) as u32);
    frame.push(mtype);
    write_u16(&mut frame, tag);
    frame.extend_from_slice(&body);
    frame
}

/// Encode a stat record with its leading inner size field.
pub fn encode_stat(stat: &Stat) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    write_u16(&mut buf, 0); // placeholder for size
    write_u16(&mut buf, 0); // type (kernel use)
    write_u32(&mut buf, 0); // dev
    write_qid(&mut buf, &stat.qid);
    write_u32(&mut buf, stat.mode);
    write_u32(&mut buf, stat.atime);
    write_u32(&mut buf, stat.mtime);
    write_u64(&mut buf, stat.length);
    write_string(&mut buf, &stat.name);
    write_string(&mut buf, &stat.uid);
    write_string(&mut buf, &stat.gid);
    write_string(&mut buf, &stat.muid);

    let size = (buf.len() - 2) as u16;
    buf[0] = size.to_le_bytes()[0];
    buf[1] = size.to_le_bytes()[1];
    buf
}

/// Decode a stat record (with leading inner size field).
pub fn decode_stat(buf: &[u8]) -> Result<Stat, NinepError> {
    let mut cur = Cursor::new(buf);
    let _size = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?;
    let _type = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?;
    let _dev = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
    let qid = read_qid(&mut cur)?;
    let mode = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
    let atime = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
    let mtime = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?;
    let length = ReadBytesExt::read_u64::<LittleEndian>(&mut cur)?;
    let name = read_string(&mut cur)?;
    let uid = read_string(&mut cur)?;
    let gid = read_string(&mut cur)?;
    let muid = read_string(&mut cur)?;
    Ok(Stat {
        qid,
        mode,
        atime,
        mtime,
        length,
        name,
        uid,
        gid,
        muid,
    })
}

fn read_string(cur: &mut Cursor<&[u8]>) -> Result<String, NinepError> {
    let len = ReadBytesExt::read_u16::<LittleEndian>(&mut *cur)? as usize;
    let mut bytes = vec![0u8; len];
    std::io::Read::read_exact(&mut *cur, &mut bytes)
        .map_err(|_| NinepError::Malformed { what: "string" })?;
    String::from_utf8(bytes).map_err(|_| NinepError::Malformed { what: "string utf-8" })
}

fn read_qid(cur: &mut Cursor<&[u8]>) -> Result<Qid, NinepError> {
    Ok(Qid {
        qtype: ReadBytesExt::read_u8(&mut *cur)?,
        version: ReadBytesExt::read_u32::<LittleEndian>(&mut *cur)?,
        path: ReadBytesExt::read_u64::<LittleEndian>(&mut *cur)?,
    })
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_u16(buf, s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

fn write_qid(buf: &mut Vec<u8>, qid: &Qid) {
    buf.push(qid.qtype);
    write_u32(buf, qid.version);
    write_u64(buf, qid.path);
}

fn write_u16(buf: &mut Vec<u8>, v: u16) {
    let _ = WriteBytesExt::write_u16::<LittleEndian>(buf, v);
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    let _ = WriteBytesExt::write_u32::<LittleEndian>(buf, v);
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    let _ = WriteBytesExt::write_u64::<LittleEndian>(buf, v);
}

// --- client-side helpers, used by tests and in-process clients ---

/// Encode one T-message into a full frame including the size prefix.
pub fn encode_tmessage(tag: u16, msg: &Tmessage) -> Vec<u8> {
    let mut body = Vec::with_capacity(32);
    let mtype = match msg {
        Tmessage::Version { msize, version } => {
            write_u32(&mut body, *msize);
            write_string(&mut body, version);
            TVERSION
        }
        Tmessage::Auth { afid, uname, aname } => {
            write_u32(&mut body, *afid);
            write_string(&mut body, uname);
            write_string(&mut body, aname);
            TAUTH
        }
        Tmessage::Attach {
            fid,
            afid,
            uname,
            aname,
        } => {
            write_u32(&mut body, *fid);
            write_u32(&mut body, *afid);
            write_string(&mut body, uname);
            write_string(&mut body, aname);
            TATTACH
        }
        Tmessage::Flush { oldtag } => {
            write_u16(&mut body, *oldtag);
            TFLUSH
        }
        Tmessage::Walk { fid, newfid, wnames } => {
            write_u32(&mut body, *fid);
            write_u32(&mut body, *newfid);
            write_u16(&mut body, wnames.len() as u16);
            for name in wnames {
                write_string(&mut body, name);
            }
            TWALK
        }
        Tmessage::Open { fid, mode } => {
            write_u32(&mut body, *fid);
            body.push(*mode);
            TOPEN
        }
        Tmessage::Create {
            fid,
            name,
            perm,
            mode,
        } => {
            write_u32(&mut body, *fid);
            write_string(&mut body, name);
            write_u32(&mut body, *perm);
            body.push(*mode);
            TCREATE
        }
        Tmessage::Read { fid, offset, count } => {
            write_u32(&mut body, *fid);
            write_u64(&mut body, *offset);
            write_u32(&mut body, *count);
            TREAD
        }
        Tmessage::Write { fid, offset, data } => {
            write_u32(&mut body, *fid);
            write_u64(&mut body, *offset);
            write_u32(&mut body, data.len() as u32);
            body.extend_from_slice(data);
            TWRITE
        }
        Tmessage::Clunk { fid } => {
            write_u32(&mut body, *fid);
            TCLUNK
        }
        Tmessage::Remove { fid } => {
            write_u32(&mut body, *fid);
            TREMOVE
        }
        Tmessage::Stat { fid } => {
            write_u32(&mut body, *fid);
            TSTAT
        }
        Tmessage::Wstat { fid, stat } => {
            write_u32(&mut body, *fid);
            write_u16(&mut body, stat.len() as u16);
            body.extend_from_slice(stat);
            TWSTAT
        }
    };

    let mut frame = Vec::with_capacity(body.len() + 7);
    write_u32(&mut frame, (body.len() + 7) as u32);
    frame.push(mtype);
    write_u16(&mut frame, tag);
    frame.extend_from_slice(&body);
    frame
}

/// Read one framed R-message (client side). Returns `(tag, message)`.
pub async fn read_rmessage<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<(u16, Rmessage), NinepError> {
    let frame = read_frame(reader).await?;
    decode_rmessage(&frame)
}

/// Decode one R-message from a frame (type byte + tag + body).
pub fn decode_rmessage(frame: &[u8]) -> Result<(u16, Rmessage), NinepError> {
    let mut cur = Cursor::new(frame);
    let mtype = ReadBytesExt::read_u8(&mut cur)?;
    let tag = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?;

    let msg = match mtype {
        RVERSION => Rmessage::Version {
            msize: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
            version: read_string(&mut cur)?,
        },
        RERROR => Rmessage::Error {
            ename: read_string(&mut cur)?,
        },
        RATTACH => Rmessage::Attach {
            qid: read_qid(&mut cur)?,
        },
        RFLUSH => Rmessage::Flush,
        RWALK => {
            let n = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)?;
            let mut wqids = Vec::with_capacity(n as usize);
            for _ in 0..n {
                wqids.push(read_qid(&mut cur)?);
            }
            Rmessage::Walk { wqids }
        }
        ROPEN => Rmessage::Open {
            qid: read_qid(&mut cur)?,
            iounit: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
        },
        RREAD => {
            let count = ReadBytesExt::read_u32::<LittleEndian>(&mut cur)? as usize;
            let mut data = vec![0u8; count];
            std::io::Read::read_exact(&mut cur, &mut data)
                .map_err(|_| NinepError::Malformed { what: "Rread data" })?;
            Rmessage::Read { data }
        }
        RWRITE => Rmessage::Write {
            count: ReadBytesExt::read_u32::<LittleEndian>(&mut cur)?,
        },
        RCLUNK => Rmessage::Clunk,
        RREMOVE => Rmessage::Remove,
        RSTAT => {
            let n = ReadBytesExt::read_u16::<LittleEndian>(&mut cur)? as usize;
            let mut stat_bytes = vec![0u8; n];
            std::io::Read::read_exact(&mut cur, &mut stat_bytes)
                .map_err(|_| NinepError::Malformed { what: "Rstat stat" })?;
            Rmessage::Stat {
                stat: decode_stat(&stat_bytes)?,
            }
        }
        other => return Err(NinepError::UnknownType(other)),
    };

    Ok((tag, msg))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
