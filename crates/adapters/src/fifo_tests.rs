// SPDX-License-Identifier: MIT

use super::*;
use std::io::Write;

#[test]
fn create_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.pipe");
    std::fs::write(&path, b"stale").unwrap();

    let fifo = Fifo::create(&path).unwrap();
    let meta = std::fs::metadata(fifo.path()).unwrap();
    assert!(!meta.is_file(), "should be a fifo, not a regular file");
}

#[test]
fn drop_unlinks_the_fifo() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.pipe");
    {
        let _fifo = Fifo::create(&path).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());
}

#[tokio::test]
async fn reader_streams_chunks_then_eof() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = Fifo::create(dir.path().join("r.pipe")).unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let _handle = spawn_reader(fifo.path().to_path_buf(), 7, tx);

    let path = fifo.path().to_path_buf();
    let writer = tokio::task::spawn_blocking(move || {
        let mut f = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        f.write_all(b"first").unwrap();
        f.flush().unwrap();
        // Dropping the writer closes the fifo and EOFs the reader
    });
    writer.await.unwrap();

    let mut data = Vec::new();
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.generation, 7);
        match msg.data {
            Some(bytes) => data.extend_from_slice(&bytes),
            None => break,
        }
    }
    assert_eq!(data, b"first");
}

#[tokio::test]
async fn reader_stops_when_receiver_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = Fifo::create(dir.path().join("d.pipe")).unwrap();
    let (tx, rx) = mpsc::channel(1);
    let handle = spawn_reader(fifo.path().to_path_buf(), 1, tx);

    // Open writer, then drop the receiver; reader must exit on next send
    let mut f = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(fifo.path())
        .unwrap();
    drop(rx);
    f.write_all(b"into the void").unwrap();
    f.write_all(b"more").unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
