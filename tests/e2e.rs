//! End-to-end transfers against a live server on loopback

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use fget::client::{self, Reply};
use fget::logger::NoopLogger;
use fget::protocol::MAX_PACKET_SIZE;
use fget::server::{ServeOpts, Server, ShutdownHandle};

fn write_file(path: &std::path::Path, size: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::File::create(path)?;
    let mut val: u8 = 0;
    let mut buf = vec![0u8; 1024 * 64];
    let mut remaining = size;
    while remaining > 0 {
        for b in buf.iter_mut() {
            *b = val;
            val = val.wrapping_add(1);
        }
        let n = remaining.min(buf.len());
        f.write_all(&buf[..n])?;
        remaining -= n;
    }
    Ok(())
}

fn start_server(root: Option<PathBuf>, workers: usize) -> (u16, ShutdownHandle, JoinHandle<()>) {
    let server = Server::bind(
        "127.0.0.1:0",
        ServeOpts {
            root,
            workers,
            logger: Arc::new(NoopLogger),
            transfer_log: None,
        },
    )
    .expect("bind");
    let port = server.local_addr().expect("addr").port();
    let handle = server.handle().expect("handle");
    let join = std::thread::spawn(move || {
        let _ = server.run();
    });
    (port, handle, join)
}

fn fetch_once(port: u16, path: &str) -> Result<Reply> {
    let mut stream = client::connect("127.0.0.1", port)?;
    client::fetch(&mut stream, path)
}

fn expected_pattern(size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; 1024 * 64];
    let mut out = Vec::with_capacity(size);
    let mut val: u8 = 0;
    let mut remaining = size;
    while remaining > 0 {
        for b in buf.iter_mut() {
            *b = val;
            val = val.wrapping_add(1);
        }
        let n = remaining.min(buf.len());
        out.extend_from_slice(&buf[..n]);
        remaining -= n;
    }
    out
}

#[test]
fn small_file_transfer_and_save() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("hostname"), 10)?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 4);

    let reply = fetch_once(port, "hostname")?;
    let data = match reply {
        Reply::File(d) => d,
        Reply::Message(m) => panic!("expected file, got message: {}", m),
    };
    assert_eq!(data, expected_pattern(10));

    // Client-side save under the request's final component
    let dl = tempfile::tempdir()?;
    let dest = dl.path().join(client::local_name("hostname")?);
    assert!(client::save_to_disk(&dest, &data, false, || {
        panic!("no prompt expected")
    })?);
    assert_eq!(std::fs::read(&dest)?.len(), 10);

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn file_of_exactly_one_chunk() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("one_chunk.bin"), MAX_PACKET_SIZE)?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);

    match fetch_once(port, "one_chunk.bin")? {
        Reply::File(d) => assert_eq!(d, expected_pattern(MAX_PACKET_SIZE)),
        Reply::Message(m) => panic!("unexpected message: {}", m),
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn file_of_one_chunk_plus_one_byte() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("nested/chunk_plus.bin"), MAX_PACKET_SIZE + 1)?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);

    match fetch_once(port, "nested/chunk_plus.bin")? {
        Reply::File(d) => {
            assert_eq!(d.len(), MAX_PACKET_SIZE + 1);
            assert_eq!(d, expected_pattern(MAX_PACKET_SIZE + 1));
        }
        Reply::Message(m) => panic!("unexpected message: {}", m),
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn large_file_many_chunks() -> Result<()> {
    let root = tempfile::tempdir()?;
    // Crosses many chunk boundaries with a remainder
    let size = MAX_PACKET_SIZE * 2048 + 37;
    write_file(&root.path().join("big.bin"), size)?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);

    match fetch_once(port, "big.bin")? {
        Reply::File(d) => {
            assert_eq!(d.len(), size);
            assert_eq!(d, expected_pattern(size));
        }
        Reply::Message(m) => panic!("unexpected message: {}", m),
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn missing_file_yields_zero_header_message() -> Result<()> {
    let root = tempfile::tempdir()?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);

    match fetch_once(port, "no/such/file.txt")? {
        Reply::Message(m) => assert!(m.contains("NOT FOUND"), "got: {}", m),
        Reply::File(_) => panic!("expected a diagnostic message"),
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn traversal_outside_root_is_rejected() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("ok.txt"), 5)?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);

    for req in ["../../etc/passwd", "/etc/passwd", "ok.txt/../../../etc/passwd"] {
        match fetch_once(port, req)? {
            Reply::Message(m) => assert!(m.contains("NOT FOUND"), "req {}: {}", req, m),
            Reply::File(_) => panic!("traversal request {} served a file", req),
        }
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn empty_file_reported_as_diagnostic() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("empty.bin"), 0)?;
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);

    match fetch_once(port, "empty.bin")? {
        Reply::Message(m) => assert!(m.contains("EMPTY"), "got: {}", m),
        Reply::File(_) => panic!("expected a diagnostic message"),
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn unconfined_mode_serves_absolute_paths() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("served.bin");
    write_file(&file, 100)?;
    let (port, handle, join) = start_server(None, 2);

    match fetch_once(port, &file.display().to_string())? {
        Reply::File(d) => assert_eq!(d, expected_pattern(100)),
        Reply::Message(m) => panic!("unexpected message: {}", m),
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn concurrent_clients_all_served() -> Result<()> {
    let root = tempfile::tempdir()?;
    for i in 0..8 {
        write_file(&root.path().join(format!("f{}.bin", i)), 1000 + i)?;
    }
    let (port, handle, join) = start_server(Some(root.path().to_path_buf()), 4);

    let mut clients = Vec::new();
    for i in 0..8usize {
        clients.push(std::thread::spawn(move || -> Result<usize> {
            match fetch_once(port, &format!("f{}.bin", i))? {
                Reply::File(d) => Ok(d.len()),
                Reply::Message(m) => anyhow::bail!("unexpected message: {}", m),
            }
        }));
    }
    for (i, c) in clients.into_iter().enumerate() {
        assert_eq!(c.join().unwrap()?, 1000 + i);
    }

    handle.stop();
    join.join().unwrap();
    Ok(())
}

#[test]
fn shutdown_stops_accept_loop() -> Result<()> {
    let root = tempfile::tempdir()?;
    let (_port, handle, join) = start_server(Some(root.path().to_path_buf()), 2);
    handle.stop();
    join.join().unwrap();
    Ok(())
}
