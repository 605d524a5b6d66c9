//! Client side of the fget protocol: one request, one response stream

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::protocol::{timeouts, HEADER_LEN, MAX_PACKET_SIZE};
use crate::wire::{decode_header, recv_payload};

/// Server response to a path request.
#[derive(Debug)]
pub enum Reply {
    /// Nonzero header: exactly that many file bytes.
    File(Vec<u8>),
    /// Zero header: human-readable diagnostic, no file data.
    Message(String),
}

pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("no addresses for {}:{}", host, port))?;
    let stream = TcpStream::connect_timeout(&addr, std::time::Duration::from_millis(timeouts::CONNECT_MS))
        .with_context(|| format!("failed to connect to {}", addr))?;
    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(timeouts::read_deadline(0)))
        .ok();
    Ok(stream)
}

/// Send the path request and receive the response. The payload is
/// pulled in `MAX_PACKET_SIZE` chunks; a zero header switches to
/// message mode, reading the diagnostic until the server closes.
pub fn fetch(stream: &mut TcpStream, path: &str) -> Result<Reply> {
    stream
        .write_all(format!("{}\n", path).as_bytes())
        .context("failed to send request")?;
    stream.flush()?;

    let mut hdr = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut hdr)
        .context("failed to read transfer header")?;
    let len = decode_header(hdr);

    if len == 0 {
        let mut msg = String::new();
        stream
            .take(crate::protocol::MAX_REQUEST_LINE as u64)
            .read_to_string(&mut msg)
            .context("failed to read server message")?;
        return Ok(Reply::Message(msg));
    }

    stream
        .set_read_timeout(Some(timeouts::read_deadline(len as u64)))
        .ok();
    let data = recv_payload(stream, len as usize, MAX_PACKET_SIZE)?;
    Ok(Reply::File(data))
}

/// Local filename for a requested path: its final component.
pub fn local_name(requested: &str) -> Result<PathBuf> {
    let name = Path::new(requested)
        .file_name()
        .with_context(|| format!("request {:?} has no file name", requested))?;
    Ok(PathBuf::from(name))
}

/// Decision for an existing destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Yes,
    No,
}

/// Interpret one line of overwrite-confirmation input.
pub fn parse_confirm(input: &str) -> Option<Overwrite> {
    match input.trim() {
        "y" | "Y" => Some(Overwrite::Yes),
        "n" | "N" => Some(Overwrite::No),
        _ => None,
    }
}

/// Write received bytes to `dest`. `confirm` is consulted only when the
/// destination already exists; invalid input re-prompts up to a bounded
/// number of attempts.
pub fn save_to_disk<F>(dest: &Path, data: &[u8], force: bool, mut confirm: F) -> Result<bool>
where
    F: FnMut() -> Result<String>,
{
    if dest.exists() && !force {
        let mut attempts = 0;
        loop {
            let line = confirm()?;
            match parse_confirm(&line) {
                Some(Overwrite::Yes) => break,
                Some(Overwrite::No) => return Ok(false),
                None => {
                    attempts += 1;
                    if attempts >= 5 {
                        bail!("too many invalid confirmation responses");
                    }
                    eprintln!(
                        "Invalid selection, you must either enter 'y' for yes or 'n' for no"
                    );
                }
            }
        }
    }
    std::fs::write(dest, data).with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name_uses_final_component() {
        assert_eq!(local_name("/etc/hostname").unwrap(), PathBuf::from("hostname"));
        assert_eq!(local_name("a/b/c.bin").unwrap(), PathBuf::from("c.bin"));
        assert_eq!(local_name("plain.txt").unwrap(), PathBuf::from("plain.txt"));
        assert!(local_name("..").is_err());
    }

    #[test]
    fn test_parse_confirm() {
        assert_eq!(parse_confirm("y\n"), Some(Overwrite::Yes));
        assert_eq!(parse_confirm(" Y "), Some(Overwrite::Yes));
        assert_eq!(parse_confirm("n"), Some(Overwrite::No));
        assert_eq!(parse_confirm("N\n"), Some(Overwrite::No));
        assert_eq!(parse_confirm("maybe"), None);
        assert_eq!(parse_confirm(""), None);
    }

    #[test]
    fn test_save_new_file_skips_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let wrote = save_to_disk(&dest, b"hello", false, || {
            panic!("must not prompt for a fresh file")
        })
        .unwrap();
        assert!(wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn test_save_existing_declined() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"old").unwrap();
        let wrote = save_to_disk(&dest, b"new", false, || Ok("n".to_string())).unwrap();
        assert!(!wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_save_existing_confirmed_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"old").unwrap();
        let mut answers = vec!["y", "what", ""].into_iter();
        let wrote = save_to_disk(&dest, b"new", false, || {
            Ok(answers.next_back().unwrap().to_string())
        })
        .unwrap();
        assert!(wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_save_bounded_retries() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"old").unwrap();
        let err = save_to_disk(&dest, b"new", false, || Ok("?".to_string())).unwrap_err();
        assert!(err.to_string().contains("too many invalid"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_force_overwrites_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"old").unwrap();
        let wrote = save_to_disk(&dest, b"new", true, || {
            panic!("must not prompt with --force")
        })
        .unwrap();
        assert!(wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }
}
