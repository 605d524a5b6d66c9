//! Accept loop, path resolution, and the per-connection request handler
//!
//! One thread owns the listening socket and feeds accepted connections
//! into the shared [`ConnQueue`]; the [`WorkerPool`] drains it and runs
//! [`handle_conn`] synchronously, one connection per worker at a time.
//! The queue is the only shared mutable state between the two sides.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::log::{TransferLog, TransferLogEntry, TransferStatus};
use crate::logger::{Logger, NoopLogger};
use crate::protocol::{timeouts, MAX_PACKET_SIZE, MAX_REQUEST_LINE};
use crate::queue::ConnQueue;
use crate::pool::WorkerPool;
use crate::wire::{encode_header, send_payload};

const MSG_NOT_FOUND: &str = "-> REQUESTED FILE NOT FOUND\n-> CLOSING CONNECTION\n";
const MSG_UNREADABLE: &str = "-> UNABLE TO ACCESS REQUESTED FILE\n-> CLOSING CONNECTION\n";
const MSG_EMPTY: &str = "-> REQUESTED FILE IS EMPTY\n-> CLOSING CONNECTION\n";
const MSG_TOO_LARGE: &str = "-> REQUESTED FILE TOO LARGE\n-> CLOSING CONNECTION\n";

/// Server configuration shared by the accept loop and every worker.
pub struct ServeOpts {
    /// Confinement root. `None` preserves the classic behavior: any
    /// path the daemon process can read is servable.
    pub root: Option<PathBuf>,
    /// Worker count; 0 = one per CPU.
    pub workers: usize,
    pub logger: Arc<dyn Logger>,
    pub transfer_log: Option<TransferLog>,
}

impl Default for ServeOpts {
    fn default() -> Self {
        ServeOpts {
            root: None,
            workers: crate::protocol::DEFAULT_WORKERS,
            logger: Arc::new(NoopLogger),
            transfer_log: None,
        }
    }
}

/// Resolve a requested path under a confinement root. Rejects NUL
/// bytes, absolute paths, and any `..` component before touching the
/// filesystem, then canonicalizes and verifies the result still lives
/// under `root` (symlinks may otherwise point outside it).
pub fn resolve_under_root(root: &Path, req: &Path) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    if req.to_string_lossy().contains('\0') {
        bail!("path contains NUL byte");
    }

    let mut safe = PathBuf::new();
    for component in req.components() {
        match component {
            CurDir => {}
            Normal(s) => safe.push(s),
            ParentDir | RootDir | Prefix(_) => {
                bail!("path contains disallowed component: {:?}", component);
            }
        }
    }

    let joined = root.join(&safe);
    let resolved = joined
        .canonicalize()
        .map_err(|e| anyhow!("failed to canonicalize {:?}: {}", joined, e))?;

    if !resolved.starts_with(root) {
        bail!("path {:?} escapes root {:?}", req, root);
    }

    Ok(resolved)
}

/// Resolve a request with no confinement root: canonicalize the raw
/// path as-is, absolute or relative to the daemon's working directory.
pub fn resolve_unconfined(req: &Path) -> Result<PathBuf> {
    if req.to_string_lossy().contains('\0') {
        bail!("path contains NUL byte");
    }
    req.canonicalize()
        .map_err(|e| anyhow!("failed to canonicalize {:?}: {}", req, e))
}

/// Read the newline-terminated request line, bounded by
/// `MAX_REQUEST_LINE`. Zero bytes before any data means the peer
/// closed without sending a request.
pub fn read_request_line<R: Read>(r: &mut R) -> Result<String> {
    let mut buf = vec![0u8; MAX_REQUEST_LINE];
    let mut filled = 0usize;
    loop {
        let n = r
            .read(&mut buf[filled..])
            .context("failed to read request")?;
        if n == 0 {
            if filled == 0 {
                bail!("peer closed before sending a request");
            }
            break;
        }
        filled += n;
        if buf[..filled].contains(&b'\n') || filled == buf.len() {
            break;
        }
    }
    let line = match buf[..filled].iter().position(|&b| b == b'\n') {
        Some(pos) => &buf[..pos],
        None => &buf[..filled],
    };
    let line = std::str::from_utf8(line).context("request is not valid UTF-8")?;
    Ok(line.trim_end_matches('\r').to_string())
}

fn send_diagnostic(stream: &mut TcpStream, msg: &str) -> Result<()> {
    stream.write_all(&encode_header(0))?;
    stream.write_all(msg.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Drive one connection through its full lifecycle: read the request,
/// resolve the path, stream header + payload or a zero-header
/// diagnostic, then drop (close) the stream. Errors stay local to this
/// connection.
pub fn handle_conn(mut stream: TcpStream, opts: &ServeOpts) {
    let peer = stream
        .peer_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));

    let requested = match read_request_line(&mut stream) {
        Ok(line) => line,
        Err(e) => {
            opts.logger.error("request", &e.to_string());
            eprintln!("conn {}: {}", peer, e);
            return;
        }
    };
    opts.logger.request(&peer, &requested);
    let mut entry = TransferLogEntry::new(peer.to_string(), requested.clone());

    let outcome = serve_file(&mut stream, &requested, opts, &peer, &mut entry);
    if let Err(e) = outcome {
        opts.logger.error("transfer", &e.to_string());
        eprintln!("conn {}: transfer failed: {}", peer, e);
        entry.error = Some(e.to_string());
    }
    if let Some(ref log) = opts.transfer_log {
        if let Err(e) = log.add_entry(&entry) {
            opts.logger.error("transfer-log", &e.to_string());
        }
    }
    // stream drops here, closing the connection in every outcome
}

fn serve_file(
    stream: &mut TcpStream,
    requested: &str,
    opts: &ServeOpts,
    peer: &SocketAddr,
    entry: &mut TransferLogEntry,
) -> Result<()> {
    let req_path = Path::new(requested);
    let resolved = match &opts.root {
        Some(root) => resolve_under_root(root, req_path),
        None => resolve_unconfined(req_path),
    };
    let path = match resolved {
        Ok(p) => p,
        Err(e) => {
            opts.logger.rejected(peer, requested, &e.to_string());
            entry.status = TransferStatus::NotFound;
            entry.error = Some(e.to_string());
            return send_diagnostic(stream, MSG_NOT_FOUND);
        }
    };
    entry.resolved = Some(path.clone());

    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            opts.logger.rejected(peer, requested, &e.to_string());
            entry.status = TransferStatus::Unreadable;
            entry.error = Some(e.to_string());
            return send_diagnostic(stream, MSG_UNREADABLE);
        }
    };
    let meta = file.metadata().context("failed to stat file")?;
    if !meta.is_file() {
        opts.logger.rejected(peer, requested, "not a regular file");
        entry.status = TransferStatus::Unreadable;
        return send_diagnostic(stream, MSG_UNREADABLE);
    }
    let len = meta.len();
    if len == 0 {
        // Header value 0 is the wire's error signal, so an empty file
        // cannot be expressed as a successful transfer.
        opts.logger.rejected(peer, requested, "zero-length file");
        entry.status = TransferStatus::Empty;
        return send_diagnostic(stream, MSG_EMPTY);
    }
    if len > u32::MAX as u64 {
        opts.logger
            .rejected(peer, requested, "exceeds 4 GiB header limit");
        entry.status = TransferStatus::Unreadable;
        return send_diagnostic(stream, MSG_TOO_LARGE);
    }

    stream
        .set_write_timeout(Some(timeouts::write_deadline(len)))
        .ok();

    stream.write_all(&encode_header(len as u32))?;
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let mut sent = 0u64;
    while sent < len {
        let n = file.read(&mut buf).context("failed to read file")?;
        if n == 0 {
            bail!("file truncated while streaming: {} of {} bytes", sent, len);
        }
        send_payload(stream, &buf[..n], MAX_PACKET_SIZE)?;
        sent += n as u64;
    }
    stream.flush()?;

    entry.status = TransferStatus::Completed;
    entry.bytes_sent = sent;
    opts.logger.served(peer, &path, sent);
    Ok(())
}

/// Wakes and stops a running [`Server`]. Clone-able; safe to trigger
/// from a signal handler thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // The accept call blocks; poke it awake with a throwaway
        // loopback connection so the loop observes the flag.
        let _ = TcpStream::connect_timeout(&self.addr, Duration::from_millis(200));
    }
}

pub struct Server {
    listener: TcpListener,
    opts: Arc<ServeOpts>,
    stop: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(bind: &str, opts: ServeOpts) -> Result<Self> {
        let listener = TcpListener::bind(bind).with_context(|| format!("bind {}", bind))?;
        Ok(Server {
            listener,
            opts: Arc::new(opts),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            stop: Arc::clone(&self.stop),
            addr: self.local_addr()?,
        })
    }

    /// Run the accept loop until [`ShutdownHandle::stop`] is called.
    /// Queued and in-flight connections finish before this returns.
    pub fn run(self) -> Result<()> {
        let queue: Arc<ConnQueue<TcpStream>> = Arc::new(ConnQueue::new());
        let opts = Arc::clone(&self.opts);
        let pool = WorkerPool::start(self.opts.workers, Arc::clone(&queue), move |stream| {
            handle_conn(stream, opts.as_ref());
        });
        eprintln!(
            "fgetd listening on {} workers={} root={}",
            self.listener.local_addr()?,
            pool.worker_count(),
            self.opts
                .root
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unconfined>".to_string()),
        );

        for conn in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                // Drop the wakeup (or raced) connection unserved
                break;
            }
            match conn {
                Ok(stream) => {
                    tune_socket(&stream);
                    queue.push(stream);
                }
                Err(e) => {
                    eprintln!("accept error: {}", e);
                }
            }
        }

        eprintln!("fgetd draining {} queued connection(s)", queue.len());
        pool.shutdown();
        Ok(())
    }
}

// Socket tuning: disable Nagle and bound how long a stalled peer can
// pin a worker. The write deadline is rescaled per transfer once the
// payload size is known.
fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(timeouts::read_deadline(MAX_REQUEST_LINE as u64)));
    let _ = stream.set_write_timeout(Some(timeouts::write_deadline(0)));
}
