use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn request(&self, _peer: &SocketAddr, _path: &str) {}
    fn served(&self, _peer: &SocketAddr, _path: &Path, _bytes: u64) {}
    fn rejected(&self, _peer: &SocketAddr, _path: &str, _reason: &str) {}
    fn error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn request(&self, peer: &SocketAddr, path: &str) {
        self.line(&format!("REQUEST peer={} path={}", peer, path));
    }
    fn served(&self, peer: &SocketAddr, path: &Path, bytes: u64) {
        self.line(&format!(
            "SERVED peer={} path={} bytes={}",
            peer,
            path.display(),
            bytes
        ));
    }
    fn rejected(&self, peer: &SocketAddr, path: &str, reason: &str) {
        self.line(&format!(
            "REJECT peer={} path={} reason={}",
            peer, path, reason
        ));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
}
