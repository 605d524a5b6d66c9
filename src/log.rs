//! JSONL transfer log: one machine-readable record per served request

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    NotFound,
    Unreadable,
    Empty,
    Failed,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub peer: String,
    pub requested: String,
    pub resolved: Option<PathBuf>,
    pub status: TransferStatus,
    pub bytes_sent: u64,
    pub error: Option<String>,
}

impl TransferLogEntry {
    pub fn new(peer: String, requested: String) -> Self {
        TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            peer,
            requested,
            resolved: None,
            status: TransferStatus::Failed,
            bytes_sent: 0,
            error: None,
        }
    }
}

pub struct TransferLog {
    log_file_path: PathBuf,
}

impl TransferLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        TransferLog {
            log_file_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer log file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer log file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
