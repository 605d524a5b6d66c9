//! Shared CLI fragments for the fget and fgetd binaries

use clap::Parser;
use std::path::PathBuf;

/// Daemon options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "fgetd - serve files over the length-prefixed fget protocol")]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value = "0.0.0.0:9041")]
    pub bind: String,

    /// Confine served paths under this root directory.
    /// Without it, any path readable by the daemon process is servable.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Worker threads (0 = auto)
    #[arg(short = 'w', long, default_value_t = crate::protocol::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Write timestamped request lines to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append a JSONL record per request to this file
    #[arg(long = "transfer-log")]
    pub transfer_log: Option<PathBuf>,
}

/// Client options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "fget - retrieve a file from an fgetd server")]
pub struct ClientOpts {
    /// Server hostname or address
    pub host: String,

    /// Server port
    pub port: u16,

    /// File path to request; prompts interactively when omitted
    #[arg(short, long)]
    pub path: Option<String>,

    /// Overwrite an existing local file without asking
    #[arg(short = 'f', long)]
    pub force: bool,
}
