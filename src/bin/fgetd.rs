use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use fget::cli::DaemonOpts;
use fget::log::TransferLog;
use fget::logger::{Logger, NoopLogger, TextLogger};
use fget::server::{ServeOpts, Server};

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();

    let root = match opts.root {
        Some(ref r) => {
            if !r.exists() {
                anyhow::bail!("Error: Root directory does not exist: {}", r.display());
            }
            if !r.is_dir() {
                anyhow::bail!("Error: Root path is not a directory: {}", r.display());
            }
            let canonical = std::fs::canonicalize(r)
                .with_context(|| format!("Failed to canonicalize root path: {}", r.display()))?;
            Some(canonical)
        }
        None => None,
    };

    println!("Starting fget daemon:");
    println!("  Bind: {}", opts.bind);
    match root {
        Some(ref r) => println!("  Root: {}", r.display()),
        None => {
            println!("  Root: <unconfined>");
            eprintln!("WARNING: no --root given; any file readable by this process is servable");
            eprintln!("   Only use on trusted networks (LAN)");
        }
    }
    if opts.bind.starts_with("0.0.0.0") {
        eprintln!("WARNING: binding to 0.0.0.0 exposes the daemon to all network interfaces");
        eprintln!("   This protocol is unencrypted and unauthenticated");
    }

    let logger: Arc<dyn Logger> = if let Some(ref p) = opts.log_file {
        match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(_) => Arc::new(NoopLogger),
        }
    } else {
        Arc::new(NoopLogger)
    };

    let server = Server::bind(
        &opts.bind,
        ServeOpts {
            root,
            workers: opts.workers,
            logger,
            transfer_log: opts.transfer_log.as_ref().map(TransferLog::new),
        },
    )?;

    let handle = server.handle()?;
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down, letting in-flight transfers finish...");
        handle.stop();
    })
    .expect("Error setting Ctrl-C handler");

    server.run()
}
