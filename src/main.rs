//! fget - interactive client for the fgetd file-retrieval daemon
//!
//! Connects, sends one newline-terminated path, and either saves the
//! returned file under its final path component or prints the server's
//! diagnostic message.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;

use fget::cli::ClientOpts;
use fget::client::{self, Reply};

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read input")?;
    Ok(line)
}

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let opts = ClientOpts::parse();

    let requested = match opts.path {
        Some(ref p) => p.clone(),
        None => {
            let line = prompt_line("Enter the name of the file you wish to receive: ")?;
            line.trim_end().to_string()
        }
    };
    if requested.is_empty() {
        anyhow::bail!("no file requested");
    }

    let mut stream = client::connect(&opts.host, opts.port)?;
    match client::fetch(&mut stream, &requested)? {
        Reply::Message(msg) => {
            // Zero header: diagnostic text, nothing to write
            println!("REPLY FROM SERVER:\n{}", msg);
        }
        Reply::File(data) => {
            println!("File size: {}", data.len());
            let dest = client::local_name(&requested)?;
            let wrote = client::save_to_disk(&dest, &data, opts.force, || {
                println!("ALERT:\n\tA file with the same name already exists at destination");
                prompt_line("\tWould you like to overwrite the existing file (y or n) ?\n")
            })?;
            if wrote {
                println!("Received {} bytes, saved to {}", data.len(), dest.display());
            } else {
                println!("Canceling write file operation");
            }
        }
    }
    Ok(())
}
