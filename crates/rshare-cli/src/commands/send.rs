//! Send command implementation.
//!
//! Declares the files to the server, prints the share code, then uploads
//! each file. An interrupted upload resumes from the byte count the server
//! already holds.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use rshare_core::file::format_size;

use super::SendArgs;
use crate::client::{describe_file, ApiClient, Ticket};
use crate::ui::{file_icon, format_remaining, print_progress, CodeBox};

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let client = ApiClient::new(&args.server.server)?;

    let files = args
        .paths
        .iter()
        .map(|path| describe_file(path))
        .collect::<Result<Vec<_>>>()?;
    let total_size: u64 = files.iter().map(|f| f.size_bytes).sum();

    if !args.quiet && !args.json {
        println!();
        println!("Rshare v{}", rshare_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
    }

    let ticket = client.create_session(files).await?;
    display_share_info(&ticket, total_size, &args)?;

    let start_time = Instant::now();
    for (index, path) in args.paths.iter().enumerate() {
        if let Err(e) = upload_with_retries(&client, &ticket, index, path, &args).await {
            if !args.quiet && !args.json {
                eprintln!();
                eprintln!("  Transfer failed: {}", e);
                eprintln!();
            }
            return Err(e);
        }
    }

    if args.json {
        let output = serde_json::json!({
            "status": "complete",
            "code": ticket.code,
            "total_transferred": total_size,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        println!();
        println!(
            "  Upload complete! {} in {}s",
            format_size(total_size),
            start_time.elapsed().as_secs()
        );
        println!("  Receivers can now fetch code {}", ticket.code);
        println!();
    }

    Ok(())
}

/// Display the share code and file list.
fn display_share_info(ticket: &Ticket, total_size: u64, args: &SendArgs) -> Result<()> {
    if args.json {
        let output = serde_json::json!({
            "code": ticket.code,
            "expires_at": ticket.expires_at,
            "files": ticket.files.iter().map(|f| serde_json::json!({
                "name": f.name,
                "size": f.size_bytes,
                "mime_type": f.mime_type,
            })).collect::<Vec<_>>(),
            "total_size": total_size,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if args.quiet {
        println!("{}", ticket.code);
        return Ok(());
    }

    println!(
        "  Sharing {} items ({})",
        ticket.files.len(),
        format_size(total_size)
    );
    println!();
    for file in &ticket.files {
        println!("  {} {}", file_icon(&file.mime_type), file.name);
    }
    println!();

    let expire = format_remaining(Duration::from_secs(ticket.expires_in_secs));
    CodeBox::new(&ticket.code).with_expire(&expire).display();
    println!();

    Ok(())
}

/// Upload one file, resuming after failures up to `args.retries` times.
async fn upload_with_retries(
    client: &ApiClient,
    ticket: &Ticket,
    index: usize,
    path: &Path,
    args: &SendArgs,
) -> Result<()> {
    let file = ticket
        .files
        .get(index)
        .with_context(|| format!("Server did not accept {}", path.display()))?;
    let show_progress = !args.quiet && !args.json;
    let mut offset = 0;
    let mut attempt = 0;

    loop {
        if show_progress {
            print_progress(&file.name, offset, file.size_bytes);
        }

        match client.upload(&ticket.code, index, path, offset).await {
            Ok(response) if response.complete => {
                if show_progress {
                    print_progress(&file.name, response.bytes_received, file.size_bytes);
                    println!();
                }
                return Ok(());
            }
            Ok(response) => {
                tracing::warn!(
                    "Upload of {} stopped at {} of {} bytes",
                    file.name,
                    response.bytes_received,
                    file.size_bytes
                );
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {:#}", file.name, e);
            }
        }

        attempt += 1;
        if attempt >= args.retries.max(1) {
            bail!("Giving up on {} after {} attempts", file.name, attempt);
        }

        let snapshot = client.snapshot(&ticket.code).await?;
        offset = snapshot
            .files
            .get(index)
            .map_or(0, |f| f.bytes_transferred);
        tracing::info!("Resuming {} at byte {}", file.name, offset);
    }
}
