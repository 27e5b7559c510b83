//! Status command implementation.

use std::time::Duration;

use anyhow::Result;

use rshare_core::code::ShareCode;
use rshare_core::file::format_size;

use super::StatusArgs;
use crate::client::{ApiClient, Snapshot};
use crate::ui::format_remaining;

/// Run the status command.
pub async fn run(args: StatusArgs) -> Result<()> {
    let global_config = super::load_config();
    let code = ShareCode::parse(&args.code, global_config.session.code_length)?;
    let client = ApiClient::new(&args.server.server)?;

    let snapshot = client.snapshot(code.as_str()).await?;

    if args.json {
        let output = serde_json::json!({
            "code": snapshot.code,
            "status": snapshot.status,
            "expires_in_secs": snapshot.expires_in_secs,
            "active_downloaders": snapshot.active_downloaders,
            "bytes_transferred": snapshot.bytes_transferred,
            "total_bytes": snapshot.total_bytes,
            "files": snapshot.files.iter().map(|f| serde_json::json!({
                "name": f.file_name,
                "status": f.status,
                "bytes_transferred": f.bytes_transferred,
                "total_bytes": f.total_bytes,
                "sha256": f.checksum,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_snapshot(&snapshot);
    }

    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!();
    println!("  Code:        {}", snapshot.code);
    println!("  Status:      {}", snapshot.status);
    println!(
        "  Expires in:  {}",
        format_remaining(Duration::from_secs(snapshot.expires_in_secs))
    );
    println!("  Downloaders: {}", snapshot.active_downloaders);
    println!(
        "  Uploaded:    {} / {} ({:.1}%)",
        format_size(snapshot.bytes_transferred),
        format_size(snapshot.total_bytes),
        percentage(snapshot.bytes_transferred, snapshot.total_bytes)
    );
    println!();

    println!("  {:<4} {:<32} {:>10} {:>10}  {}", "#", "NAME", "SIZE", "DONE", "STATUS");
    for file in &snapshot.files {
        println!(
            "  {:<4} {:<32} {:>10} {:>9.1}%  {}",
            file.index,
            truncate(&file.file_name, 32),
            format_size(file.total_bytes),
            percentage(file.bytes_transferred, file.total_bytes),
            file.status
        );
    }
    println!();
}

#[allow(clippy::cast_precision_loss)]
fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let head: String = name.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
