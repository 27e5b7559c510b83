//! Receive command implementation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use rshare_core::code::ShareCode;
use rshare_core::file::{format_size, validate_file_name};
use rshare_core::web::CHECKSUM_HEADER;

use super::ReceiveArgs;
use crate::client::{ApiClient, FileStatus};
use crate::ui::{file_icon, print_progress};

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let global_config = super::load_config();
    let code = ShareCode::parse(&args.code, global_config.session.code_length)?;
    let client = ApiClient::new(&args.server.server)?;
    let show_progress = !args.quiet && !args.json;

    if show_progress {
        println!();
        println!("Rshare v{}", rshare_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Looking up code {}...", code.as_str());
        println!();
    }

    let snapshot = client.snapshot(code.as_str()).await?;
    let output_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Cannot create {}", output_dir.display()))?;

    for file in &snapshot.files {
        validate_file_name(&file.file_name)?;
        let target = output_dir.join(&file.file_name);
        if target.exists() && !args.force {
            bail!(
                "{} already exists (use --force to overwrite)",
                target.display()
            );
        }
    }

    if show_progress {
        println!(
            "  Receiving {} items ({})",
            snapshot.files.len(),
            format_size(snapshot.total_bytes)
        );
        println!();
        for file in &snapshot.files {
            println!("  {} {}", file_icon(&file.mime_type), file.file_name);
        }
        println!();
    }

    let start_time = Instant::now();
    let mut saved = Vec::with_capacity(snapshot.files.len());
    for file in &snapshot.files {
        let target = output_dir.join(&file.file_name);
        let checksum = receive_file(&client, code.as_str(), file, &target, &args).await?;
        saved.push((target, checksum));
    }

    if args.json {
        let output = serde_json::json!({
            "status": "complete",
            "code": code.as_str(),
            "files": saved.iter().map(|(path, checksum)| serde_json::json!({
                "path": path.display().to_string(),
                "sha256": checksum,
            })).collect::<Vec<_>>(),
            "total_transferred": snapshot.total_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        println!();
        println!(
            "  Transfer complete! {} in {}s",
            format_size(snapshot.total_bytes),
            start_time.elapsed().as_secs()
        );
        println!("  Saved to {}", output_dir.display());
        println!();
    }

    Ok(())
}

/// Download one file to `target`, verifying its SHA-256.
///
/// Bytes are written to a `.part` file that is renamed into place only once
/// the checksum matches.
async fn receive_file(
    client: &ApiClient,
    code: &str,
    file: &FileStatus,
    target: &Path,
    args: &ReceiveArgs,
) -> Result<String> {
    let show_progress = !args.quiet && !args.json;
    if show_progress && !args.no_wait && file.bytes_transferred < file.total_bytes {
        println!("  Waiting for {} to finish uploading...", file.file_name);
    }

    let mut response = client.download(code, file.index, !args.no_wait).await?;
    let expected = response
        .headers()
        .get(CHECKSUM_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
        .or_else(|| file.checksum.clone());

    let partial = target.with_file_name(format!("{}.part", file.file_name));
    let mut out = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Cannot create {}", partial.display()))?;

    let mut hasher = Sha256::new();
    let mut received = 0u64;
    let result = async {
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            out.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if show_progress {
                print_progress(&file.file_name, received, file.total_bytes);
            }
        }
        out.flush().await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;
    drop(out);

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.context(format!("Download of {} failed", file.file_name)));
    }
    if show_progress {
        println!();
    }

    let checksum = hex(&hasher.finalize());
    if let Err(e) = verify(file, received, &checksum, expected.as_deref()) {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, target)
        .await
        .with_context(|| format!("Cannot write {}", target.display()))?;
    Ok(checksum)
}

/// Check the received length and digest against what the server declared.
fn verify(file: &FileStatus, received: u64, checksum: &str, expected: Option<&str>) -> Result<()> {
    if received != file.total_bytes {
        bail!(
            "{} is truncated: got {} of {} bytes",
            file.file_name,
            received,
            file.total_bytes
        );
    }
    let Some(expected) = expected else {
        bail!("Server sent no checksum for {}", file.file_name);
    };
    if !expected.eq_ignore_ascii_case(checksum) {
        bail!("Checksum mismatch for {}", file.file_name);
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(total: u64) -> FileStatus {
        FileStatus {
            index: 0,
            file_name: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            bytes_transferred: total,
            total_bytes: total,
            status: "completed".to_string(),
            checksum: None,
        }
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }

    #[test]
    fn test_verify() {
        let digest = hex(&Sha256::digest(b"hello"));
        assert!(verify(&status(5), 5, &digest, Some(&digest)).is_ok());
        assert!(verify(&status(5), 5, &digest, Some(&digest.to_uppercase())).is_ok());
        assert!(verify(&status(6), 5, &digest, Some(&digest)).is_err());
        assert!(verify(&status(5), 5, &digest, Some("deadbeef")).is_err());
    }

    #[test]
    fn test_verify_requires_checksum() {
        // Snapshot taken while the file was still uploading carries none.
        let mut file = status(5);
        file.bytes_transferred = 2;
        let digest = hex(&Sha256::digest(b"hello"));

        let err = verify(&file, 5, &digest, None).unwrap_err();
        assert!(err.to_string().contains("no checksum"));
    }
}
