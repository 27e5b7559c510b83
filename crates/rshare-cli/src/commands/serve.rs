//! Serve command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use rshare_core::config::{parse_duration, Config, StorageBackend};
use rshare_core::transfer::TransferCoordinator;
use rshare_core::web::{WebServer, WebServerConfig};

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config();
    apply_overrides(&mut config, &args)?;

    let coordinator =
        Arc::new(TransferCoordinator::new(config.clone()).context("Invalid configuration")?);

    println!();
    println!("Rshare v{}", rshare_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();

    let server_config = WebServerConfig::from(&config.web);
    println!("  Listening on http://{}", server_config.bind_addr());
    println!(
        "  Sessions live for {}",
        humantime_like(config.session.session_ttl.as_secs())
    );
    println!();

    let shutdown = CancellationToken::new();
    let sweeper = coordinator.spawn_sweeper(shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
            shutdown.cancel();
        });
    }

    let server = WebServer::new(server_config, Arc::clone(&coordinator));
    let result = server.start(shutdown.clone()).await;

    shutdown.cancel();
    let _ = sweeper.await;

    result.context("Web server failed")
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &ServeArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if args.localhost_only {
        config.web.localhost_only = true;
    }
    if let Some(ttl) = &args.ttl {
        config.session.session_ttl = parse_duration(ttl)
            .with_context(|| format!("Invalid TTL '{ttl}' (expected e.g. 30m, 24h, 7d)"))?;
    }
    if args.single_use {
        config.session.single_use = true;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    if let Some(dir) = &args.spool_dir {
        config.storage.backend = StorageBackend::Disk;
        config.storage.spool_dir = Some(dir.clone());
    }
    Ok(())
}

fn humantime_like(secs: u64) -> String {
    match secs {
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3600 == 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}
