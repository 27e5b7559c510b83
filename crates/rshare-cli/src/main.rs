//! Rshare CLI - ephemeral file sharing with short numeric codes
//!
//! A sender uploads files to an Rshare server and gets a 6-digit code; a
//! receiver anywhere uses the code to download the same files.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a server
//! rshare serve
//!
//! # Share files
//! rshare send ./document.pdf
//!
//! # Receive files (on another machine)
//! rshare receive 042917
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Status(args) => commands::status::run(args).await,
        Command::Cancel(args) => commands::cancel::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,rshare=info,rshare_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
