//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default server URL for client commands.
pub const DEFAULT_SERVER: &str = "http://localhost:8080";

/// Load configuration with graceful fallback to defaults.
///
/// A missing or unreadable config file is not fatal for the CLI; the
/// problem is logged and defaults are used instead.
pub fn load_config() -> rshare_core::config::Config {
    rshare_core::config::Config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring config file: {}", e);
        rshare_core::config::Config::default()
    })
}

pub mod cancel;
pub mod config;
pub mod receive;
pub mod send;
pub mod serve;
pub mod status;

/// Rshare - Ephemeral file sharing with short numeric codes
#[derive(Parser)]
#[command(name = "rshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Upload files and print their share code
    Send(SendArgs),

    /// Download files using a share code
    Receive(ReceiveArgs),

    /// Show progress of a share
    Status(StatusArgs),

    /// Cancel a share
    Cancel(CancelArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments shared by commands that talk to a server
#[derive(Parser)]
pub struct ServerArgs {
    /// Server base URL
    #[arg(short, long, env = "RSHARE_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Only accept connections from this machine
    #[arg(long)]
    pub localhost_only: bool,

    /// Session lifetime (e.g., 30m, 24h; overrides config)
    #[arg(long)]
    pub ttl: Option<String>,

    /// Expire sessions once every file has been downloaded
    #[arg(long)]
    pub single_use: bool,

    /// Keep uploaded bytes in memory instead of spool files
    #[arg(long)]
    pub memory: bool,

    /// Directory for spool files (overrides config)
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Files to share
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Upload attempts per file before giving up
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Share code
    pub code: String,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Output directory for received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fail instead of waiting for files that are still uploading
    #[arg(long)]
    pub no_wait: bool,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the status command
#[derive(Parser)]
pub struct StatusArgs {
    /// Share code
    pub code: String,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the cancel command
#[derive(Parser)]
pub struct CancelArgs {
    /// Share code
    pub code: String,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config actions
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
