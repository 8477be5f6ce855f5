//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Identity-gated gateway for embedded Domo dashboards
#[derive(Parser, Debug)]
#[command(name = "hubsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "HUBSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "HUBSYNC_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "HUBSYNC_HOST")]
    pub host: Option<String>,

    /// User-to-embed directory file (JSON)
    #[arg(short, long, env = "HUBSYNC_DIRECTORY", global = true)]
    pub directory: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "HUBSYNC_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "HUBSYNC_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Validate configuration and the embed directory, then exit
    Check,
}
