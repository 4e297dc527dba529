//! Command-line interface for the main server binary

use std::path::PathBuf;

use clap::Parser;

/// Trust-and-access control plane for an MCP tool-server fleet
#[derive(Parser, Debug)]
#[command(name = "mcp-auth-registry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUTH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "AUTH_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AUTH_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTH_LOG_FORMAT")]
    pub log_format: Option<String>,
}
