//! MCP Auth Registry
//!
//! Trust-and-access control plane for an MCP tool-server fleet: bearer/session
//! authentication against Cognito or Keycloak, scope-based authorization,
//! self-signed token issuance, an on-disk credential vault with a background
//! refresher, and semantic tool discovery over a vector index.

#![forbid(unsafe_code)]

pub mod auth_engine;
pub mod cli;
pub mod config;
pub mod config_gen;
pub mod discovery;
pub mod error;
pub mod http;
pub mod metrics;
pub mod policy;
pub mod principal;
pub mod provider;
pub mod refresher;
pub mod rpc;
pub mod session;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Set up the global tracing subscriber from the CLI's log level/format.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).init(),
        _ => subscriber.with(fmt::layer()).init(),
    }

    Ok(())
}
