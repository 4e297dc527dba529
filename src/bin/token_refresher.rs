//! Background token refresher binary: keeps egress credentials in the
//! vault fresh and regenerates downstream client configs as they change.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mcp_auth_registry::config::Config;
use mcp_auth_registry::provider::ProviderAdapter;
use mcp_auth_registry::refresher::{EgressEndpoint, TokenRefresher};
use mcp_auth_registry::token::TokenVault;
use mcp_auth_registry::{Result, setup_tracing};

/// Command-line interface for the background refresher binary
#[derive(Parser, Debug)]
#[command(name = "token-refresher")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AUTH_LOG_LEVEL")]
    log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTH_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("failed to set up tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "refresher error");
            ExitCode::FAILURE
        }
    }
}

fn build_endpoints(config: &Config) -> HashMap<String, EgressEndpoint> {
    config
        .oauth2_providers
        .iter()
        .map(|(name, provider)| {
            (
                name.clone(),
                EgressEndpoint {
                    token_url: provider.token_url.clone(),
                    client_id: provider.client_id.clone(),
                    client_secret: provider.client_secret.clone(),
                },
            )
        })
        .collect()
}

async fn run(config: Config) -> Result<()> {
    info!(interval_secs = config.refresher.interval_secs, "starting token-refresher");

    let vault = Arc::new(TokenVault::open(config.vault.dir.clone())?);
    let endpoints = build_endpoints(&config);
    let provider = match ProviderAdapter::from_config(&config.provider) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            error!(error = %e, "identity provider not configured; ingress M2M refresh will be skipped");
            None
        }
    };
    let refresher = TokenRefresher::new(vault, config.refresher, endpoints, provider);

    refresher.claim_single_instance()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    refresher.run(shutdown_rx).await;
    refresher.release_single_instance();

    info!("token-refresher shutdown complete");
    Ok(())
}
