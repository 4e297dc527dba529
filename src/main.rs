//! MCP Auth Registry — HTTP auth/discovery server binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rand::Rng;
use tracing::{error, info, warn};

use mcp_auth_registry::config::Config;
use mcp_auth_registry::discovery::ToolIndex;
use mcp_auth_registry::http::{AppState, create_router};
use mcp_auth_registry::provider::ProviderAdapter;
use mcp_auth_registry::session::SessionSigner;
use mcp_auth_registry::token::TokenIssuer;
use mcp_auth_registry::{Error, Result, auth_engine::AuthEngine, cli::Cli, policy::Policy, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("failed to set up tracing: {e}");
        return ExitCode::FAILURE;
    }

    mcp_auth_registry::metrics::install();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

/// Resolve the shared HMAC secret, generating and warning about a random
/// one if the operator hasn't configured `signing.secret_key` — every
/// outstanding session and self-signed token becomes invalid the next time
/// this happens.
fn resolve_secret(config: &Config) -> Vec<u8> {
    if let Some(secret) = &config.signing.secret_key {
        return secret.as_bytes().to_vec();
    }

    warn!("signing.secret_key is not configured; generating a random secret for this process only");
    let bytes: [u8; 32] = rand::rng().random();
    bytes.to_vec()
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        provider = ?config.provider.kind,
        "starting mcp-auth-registry"
    );

    let provider = ProviderAdapter::from_config(&config.provider)?;
    let provider_kind = provider.kind_name();
    let policy = Arc::new(Policy::load(config.policy.path.clone())?);
    let secret = resolve_secret(&config);
    let session_signer = Arc::new(SessionSigner::new(secret.clone()));
    let token_issuer = Arc::new(TokenIssuer::new(secret, config.signing.clone()));

    let tool_index = if config.discovery.enabled {
        match ToolIndex::open(&config.discovery) {
            Ok(index) => {
                info!(tools = index.len(), "tool index loaded");
                Some(index)
            }
            Err(e) => {
                warn!(error = %e, "tool index failed to load; /tools/find will be unavailable");
                None
            }
        }
    } else {
        None
    };

    let auth_engine = AuthEngine::new(
        provider,
        Arc::clone(&policy),
        Arc::clone(&session_signer),
        Arc::clone(&token_issuer),
        config.signing.jwt_issuer.clone(),
        config.signing.session_max_age_secs,
        config.provider.max_token_age_secs,
    );

    let addr: std::net::SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address: {e}")))?;

    let state = Arc::new(AppState {
        config,
        auth_engine,
        policy,
        provider_kind,
        session_signer,
        token_issuer,
        tool_index,
        http_client: reqwest::Client::new(),
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    info!("mcp-auth-registry shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
