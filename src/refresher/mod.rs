//! Background supervisor that keeps egress credentials in the token vault
//! fresh and regenerates downstream client configs as servers' credentials
//! change.

pub mod pidfile;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::{AgentCoreConfig, RefresherConfig};
use crate::error::{Error, Result};
use crate::provider::ProviderAdapter;
use crate::token::vault::{StoredTokenRecord, TokenVault};

/// Fields needed to refresh one OAuth2 egress credential, read alongside
/// the stored record (in a real deployment, kept in a small sidecar
/// manifest next to each vault file; here, threaded through from config).
#[derive(Debug, Clone)]
pub struct EgressEndpoint {
    /// Token endpoint to POST the refresh grant to
    pub token_url: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Runs the periodic scan/refresh/regenerate cycle and the PID-file
/// single-instance lifecycle.
pub struct TokenRefresher {
    vault: Arc<TokenVault>,
    config: RefresherConfig,
    http: reqwest::Client,
    endpoints: HashMap<String, EgressEndpoint>,
    provider: Option<Arc<ProviderAdapter>>,
}

impl TokenRefresher {
    /// Build a refresher over an already-open vault. `provider` is used to
    /// mint the ingress M2M token; pass `None` to skip ingress refresh
    /// (e.g. in tests that only exercise egress OAuth).
    #[must_use]
    pub fn new(
        vault: Arc<TokenVault>,
        config: RefresherConfig,
        endpoints: HashMap<String, EgressEndpoint>,
        provider: Option<Arc<ProviderAdapter>>,
    ) -> Self {
        Self {
            vault,
            config,
            http: reqwest::Client::new(),
            endpoints,
            provider,
        }
    }

    /// Acquire single-instance ownership (killing a prior instance if
    /// still alive) and write this process's PID file.
    pub fn claim_single_instance(&self) -> Result<()> {
        pidfile::kill_existing_instance(&self.config.pid_file);
        pidfile::write_pidfile(&self.config.pid_file)
    }

    /// Release single-instance ownership on shutdown.
    pub fn release_single_instance(&self) {
        pidfile::remove_pidfile(&self.config.pid_file);
    }

    /// Run the refresh loop until `shutdown` resolves (typically
    /// `tokio::signal::ctrl_c()` or a `SIGTERM` listener).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "refresh cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("refresher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One scan-refresh-regenerate pass over the vault.
    pub async fn run_cycle(&self) -> Result<()> {
        let paths = self.vault.list()?;
        let mut any_refreshed = false;

        for path in paths {
            let Some(record) = self.vault.read(&path)? else {
                continue;
            };
            if !record.needs_refresh(self.config.refresh_buffer_secs) {
                continue;
            }

            let result = match RefreshMethod::for_path(&path) {
                RefreshMethod::IngressM2m => self.refresh_ingress_m2m().await,
                RefreshMethod::AgentCore => self.refresh_agentcore(&path, &self.config.agentcore).await,
                RefreshMethod::GenericOAuth => self.refresh_generic_oauth(&path, &record).await,
            };

            match result {
                Ok(Some(new_record)) => {
                    self.vault.write(&path, &new_record)?;
                    any_refreshed = true;
                    info!(path = %path.display(), "refreshed credential");
                }
                Ok(None) => {}
                Err(e) => error!(path = %path.display(), error = %e, "failed to refresh credential"),
            }
        }

        if any_refreshed {
            crate::config_gen::regenerate(&self.vault, &self.config.config_output_dirs)?;
        }

        Ok(())
    }

    /// Ingress M2M procedure: mint a fresh client-credentials token from the
    /// configured identity provider. Never expects a refresh token.
    async fn refresh_ingress_m2m(&self) -> Result<Option<StoredTokenRecord>> {
        let Some(provider) = &self.provider else {
            warn!("ingress credential near expiry but no provider is configured for M2M refresh");
            return Ok(None);
        };

        let token = provider.get_m2m_token(None).await?;
        Ok(Some(m2m_token_to_record(token)))
    }

    /// AgentCore procedure: client-credentials grant against the configured
    /// Bedrock AgentCore OAuth domain. Never expects a refresh token.
    async fn refresh_agentcore(&self, path: &std::path::Path, config: &AgentCoreConfig) -> Result<Option<StoredTokenRecord>> {
        let (Some(oauth_domain), Some(client_id), Some(client_secret)) =
            (&config.oauth_domain, &config.client_id, &config.client_secret)
        else {
            warn!(path = %path.display(), "credential near expiry but no agentcore oauth domain is configured");
            return Ok(None);
        };

        let token = crate::provider::request_m2m_token(&self.http, oauth_domain, client_id, client_secret, config.scope.as_deref()).await?;
        Ok(Some(m2m_token_to_record(token)))
    }

    /// Generic OAuth procedure: refresh-token grant against the provider
    /// configured for this egress credential's filename. Egress credentials
    /// that were never issued a refresh token are logged and skipped; the
    /// refresher doesn't attempt interactive re-authorization.
    async fn refresh_generic_oauth(&self, path: &std::path::Path, record: &StoredTokenRecord) -> Result<Option<StoredTokenRecord>> {
        let Some(refresh_token) = record.refresh_token.clone() else {
            warn!(path = %path.display(), "credential near expiry but has no refresh token");
            return Ok(None);
        };

        let provider = provider_name_from_path(path);
        let Some(endpoint) = provider.and_then(|p| self.endpoints.get(&p)) else {
            warn!(path = %path.display(), "no refresh endpoint configured for this credential");
            return Ok(None);
        };

        self.refresh_with_retry(endpoint, &refresh_token).await.map(Some)
    }

    async fn refresh_with_retry(&self, endpoint: &EgressEndpoint, refresh_token: &str) -> Result<StoredTokenRecord> {
        let attempt = || async { self.refresh_once(endpoint, refresh_token).await };

        attempt
            .retry(ExponentialBuilder::default().with_max_times(3))
            .await
    }

    async fn refresh_once(&self, endpoint: &EgressEndpoint, refresh_token: &str) -> Result<StoredTokenRecord> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", endpoint.client_id.as_str());
        params.insert("client_secret", endpoint.client_secret.as_str());

        let response = self
            .http
            .post(&endpoint.token_url)
            .form(&params)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamProvider(format!("token refresh failed: HTTP {status} - {body}")));
        }

        let token_response: TokenResponse = response.json().await.map_err(Error::Http)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Ok(StoredTokenRecord {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token.or_else(|| Some(refresh_token.to_string())),
            expires_at: now + token_response.expires_in.unwrap_or(3600),
            scope: token_response.scope,
            updated_at: now,
        })
    }
}

/// Which refresh procedure a vault record's file name selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMethod {
    IngressM2m,
    AgentCore,
    GenericOAuth,
}

impl RefreshMethod {
    fn for_path(path: &std::path::Path) -> Self {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem == "ingress" {
            RefreshMethod::IngressM2m
        } else if stem.contains("agentcore") {
            RefreshMethod::AgentCore
        } else {
            RefreshMethod::GenericOAuth
        }
    }
}

/// Build a vault record from a freshly minted client-credentials token.
/// Client-credentials grants never return a refresh token.
fn m2m_token_to_record(token: crate::provider::M2mToken) -> StoredTokenRecord {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    StoredTokenRecord {
        access_token: token.access_token,
        refresh_token: None,
        expires_at: now + if token.expires_in == 0 { 3600 } else { token.expires_in },
        scope: None,
        updated_at: now,
    }
}

/// Extract the provider name from an egress vault file name
/// (`{provider}-egress.json` or `{provider}-{server}-egress.json`).
fn provider_name_from_path(path: &std::path::Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = stem.strip_suffix("-egress")?;
    Some(stem.split('-').next()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_provider_from_plain_egress_filename() {
        assert_eq!(
            provider_name_from_path(std::path::Path::new("cognito-egress.json")),
            Some("cognito".to_string())
        );
    }

    #[test]
    fn extracts_provider_from_server_scoped_egress_filename() {
        assert_eq!(
            provider_name_from_path(std::path::Path::new("cognito-fininfo-egress.json")),
            Some("cognito".to_string())
        );
    }

    #[test]
    fn ingress_filename_is_not_an_egress_credential() {
        assert_eq!(provider_name_from_path(std::path::Path::new("ingress.json")), None);
    }

    #[test]
    fn ingress_json_selects_ingress_m2m_procedure() {
        assert_eq!(RefreshMethod::for_path(std::path::Path::new("ingress.json")), RefreshMethod::IngressM2m);
    }

    #[test]
    fn agentcore_in_filename_selects_agentcore_procedure() {
        assert_eq!(
            RefreshMethod::for_path(std::path::Path::new("bedrock-agentcore-fininfo-egress.json")),
            RefreshMethod::AgentCore
        );
    }

    #[test]
    fn other_providers_select_generic_oauth_procedure() {
        assert_eq!(
            RefreshMethod::for_path(std::path::Path::new("atlassian-egress.json")),
            RefreshMethod::GenericOAuth
        );
    }

    #[test]
    fn m2m_token_never_carries_a_refresh_token() {
        let token = crate::provider::M2mToken {
            access_token: "tok".to_string(),
            expires_in: 1800,
            token_type: "Bearer".to_string(),
        };
        let record = m2m_token_to_record(token);
        assert!(record.refresh_token.is_none());
        assert!(record.expires_at > record.updated_at);
    }
}
