//! Keycloak realm adapter.

use std::sync::Arc;

use crate::config::KeycloakConfig;
use crate::error::{Error, Result};

use super::jwks::JwksCache;
use super::{M2mToken, VerifiedIdentity, default_jwks_uri, request_m2m_token, verify_against_jwks};

/// Verifies tokens issued by a Keycloak realm. A single realm is commonly
/// reachable under several hostnames (public, cluster-internal, localhost
/// for local dev) that all share the same signing keys, so `issuers` holds
/// every form accepted as `iss`.
pub struct KeycloakAdapter {
    issuers: Vec<String>,
    jwks_uri: String,
    token_url: String,
    audiences: Vec<String>,
    groups_claim: String,
    m2m_client_id: String,
    m2m_client_secret: String,
    jwks_cache: Arc<JwksCache>,
    http: reqwest::Client,
}

impl KeycloakAdapter {
    /// Build from [`KeycloakConfig`]. Requires `issuer` to be set.
    pub fn new(config: &KeycloakConfig, jwks_cache: Arc<JwksCache>) -> Result<Self> {
        let issuer = config
            .issuer
            .clone()
            .ok_or_else(|| Error::ConfigMissing("provider.keycloak.issuer".to_string()))?;

        let realm = issuer.trim_end_matches('/').rsplit('/').next().unwrap_or_default();

        let mut issuers = vec![issuer.clone()];
        if let Some(external) = &config.external_issuer {
            if !issuers.contains(external) {
                issuers.push(external.clone());
            }
        }
        let localhost_issuer = config
            .localhost_issuer
            .clone()
            .unwrap_or_else(|| format!("http://localhost:8080/realms/{realm}"));
        if !issuers.contains(&localhost_issuer) {
            issuers.push(localhost_issuer);
        }

        let jwks_uri = default_jwks_uri(&issuer);
        let token_url = format!("{}/protocol/openid-connect/token", issuer.trim_end_matches('/'));

        let m2m_client_id = config.m2m_client_id.clone().or_else(|| config.client_id.clone()).unwrap_or_default();
        let m2m_client_secret = config
            .m2m_client_secret
            .clone()
            .or_else(|| config.client_secret.clone())
            .unwrap_or_default();

        let mut audiences = vec!["account".to_string()];
        if let Some(client_id) = &config.client_id {
            if !audiences.contains(client_id) {
                audiences.push(client_id.clone());
            }
        }
        if !m2m_client_id.is_empty() && !audiences.contains(&m2m_client_id) {
            audiences.push(m2m_client_id.clone());
        }

        let groups_claim = if config.groups_claim.is_empty() {
            "groups".to_string()
        } else {
            config.groups_claim.clone()
        };

        Ok(Self {
            issuers,
            jwks_uri,
            token_url,
            audiences,
            groups_claim,
            m2m_client_id,
            m2m_client_secret,
            jwks_cache,
            http: reqwest::Client::new(),
        })
    }

    /// Verify a Keycloak-issued access token against whichever of the
    /// configured issuer aliases it was actually signed for.
    pub async fn verify(&self, token: &str, max_token_age_secs: u64) -> Result<VerifiedIdentity> {
        let claims = verify_against_jwks(
            &self.jwks_cache,
            token,
            &self.issuers,
            &self.jwks_uri,
            &self.audiences,
            max_token_age_secs,
        )
        .await?;

        let username = claims
            .preferred_username
            .clone()
            .unwrap_or_else(|| claims.sub.clone());
        let groups = claims.groups_from_claim(&self.groups_claim);

        Ok(VerifiedIdentity {
            subject: claims.sub.clone(),
            username,
            email: claims.email.clone(),
            groups,
            issuer: claims.iss.clone(),
        })
    }

    /// Mint an M2M token via the client-credentials grant against this
    /// realm's token endpoint.
    pub async fn get_m2m_token(&self, scope: Option<&str>) -> Result<M2mToken> {
        request_m2m_token(&self.http, &self.token_url, &self.m2m_client_id, &self.m2m_client_secret, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_issuer_is_rejected() {
        let config = KeycloakConfig::default();
        assert!(KeycloakAdapter::new(&config, Arc::new(JwksCache::new())).is_err());
    }

    #[test]
    fn default_groups_claim_is_groups() {
        let config = KeycloakConfig {
            issuer: Some("https://kc.example.com/realms/mcp".to_string()),
            client_id: Some("mcp-gateway".to_string()),
            ..KeycloakConfig::default()
        };
        let adapter = KeycloakAdapter::new(&config, Arc::new(JwksCache::new())).unwrap();
        assert_eq!(adapter.groups_claim, "groups");
    }

    #[test]
    fn accepts_external_and_localhost_issuer_aliases() {
        let config = KeycloakConfig {
            issuer: Some("http://keycloak:8080/realms/mcp-gateway".to_string()),
            external_issuer: Some("https://mcpgateway.example.com/realms/mcp-gateway".to_string()),
            client_id: Some("mcp-gateway".to_string()),
            ..KeycloakConfig::default()
        };
        let adapter = KeycloakAdapter::new(&config, Arc::new(JwksCache::new())).unwrap();
        assert!(adapter.issuers.contains(&"http://keycloak:8080/realms/mcp-gateway".to_string()));
        assert!(
            adapter
                .issuers
                .contains(&"https://mcpgateway.example.com/realms/mcp-gateway".to_string())
        );
        assert!(adapter.issuers.contains(&"http://localhost:8080/realms/mcp-gateway".to_string()));
    }

    #[test]
    fn audiences_include_account_client_id_and_m2m_client_id() {
        let config = KeycloakConfig {
            issuer: Some("https://kc.example.com/realms/mcp".to_string()),
            client_id: Some("mcp-gateway".to_string()),
            m2m_client_id: Some("mcp-gateway-m2m".to_string()),
            ..KeycloakConfig::default()
        };
        let adapter = KeycloakAdapter::new(&config, Arc::new(JwksCache::new())).unwrap();
        assert!(adapter.audiences.contains(&"account".to_string()));
        assert!(adapter.audiences.contains(&"mcp-gateway".to_string()));
        assert!(adapter.audiences.contains(&"mcp-gateway-m2m".to_string()));
    }

    #[test]
    fn m2m_client_defaults_to_client_id_and_secret() {
        let config = KeycloakConfig {
            issuer: Some("https://kc.example.com/realms/mcp".to_string()),
            client_id: Some("mcp-gateway".to_string()),
            client_secret: Some("shh".to_string()),
            ..KeycloakConfig::default()
        };
        let adapter = KeycloakAdapter::new(&config, Arc::new(JwksCache::new())).unwrap();
        assert_eq!(adapter.m2m_client_id, "mcp-gateway");
        assert_eq!(adapter.m2m_client_secret, "shh");
    }
}
