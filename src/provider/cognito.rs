//! Amazon Cognito user pool adapter.

use std::sync::Arc;

use crate::config::CognitoConfig;
use crate::error::{Error, Result};

use super::jwks::JwksCache;
use super::{M2mToken, VerifiedIdentity, default_jwks_uri, request_m2m_token, verify_against_jwks};

/// Verifies tokens issued by a Cognito user pool.
pub struct CognitoAdapter {
    issuer: String,
    jwks_uri: String,
    token_url: String,
    audiences: Vec<String>,
    client_id: String,
    client_secret: String,
    jwks_cache: Arc<JwksCache>,
    http: reqwest::Client,
}

impl CognitoAdapter {
    /// Build from [`CognitoConfig`]. Requires `user_pool_id` to be set.
    pub fn new(config: &CognitoConfig, jwks_cache: Arc<JwksCache>) -> Result<Self> {
        let user_pool_id = config
            .user_pool_id
            .as_ref()
            .ok_or_else(|| Error::ConfigMissing("provider.cognito.user_pool_id".to_string()))?;

        let issuer = format!("https://cognito-idp.{}.amazonaws.com/{}", config.region, user_pool_id);
        let jwks_uri = default_jwks_uri(&issuer);
        let audiences = config.client_id.clone().into_iter().collect();

        let domain = config
            .domain
            .clone()
            .unwrap_or_else(|| user_pool_id.replace('_', ""));
        let cognito_domain = format!("https://{domain}.auth.{}.amazoncognito.com", config.region);
        let token_url = format!("{cognito_domain}/oauth2/token");

        Ok(Self {
            issuer,
            jwks_uri,
            token_url,
            audiences,
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            jwks_cache,
            http: reqwest::Client::new(),
        })
    }

    /// Verify a Cognito-issued access or ID token.
    pub async fn verify(&self, token: &str, max_token_age_secs: u64) -> Result<VerifiedIdentity> {
        let claims = verify_against_jwks(
            &self.jwks_cache,
            token,
            std::slice::from_ref(&self.issuer),
            &self.jwks_uri,
            &self.audiences,
            max_token_age_secs,
        )
        .await?;

        // Cognito puts the human-readable username under `username` on access
        // tokens and `cognito:username` on ID tokens.
        let username = claims
            .username
            .clone()
            .or_else(|| claims.cognito_username.clone())
            .or_else(|| claims.email.clone())
            .unwrap_or_else(|| claims.sub.clone());

        Ok(VerifiedIdentity {
            subject: claims.sub.clone(),
            username,
            email: claims.email.clone(),
            groups: claims.cognito_groups.clone().unwrap_or_default(),
            issuer: claims.iss.clone(),
        })
    }

    /// Mint an M2M token via the client-credentials grant against this
    /// pool's hosted-UI domain.
    pub async fn get_m2m_token(&self, scope: Option<&str>) -> Result<M2mToken> {
        request_m2m_token(&self.http, &self.token_url, &self.client_id, &self.client_secret, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_is_derived_from_region_and_pool_id() {
        let config = CognitoConfig {
            user_pool_id: Some("us-east-1_abc123".to_string()),
            client_id: Some("client".to_string()),
            region: "us-east-1".to_string(),
            ..CognitoConfig::default()
        };
        let adapter = CognitoAdapter::new(&config, Arc::new(JwksCache::new())).unwrap();
        assert_eq!(adapter.issuer, "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_abc123");
        assert_eq!(adapter.jwks_uri, format!("{}/.well-known/jwks.json", adapter.issuer));
    }

    #[test]
    fn missing_user_pool_id_is_rejected() {
        let config = CognitoConfig::default();
        assert!(CognitoAdapter::new(&config, Arc::new(JwksCache::new())).is_err());
    }
}
