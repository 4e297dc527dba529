//! Identity provider adapters.
//!
//! # Verification flow
//!
//! 1. Decode the JWT header (no verification) to extract `kid` and `alg`.
//! 2. Decode the payload (no verification) to extract `iss`/`iat` for replay
//!    protection and provider selection.
//! 3. Fetch the provider's JWKS (cached; refreshed once on an unknown `kid`).
//! 4. Verify the JWT signature and standard claims (`exp`, `iat`).
//! 5. Check audience and, for Keycloak, extract the configured groups claim.

pub mod cognito;
pub mod jwks;
pub mod keycloak;

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, Header, TokenData, Validation,
    jwk::{AlgorithmParameters, JwkSet},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use jwks::JwksCache;

/// Result of a client-credentials grant: a machine-to-machine token, never
/// carrying a refresh token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct M2mToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Identity verified from a provider-issued JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// `sub` claim
    pub subject: String,
    /// Username used for audit logging and rate limiting. For Cognito this
    /// is usually the same as `subject`/email; for Keycloak it's
    /// `preferred_username`.
    pub username: String,
    /// Email address, if present in claims
    pub email: Option<String>,
    /// Group memberships, if present
    pub groups: Vec<String>,
    /// Issuer URL that signed the token
    pub issuer: String,
}

/// Raw unverified claims, read once to decide which provider and JWKS URI
/// to verify against.
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    iss: String,
    #[serde(default)]
    iat: u64,
}

/// Fully-typed claims for the token shape this provider actually issues.
#[derive(Debug, Deserialize)]
struct ProviderClaims {
    iss: String,
    sub: String,
    #[serde(default)]
    aud: serde_json::Value,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    cognito_username: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(rename = "cognito:groups", default)]
    cognito_groups: Option<Vec<String>>,
    #[serde(flatten)]
    extra: std::collections::HashMap<String, serde_json::Value>,
}

impl ProviderClaims {
    /// Read a string-array claim by name, falling back to the `groups`
    /// field already parsed, then to nothing.
    pub(crate) fn groups_from_claim(&self, claim_name: &str) -> Vec<String> {
        if claim_name == "groups"
            && let Some(groups) = &self.groups
        {
            return groups.clone();
        }

        self.extra
            .get(claim_name)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }
}

/// A configured identity provider adapter: Cognito or Keycloak.
pub enum ProviderAdapter {
    /// Amazon Cognito user pool
    Cognito(cognito::CognitoAdapter),
    /// Keycloak realm
    Keycloak(keycloak::KeycloakAdapter),
}

impl ProviderAdapter {
    /// Build the configured adapter from [`ProviderConfig`].
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let jwks_cache = Arc::new(JwksCache::new());
        match config.kind {
            crate::config::ProviderKind::Cognito => {
                Ok(ProviderAdapter::Cognito(cognito::CognitoAdapter::new(&config.cognito, jwks_cache)?))
            }
            crate::config::ProviderKind::Keycloak => {
                Ok(ProviderAdapter::Keycloak(keycloak::KeycloakAdapter::new(&config.keycloak, jwks_cache)?))
            }
        }
    }

    /// Verify a bearer token against this provider, applying the replay
    /// protection window configured on the shared [`ProviderConfig`].
    pub async fn verify(&self, token: &str, max_token_age_secs: u64) -> Result<VerifiedIdentity> {
        match self {
            ProviderAdapter::Cognito(a) => a.verify(token, max_token_age_secs).await,
            ProviderAdapter::Keycloak(a) => a.verify(token, max_token_age_secs).await,
        }
    }

    /// Provider type name, for the `/config` response.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProviderAdapter::Cognito(_) => "cognito",
            ProviderAdapter::Keycloak(_) => "keycloak",
        }
    }

    /// Mint a machine-to-machine token via the client-credentials grant.
    /// Used by the ingress M2M refresh procedure.
    pub async fn get_m2m_token(&self, scope: Option<&str>) -> Result<M2mToken> {
        match self {
            ProviderAdapter::Cognito(a) => a.get_m2m_token(scope).await,
            ProviderAdapter::Keycloak(a) => a.get_m2m_token(scope).await,
        }
    }
}

/// Shared verification core used by both adapters: decode-unverified,
/// fetch/cache JWKS by `kid`, verify signature and standard claims, return
/// the parsed claims for the caller to map into a [`VerifiedIdentity`].
pub(crate) async fn verify_against_jwks(
    jwks_cache: &JwksCache,
    token: &str,
    expected_issuers: &[String],
    jwks_uri: &str,
    audiences: &[String],
    max_token_age_secs: u64,
) -> Result<ProviderClaims> {
    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| Error::AuthMalformed(e.to_string()))?;

    let unverified = extract_unverified_claims(token)?;

    if !expected_issuers.iter().any(|i| i == &unverified.iss) {
        return Err(Error::AuthInvalidSignature);
    }

    let now_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    let iat_ago = now_secs.saturating_sub(unverified.iat);
    if iat_ago > max_token_age_secs {
        return Err(Error::AuthExpired);
    }

    let kid = header.kid.clone().ok_or_else(|| Error::AuthMalformed("missing kid".to_string()))?;

    let decoding_key = find_decoding_key(jwks_cache, jwks_uri, &kid).await?;

    let mut validation = build_validation(&header);
    validation.validate_aud = false;

    let token_data: TokenData<ProviderClaims> = jsonwebtoken::decode(token, &decoding_key, &validation)
        .map_err(|_| Error::AuthInvalidSignature)?;
    let claims = token_data.claims;

    if !audiences.is_empty() {
        check_audience(&claims.aud, audiences)?;
    }

    Ok(claims)
}

async fn find_decoding_key(jwks_cache: &JwksCache, jwks_uri: &str, kid: &str) -> Result<DecodingKey> {
    let jwks = jwks_cache.get_or_fetch(jwks_uri, jwks_uri, false).await?;
    if let Some(key) = find_key_in_jwks(&jwks, kid) {
        return Ok(key);
    }

    let jwks = jwks_cache.get_or_fetch(jwks_uri, jwks_uri, true).await?;
    find_key_in_jwks(&jwks, kid).ok_or_else(|| Error::AuthMalformed(format!("unknown key id: {kid}")))
}

fn extract_unverified_claims(token: &str) -> Result<UnverifiedClaims> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return Err(Error::AuthMalformed("not a JWT".to_string()));
    }

    let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, parts[1])
        .map_err(|_| Error::AuthMalformed("invalid base64 payload".to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| Error::AuthMalformed(e.to_string()))
}

fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        let jwk_kid = jwk.common.key_id.as_deref().unwrap_or("");
        if jwk_kid != kid {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y).ok(),
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}

fn build_validation(header: &Header) -> Validation {
    let alg = match header.alg {
        Algorithm::RS256 => Algorithm::RS256,
        Algorithm::RS384 => Algorithm::RS384,
        Algorithm::RS512 => Algorithm::RS512,
        Algorithm::ES256 => Algorithm::ES256,
        Algorithm::ES384 => Algorithm::ES384,
        other => {
            warn!(alg = ?other, "unsupported JWT algorithm, defaulting to RS256");
            Algorithm::RS256
        }
    };

    let mut v = Validation::new(alg);
    v.leeway = 60;
    v
}

fn check_audience(aud_claim: &serde_json::Value, expected: &[String]) -> Result<()> {
    let matches = match aud_claim {
        serde_json::Value::String(s) => expected.iter().any(|e| e == s),
        serde_json::Value::Array(arr) => arr
            .iter()
            .any(|v| v.as_str().is_some_and(|s| expected.iter().any(|e| e == s))),
        _ => false,
    };

    if matches { Ok(()) } else { Err(Error::AuthInvalidSignature) }
}

fn default_jwks_uri(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    format!("{base}/.well-known/jwks.json")
}

/// Shared client-credentials POST, used by both adapters' `get_m2m_token`.
pub(crate) async fn request_m2m_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: Option<&str>,
) -> Result<M2mToken> {
    let mut params = vec![
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];
    if let Some(scope) = scope {
        params.push(("scope", scope));
    }

    let response = http.post(token_url).form(&params).send().await.map_err(Error::Http)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::UpstreamProvider(format!("m2m token request failed: HTTP {status} - {body}")));
    }

    response.json().await.map_err(Error::Http)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_jwks_uri_appends_well_known() {
        assert_eq!(
            default_jwks_uri("https://cognito-idp.us-east-1.amazonaws.com/us-east-1_abc"),
            "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_abc/.well-known/jwks.json"
        );
    }

    #[test]
    fn default_jwks_uri_handles_trailing_slash() {
        assert_eq!(
            default_jwks_uri("https://kc.example.com/realms/mcp/"),
            "https://kc.example.com/realms/mcp/.well-known/jwks.json"
        );
    }

    #[test]
    fn check_audience_accepts_string_match() {
        let aud = serde_json::json!("my-client-id");
        assert!(check_audience(&aud, &["my-client-id".to_string()]).is_ok());
    }

    #[test]
    fn check_audience_accepts_array_member_match() {
        let aud = serde_json::json!(["other-client", "my-client-id"]);
        assert!(check_audience(&aud, &["my-client-id".to_string()]).is_ok());
    }

    #[test]
    fn check_audience_rejects_no_match() {
        let aud = serde_json::json!("wrong-client");
        assert!(check_audience(&aud, &["my-client-id".to_string()]).is_err());
    }

    #[test]
    fn extract_unverified_claims_rejects_malformed_token() {
        assert!(extract_unverified_claims("not-a-jwt").is_err());
    }
}
