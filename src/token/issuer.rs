//! Mints self-signed access tokens, enforcing per-username rate limiting
//! and the scope-subset invariant.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter, state::keyed::DashMapStateStore};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use crate::config::SigningConfig;
use crate::error::{Error, Result};
use crate::policy::Policy;

use super::claims::Claims;

type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, governor::clock::DefaultClock>;

/// A request to mint a self-signed token on behalf of an already-authenticated
/// user.
pub struct MintRequest<'a> {
    /// Username the token is minted for
    pub username: &'a str,
    /// Scopes the user currently holds (the ceiling on what can be requested)
    pub user_scopes: &'a [String],
    /// Scopes requested for the new token; empty means "same as `user_scopes`"
    pub requested_scopes: &'a [String],
    /// Requested lifetime in hours
    pub expires_in_hours: u32,
    /// Optional human-readable description stored in the token
    pub description: Option<String>,
}

/// Mints and signs self-signed access tokens.
pub struct TokenIssuer {
    secret: Vec<u8>,
    config: SigningConfig,
    rate_limiter: Arc<KeyedLimiter>,
}

impl TokenIssuer {
    /// Build an issuer over the shared signing secret and its configured
    /// rate limit (tokens per username per rolling hour).
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, config: SigningConfig) -> Self {
        let per_hour = NonZeroU32::new(config.max_tokens_per_user_per_hour).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_hour(per_hour);
        let rate_limiter = Arc::new(RateLimiter::dashmap(quota));

        Self {
            secret: secret.into(),
            config,
            rate_limiter,
        }
    }

    /// Mint a token, validating the requested lifetime, the rate limit, and
    /// that the requested scopes are a subset of the caller's own scopes.
    pub fn mint(&self, request: &MintRequest<'_>) -> Result<(String, Claims)> {
        if request.expires_in_hours == 0 || request.expires_in_hours > self.config.max_token_lifetime_hours {
            return Err(Error::Config(format!(
                "expires_in_hours must be between 1 and {}",
                self.config.max_token_lifetime_hours
            )));
        }

        if self.rate_limiter.check_key(&request.username.to_string()).is_err() {
            return Err(Error::RateLimited);
        }

        let requested_scopes: Vec<String> = if request.requested_scopes.is_empty() {
            request.user_scopes.to_vec()
        } else {
            request.requested_scopes.to_vec()
        };

        if !Policy::validate_scope_subset(request.user_scopes, &requested_scopes) {
            return Err(Error::AuthzDenied {
                server: "*".to_string(),
                method: "internal/tokens".to_string(),
            });
        }

        let now = unix_now();
        let expires_at = now + u64::from(request.expires_in_hours) * 3600;

        let claims = Claims {
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            sub: request.username.to_string(),
            scope: requested_scopes.join(" "),
            exp: expires_at,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_use: "access".to_string(),
            client_id: "user-generated".to_string(),
            token_type: "user_generated".to_string(),
            description: request.description.clone(),
        };

        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| Error::Internal(format!("failed to sign token: {e}")))?;

        crate::metrics::token_issued();

        Ok((token, claims))
    }

    /// Verify a self-signed token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_audience(&[&self.config.jwt_audience]);
        validation.set_issuer(&[&self.config.jwt_issuer]);

        let data = jsonwebtoken::decode::<Claims>(token, &jsonwebtoken::DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::AuthExpired,
                _ => Error::AuthInvalidSignature,
            })?;

        Ok(data.claims)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", SigningConfig::default())
    }

    #[test]
    fn mints_and_verifies_a_token() {
        let issuer = issuer();
        let user_scopes = vec!["read".to_string()];
        let request = MintRequest {
            username: "alice",
            user_scopes: &user_scopes,
            requested_scopes: &[],
            expires_in_hours: 1,
            description: None,
        };

        let (token, claims) = issuer.mint(&request).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.scope, "read");

        let verified = issuer.verify(&token).unwrap();
        assert_eq!(verified.sub, "alice");
    }

    #[test]
    fn rejects_scopes_beyond_the_caller() {
        let issuer = issuer();
        let user_scopes = vec!["read".to_string()];
        let requested = vec!["admin".to_string()];
        let request = MintRequest {
            username: "alice",
            user_scopes: &user_scopes,
            requested_scopes: &requested,
            expires_in_hours: 1,
            description: None,
        };

        assert!(matches!(issuer.mint(&request), Err(Error::AuthzDenied { .. })));
    }

    #[test]
    fn rejects_out_of_range_lifetime() {
        let issuer = issuer();
        let user_scopes = vec!["read".to_string()];
        let request = MintRequest {
            username: "alice",
            user_scopes: &user_scopes,
            requested_scopes: &[],
            expires_in_hours: 999,
            description: None,
        };

        assert!(matches!(issuer.mint(&request), Err(Error::Config(_))));
    }

    #[test]
    fn enforces_rate_limit_per_username() {
        let mut config = SigningConfig::default();
        config.max_tokens_per_user_per_hour = 1;
        let issuer = TokenIssuer::new("test-secret", config);
        let user_scopes = vec!["read".to_string()];
        let request = MintRequest {
            username: "bob",
            user_scopes: &user_scopes,
            requested_scopes: &[],
            expires_in_hours: 1,
            description: None,
        };

        assert!(issuer.mint(&request).is_ok());
        assert!(matches!(issuer.mint(&request), Err(Error::RateLimited)));
    }
}
