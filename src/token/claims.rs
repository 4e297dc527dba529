//! Self-signed token claim shape (HS256, shared [`crate::config::SigningConfig::secret_key`]).

use serde::{Deserialize, Serialize};

/// Claims carried by a self-signed access token, matching the shape the
/// original issuer produces so downstream consumers that expect this exact
/// field set keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Subject (username)
    pub sub: String,
    /// Space-separated scope list
    pub scope: String,
    /// Expiry (Unix timestamp)
    pub exp: u64,
    /// Issued-at (Unix timestamp)
    pub iat: u64,
    /// Unique token ID
    pub jti: String,
    /// Always `"access"` for tokens minted by this issuer
    pub token_use: String,
    /// Always `"user-generated"` — no OAuth client was involved in minting
    pub client_id: String,
    /// Always `"user_generated"` — distinguishes this from a provider-issued JWT
    pub token_type: String,
    /// Caller-supplied human-readable description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Claims {
    /// Scopes as a `Vec<String>`, splitting the space-separated `scope` claim.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_string).collect()
    }
}
