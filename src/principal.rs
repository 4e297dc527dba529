//! The authenticated actor derived from whatever credential arrived on a
//! given request.

use serde::{Deserialize, Serialize};

/// How a [`Principal`] was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Verified against a Cognito user pool's JWKS
    Cognito,
    /// Verified against a Keycloak realm's JWKS
    Keycloak,
    /// Verified via the self-signed HS256 token issuer
    SelfSigned,
    /// Verified via the HMAC-signed session cookie
    SessionCookie,
}

impl AuthMethod {
    /// String form used in the `X-Auth-Method` response header, matching
    /// the original server's `method` field values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Cognito => "cognito",
            AuthMethod::Keycloak => "keycloak",
            AuthMethod::SelfSigned => "self_signed",
            AuthMethod::SessionCookie => "session_cookie",
        }
    }
}

/// The authenticated actor for the current request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Username or subject identifier
    pub username: String,
    /// OAuth client ID, when the credential carried one (empty for session
    /// cookies)
    pub client_id: String,
    /// Identity provider groups, if any
    pub groups: Vec<String>,
    /// Scopes already resolved for this principal (via group mapping or
    /// carried directly in a self-signed token's `scope` claim)
    pub scopes: Vec<String>,
    /// How this principal was authenticated
    pub method: AuthMethod,
}

/// Payload signed into the `mcp_gateway_session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Principal {
    /// Whether this principal has no scopes at all — callers must fail
    /// closed on this, never treat it as "allow everything".
    #[must_use]
    pub fn has_no_scopes(&self) -> bool {
        self.scopes.is_empty()
    }
}
