//! The `/validate` request pipeline: credential selection (session cookie
//! first, then bearer token), JSON-RPC envelope parsing, scope derivation,
//! and the fail-closed authorization check.

pub mod extract;
pub mod redact;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::principal::{AuthMethod, Principal, SessionPayload};
use crate::provider::ProviderAdapter;
use crate::rpc::RpcEnvelope;
use crate::session::SessionSigner;
use crate::token::TokenIssuer;

pub use extract::ValidateHeaders;

/// Everything the `/validate` HTTP handler needs to compose its response,
/// including the headers the upstream proxy consumes.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub username: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub method: String,
    pub groups: Vec<String>,
    pub server_name: Option<String>,
    pub tool_name: Option<String>,
}

/// Claims read from a self-signed token without trusting the signature yet
/// — just enough to decide whether `iss` names this process as the issuer.
#[derive(Debug, Deserialize)]
struct UnverifiedIssuer {
    iss: String,
}

/// Wires together the credential verifiers and the scope policy into the
/// single `/validate` decision procedure.
pub struct AuthEngine {
    provider: ProviderAdapter,
    policy: std::sync::Arc<Policy>,
    session_signer: std::sync::Arc<SessionSigner>,
    token_issuer: std::sync::Arc<TokenIssuer>,
    token_issuer_name: String,
    session_max_age_secs: u64,
    max_token_age_secs: u64,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        provider: ProviderAdapter,
        policy: std::sync::Arc<Policy>,
        session_signer: std::sync::Arc<SessionSigner>,
        token_issuer: std::sync::Arc<TokenIssuer>,
        token_issuer_name: String,
        session_max_age_secs: u64,
        max_token_age_secs: u64,
    ) -> Self {
        Self {
            provider,
            policy,
            session_signer,
            token_issuer,
            token_issuer_name,
            session_max_age_secs,
            max_token_age_secs,
        }
    }

    /// Run the full `/validate` decision procedure.
    pub async fn validate(&self, headers: &ValidateHeaders) -> Result<ValidationOutcome> {
        if let Some(ip) = &headers.client_ip {
            info!(client_ip = %redact::anonymize_ip(ip), "validation request");
        }

        let principal = match self.authenticate(headers).await {
            Ok(principal) => principal,
            Err(Error::AuthExpired) => {
                crate::metrics::token_expired();
                return Err(Error::AuthExpired);
            }
            Err(e) => return Err(e),
        };
        crate::metrics::token_validated(principal.method.as_str());

        let server_name = headers.original_url.as_deref().and_then(crate::rpc::server_name_from_path);
        let envelope = headers.body.as_deref().and_then(RpcEnvelope::parse).unwrap_or_default();
        let method = envelope.method.clone();
        let tool_name = envelope.tool_name();

        if let (Some(server_name), Some(method)) = (server_name.as_deref(), method.as_deref()) {
            if principal.has_no_scopes() {
                warn!(
                    user = %redact::hash_username(&principal.username),
                    server = server_name,
                    method,
                    "access denied: no scopes configured"
                );
                crate::metrics::policy_denied();
                return Err(Error::AuthzDenied {
                    server: server_name.to_string(),
                    method: method.to_string(),
                });
            }

            if !self
                .policy
                .validate_server_tool_access(server_name, method, tool_name.as_deref(), &principal.scopes)
            {
                warn!(
                    user = %redact::hash_username(&principal.username),
                    server = server_name,
                    method,
                    tool = tool_name.as_deref().unwrap_or(""),
                    "access denied"
                );
                crate::metrics::policy_denied();
                return Err(Error::AuthzDenied {
                    server: server_name.to_string(),
                    method: method.to_string(),
                });
            }
        }

        Ok(ValidationOutcome {
            valid: true,
            username: principal.username,
            client_id: principal.client_id,
            scopes: principal.scopes,
            method: principal.method.as_str().to_string(),
            groups: principal.groups,
            server_name,
            tool_name: method,
        })
    }

    async fn authenticate(&self, headers: &ValidateHeaders) -> Result<Principal> {
        if let Some(cookie_header) = &headers.cookie
            && let Some(cookie_value) = extract::session_cookie_value(cookie_header)
        {
            let payload: SessionPayload = self.session_signer.unsign(&cookie_value, self.session_max_age_secs)?;
            let scopes = self.policy.map_groups_to_scopes(&payload.groups);
            info!(user = %redact::hash_username(&payload.username), "session cookie validated");
            return Ok(Principal {
                username: payload.username,
                client_id: String::new(),
                groups: payload.groups,
                scopes,
                method: AuthMethod::SessionCookie,
            });
        }

        let authorization = headers.authorization.as_deref().ok_or(Error::AuthMissing)?;
        let token = extract::bearer_token(authorization).ok_or(Error::AuthMissing)?;

        if peek_issuer(token).as_deref() == Some(self.token_issuer_name()) {
            let claims = self.token_issuer.verify(token)?;
            return Ok(Principal {
                username: claims.sub,
                client_id: claims.client_id,
                groups: Vec::new(),
                scopes: claims.scopes(),
                method: AuthMethod::SelfSigned,
            });
        }

        let method = match &self.provider {
            ProviderAdapter::Cognito(_) => AuthMethod::Cognito,
            ProviderAdapter::Keycloak(_) => AuthMethod::Keycloak,
        };

        let identity = match self.provider.verify(token, self.max_token_age_secs).await {
            Ok(identity) => identity,
            Err(e) => {
                crate::metrics::provider_verify_failed(method.as_str());
                return Err(e);
            }
        };

        // Neither adapter's verified claims carry a raw `scope` string today
        // (Cognito machine-to-machine tokens are the exception, not modeled
        // here), so group mapping is the scope source for every provider.
        let scopes = self.policy.map_groups_to_scopes(&identity.groups);

        Ok(Principal {
            username: identity.username,
            client_id: String::new(),
            groups: identity.groups,
            scopes,
            method,
        })
    }

    fn token_issuer_name(&self) -> &str {
        &self.token_issuer_name
    }
}

fn peek_issuer(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return None;
    }
    let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, parts[1]).ok()?;
    let claims: UnverifiedIssuer = serde_json::from_slice(&payload).ok()?;
    Some(claims.iss)
}
