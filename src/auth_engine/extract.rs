//! Header and cookie extraction for the `/validate` request path.

/// The subset of upstream-proxy headers the Authorization Engine reads.
/// Never consults the original request body directly — everything arrives
/// pre-extracted by the proxy.
#[derive(Debug, Clone, Default)]
pub struct ValidateHeaders {
    /// `X-Authorization: Bearer <token>`
    pub authorization: Option<String>,
    /// Raw `Cookie` header
    pub cookie: Option<String>,
    /// `X-User-Pool-Id` — Cognito fallback context
    pub user_pool_id: Option<String>,
    /// `X-Client-Id` — Cognito fallback context
    pub client_id: Option<String>,
    /// `X-Region`, defaulting to `us-east-1`
    pub region: String,
    /// `X-Original-URL` — used to derive the server name
    pub original_url: Option<String>,
    /// `X-Body` — the JSON-RPC envelope of the original request
    pub body: Option<String>,
    /// Client IP, for anonymized logging only
    pub client_ip: Option<String>,
}

/// Pull the `mcp_gateway_session` cookie's value out of a raw `Cookie`
/// header, if present.
#[must_use]
pub fn session_cookie_value(cookie_header: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let pair = pair.trim();
        pair.strip_prefix("mcp_gateway_session=").map(str::to_string)
    })
}

/// Extract the bearer token from an `Authorization: Bearer <token>` value.
#[must_use]
pub fn bearer_token(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_cookie_among_others() {
        let cookie = "foo=bar; mcp_gateway_session=abc123; baz=qux";
        assert_eq!(session_cookie_value(cookie).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_session_cookie_is_none() {
        assert_eq!(session_cookie_value("foo=bar"), None);
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Basic xyz"), None);
    }
}
