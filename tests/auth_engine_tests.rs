//! End-to-end coverage of the `/validate` decision procedure: credential
//! selection, envelope parsing, and scope-policy authorization wired
//! together exactly as `main.rs` assembles them.

use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};
use mcp_auth_registry::auth_engine::{AuthEngine, ValidateHeaders};
use mcp_auth_registry::config::{CognitoConfig, ProviderConfig, ProviderKind, SigningConfig};
use mcp_auth_registry::policy::Policy;
use mcp_auth_registry::provider::ProviderAdapter;
use mcp_auth_registry::session::SessionSigner;
use mcp_auth_registry::token::TokenIssuer;
use mcp_auth_registry::Error;

const SECRET: &str = "test-signing-secret";

fn write_policy_file(yaml: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scopes.yml");
    std::fs::write(&path, yaml).unwrap();
    (dir, path)
}

/// A provider adapter that is valid to construct but never exercised by
/// these scenarios (all of them authenticate via cookie or self-signed
/// token).
fn unused_provider() -> ProviderAdapter {
    let config = ProviderConfig {
        kind: ProviderKind::Cognito,
        cognito: CognitoConfig {
            user_pool_id: Some("us-east-1_test".to_string()),
            client_id: Some("client".to_string()),
            region: "us-east-1".to_string(),
            ..CognitoConfig::default()
        },
        ..ProviderConfig::default()
    };
    ProviderAdapter::from_config(&config).unwrap()
}

fn engine(policy: Arc<Policy>) -> AuthEngine {
    let signing = SigningConfig::default();
    let session_signer = Arc::new(SessionSigner::new(SECRET));
    let token_issuer = Arc::new(TokenIssuer::new(SECRET, signing.clone()));
    AuthEngine::new(
        unused_provider(),
        policy,
        session_signer,
        token_issuer,
        signing.jwt_issuer,
        signing.session_max_age_secs,
        86_400,
    )
}

fn headers_with_cookie(cookie: &str, original_url: &str, body: &str) -> ValidateHeaders {
    ValidateHeaders {
        cookie: Some(format!("mcp_gateway_session={cookie}")),
        original_url: Some(original_url.to_string()),
        body: Some(body.to_string()),
        ..ValidateHeaders::default()
    }
}

const FININFO_POLICY: &str = r#"
group_mappings:
  admins:
    - admin
admin:
  - server: fininfo
    methods: ["initialize", "tools/list", "tools/call"]
    tools: ["get_stock_aggregates"]
"#;

#[tokio::test]
async fn cookie_happy_path_returns_session_cookie_principal_and_scopes() {
    let (_dir, path) = write_policy_file(FININFO_POLICY);
    let policy = Arc::new(Policy::load(path).unwrap());
    let auth = engine(policy);

    let session_signer = SessionSigner::new(SECRET);
    let cookie = session_signer
        .sign(&serde_json::json!({"username": "alice", "groups": ["admins"]}))
        .unwrap();

    let headers = headers_with_cookie(
        &cookie,
        "https://gw/fininfo/mcp",
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_stock_aggregates","arguments":{}}}"#,
    );

    let outcome = auth.validate(&headers).await.unwrap();

    assert_eq!(outcome.method, "session_cookie");
    assert_eq!(outcome.username, "alice");
    assert_eq!(outcome.scopes, vec!["admin".to_string()]);
    assert_eq!(outcome.server_name.as_deref(), Some("fininfo"));
    assert_eq!(outcome.tool_name.as_deref(), Some("tools/call"));
}

#[tokio::test]
async fn policy_denies_a_tool_not_listed_in_the_grant() {
    let (_dir, path) = write_policy_file(FININFO_POLICY);
    let policy = Arc::new(Policy::load(path).unwrap());
    let auth = engine(policy);

    let session_signer = SessionSigner::new(SECRET);
    let cookie = session_signer
        .sign(&serde_json::json!({"username": "alice", "groups": ["admins"]}))
        .unwrap();

    let headers = headers_with_cookie(
        &cookie,
        "https://gw/fininfo/mcp",
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_news","arguments":{}}}"#,
    );

    let result = auth.validate(&headers).await;
    assert!(matches!(result, Err(Error::AuthzDenied { ref server, .. }) if server == "fininfo"));
}

#[tokio::test]
async fn expired_self_signed_token_is_rejected_with_auth_expired() {
    let (_dir, path) = write_policy_file(FININFO_POLICY);
    let policy = Arc::new(Policy::load(path).unwrap());
    let auth = engine(policy);

    let signing = SigningConfig::default();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let claims = serde_json::json!({
        "iss": signing.jwt_issuer,
        "aud": signing.jwt_audience,
        "sub": "alice",
        "scope": "admin",
        "exp": now - 60,
        "iat": now - 3_600,
        "jti": "expired-token",
        "token_use": "access",
        "client_id": "user-generated",
        "token_type": "user_generated",
    });
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();

    let headers = ValidateHeaders {
        authorization: Some(format!("Bearer {token}")),
        ..ValidateHeaders::default()
    };

    let result = auth.validate(&headers).await;
    assert!(matches!(result, Err(Error::AuthExpired)));
}

#[tokio::test]
async fn missing_credential_is_rejected_before_any_policy_lookup() {
    let (_dir, path) = write_policy_file(FININFO_POLICY);
    let policy = Arc::new(Policy::load(path).unwrap());
    let auth = engine(policy);

    let headers = ValidateHeaders::default();
    let result = auth.validate(&headers).await;
    assert!(matches!(result, Err(Error::AuthMissing)));
}

#[tokio::test]
async fn principal_with_no_scopes_fails_closed_even_with_a_present_policy() {
    let (_dir, path) = write_policy_file(FININFO_POLICY);
    let policy = Arc::new(Policy::load(path).unwrap());
    let auth = engine(policy);

    let session_signer = SessionSigner::new(SECRET);
    // "outsiders" maps to no scopes at all.
    let cookie = session_signer
        .sign(&serde_json::json!({"username": "mallory", "groups": ["outsiders"]}))
        .unwrap();

    let headers = headers_with_cookie(
        &cookie,
        "https://gw/fininfo/mcp",
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
    );

    let result = auth.validate(&headers).await;
    assert!(matches!(result, Err(Error::AuthzDenied { ref server, .. }) if server == "fininfo"));
}
