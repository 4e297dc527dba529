//! Configuration management
//!
//! Layered the way the teacher's gateway does it: built-in defaults, then an
//! optional YAML file, then environment variables (which always win).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static pattern is valid"));

/// Expand `${VAR}` and `${VAR:-default}` references in a YAML document
/// against the process environment, the way the teacher's config loader
/// does before handing the document to figment.
fn expand_env_vars(text: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let var = &caps[1];
            std::env::var(var).unwrap_or_else(|_| caps.get(2).map_or_else(String::new, |m| m.as_str().to_string()))
        })
        .into_owned()
}

/// Root configuration for the auth/discovery registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server bind configuration
    pub server: ServerConfig,
    /// Identity provider selection and adapter settings
    pub provider: ProviderConfig,
    /// Self-signed session/token signing configuration
    pub signing: SigningConfig,
    /// Scope policy document location
    pub policy: PolicyConfig,
    /// On-disk token vault
    pub vault: VaultConfig,
    /// Background token refresher
    pub refresher: RefresherConfig,
    /// Semantic tool discovery
    pub discovery: DiscoveryConfig,
    /// Out-of-band metrics shipping (disabled unless both URL and key are set)
    pub metrics: MetricsConfig,
    /// Inbound (browser) OAuth2 login providers, keyed by provider name
    #[serde(default)]
    pub oauth2_providers: HashMap<String, OAuth2ProviderConfig>,
    /// Registry-wide OAuth2 session/redirect settings
    pub oauth2_session: OAuth2SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            signing: SigningConfig::default(),
            policy: PolicyConfig::default(),
            vault: VaultConfig::default(),
            refresher: RefresherConfig::default(),
            discovery: DiscoveryConfig::default(),
            metrics: MetricsConfig::default(),
            oauth2_providers: HashMap::new(),
            oauth2_session: OAuth2SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from built-in defaults, an optional YAML file, and
    /// the process environment (`AUTH_` prefix plus the legacy unprefixed
    /// names the original server used, e.g. `SECRET_KEY`).
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Load a local .env file into the process environment, if present,
        // before anything reads from it. Silently a no-op when absent.
        dotenvy::dotenv().ok();

        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
                figment = figment.merge(Yaml::string(&expand_env_vars(&raw)));
            }
        }

        figment = figment
            .merge(Env::prefixed("AUTH_").split("__"))
            .merge(Env::raw().only(&[
                "AUTH_PROVIDER",
                "SECRET_KEY",
                "METRICS_SERVICE_URL",
                "METRICS_API_KEY",
                "MAX_TOKEN_LIFETIME_HOURS",
                "DEFAULT_TOKEN_LIFETIME_HOURS",
                "MAX_TOKENS_PER_USER_PER_HOUR",
            ]));

        figment
            .extract()
            .map_err(|e| Error::Config(format!("failed to load configuration: {e}")))
    }
}

/// HTTP server bind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
        }
    }
}

/// Which identity provider adapter is active, and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// `cognito` or `keycloak`
    pub kind: ProviderKind,
    /// Cognito-specific settings (used when `kind == Cognito`)
    pub cognito: CognitoConfig,
    /// Keycloak-specific settings (used when `kind == Keycloak`)
    pub keycloak: KeycloakConfig,
    /// Maximum age, in seconds, a token's `iat` may have before it is
    /// rejected regardless of `exp` (defends against long-lived leaked
    /// tokens whose issuer never set a short expiry).
    pub max_token_age_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Cognito,
            cognito: CognitoConfig::default(),
            keycloak: KeycloakConfig::default(),
            max_token_age_secs: 86_400,
        }
    }
}

/// Supported identity provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Amazon Cognito user pools
    #[default]
    Cognito,
    /// Self-hosted Keycloak realm
    Keycloak,
}

/// Cognito adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitoConfig {
    /// Cognito user pool ID (e.g. `us-east-1_abc123`)
    pub user_pool_id: Option<String>,
    /// App client ID (used for audience checks and the client-credentials grant)
    pub client_id: Option<String>,
    /// App client secret, for the client-credentials (M2M) grant
    pub client_secret: Option<String>,
    /// AWS region the pool lives in
    pub region: String,
    /// Custom Cognito hosted-UI domain prefix; defaults to the user pool ID
    /// with underscores stripped
    pub domain: Option<String>,
}

impl Default for CognitoConfig {
    fn default() -> Self {
        Self {
            user_pool_id: None,
            client_id: None,
            client_secret: None,
            region: "us-east-1".to_string(),
            domain: None,
        }
    }
}

/// Keycloak adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeycloakConfig {
    /// Internal/server-to-server realm issuer URL, e.g.
    /// `http://keycloak:8080/realms/mcp` — used for JWKS and token requests
    pub issuer: Option<String>,
    /// Public-facing issuer URL browsers see, if different from `issuer`
    pub external_issuer: Option<String>,
    /// Localhost issuer URL accepted for local development; defaults to
    /// `http://localhost:8080/realms/{realm}` derived from `issuer`
    pub localhost_issuer: Option<String>,
    /// OAuth client ID for interactive logins (also accepted as audience)
    pub client_id: Option<String>,
    /// OAuth client secret for interactive logins
    pub client_secret: Option<String>,
    /// Machine-to-machine client ID; defaults to `client_id`
    pub m2m_client_id: Option<String>,
    /// Machine-to-machine client secret; defaults to `client_secret`
    pub m2m_client_secret: Option<String>,
    /// Claim name carrying the user's groups (Keycloak defaults to `groups`)
    pub groups_claim: String,
}

/// HMAC signing configuration shared by the session signer and the
/// self-signed token issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Shared secret key. If unset at startup a random one is generated and
    /// a warning is logged — every existing session/token becomes invalid on
    /// the next restart, matching the original server's behavior.
    pub secret_key: Option<String>,
    /// JWT issuer claim for self-signed tokens
    pub jwt_issuer: String,
    /// JWT audience claim for self-signed tokens
    pub jwt_audience: String,
    /// Session cookie max age, in seconds
    pub session_max_age_secs: u64,
    /// Maximum requestable token lifetime, in hours
    pub max_token_lifetime_hours: u32,
    /// Default token lifetime when the caller doesn't specify one, in hours
    pub default_token_lifetime_hours: u32,
    /// Maximum tokens a single username may mint per rolling hour
    pub max_tokens_per_user_per_hour: u32,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            jwt_issuer: "mcp-auth-server".to_string(),
            jwt_audience: "mcp-registry".to_string(),
            session_max_age_secs: 28_800,
            max_token_lifetime_hours: 24,
            default_token_lifetime_hours: 8,
            max_tokens_per_user_per_hour: 10,
        }
    }
}

/// Scope policy document location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Path to the `scopes.yml`-equivalent policy document
    pub path: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/scopes.yml"),
        }
    }
}

/// On-disk token vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory the vault's token records live in
    pub dir: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".mcp-auth-registry")
                .join("vault"),
        }
    }
}

/// Background token refresher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefresherConfig {
    /// How often the refresher scans the vault, in seconds
    pub interval_secs: u64,
    /// Refresh a token this many seconds before it expires
    pub refresh_buffer_secs: u64,
    /// PID file path for single-instance supervision
    pub pid_file: PathBuf,
    /// Directories to (re)write downstream client configs into
    pub config_output_dirs: Vec<PathBuf>,
    /// Client-credentials endpoint for refreshing AgentCore/Bedrock egress
    /// credentials (filenames containing `agentcore`)
    pub agentcore: AgentCoreConfig,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            refresh_buffer_secs: 600,
            pid_file: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".mcp-auth-registry")
                .join("token-refresher.pid"),
            config_output_dirs: Vec::new(),
            agentcore: AgentCoreConfig::default(),
        }
    }
}

/// Client-credentials grant settings for refreshing Bedrock AgentCore
/// egress credentials, a separate OAuth domain from the gateway's own
/// identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentCoreConfig {
    /// Token endpoint for the AgentCore OAuth domain
    pub oauth_domain: Option<String>,
    /// OAuth client ID
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Requested scope, if any
    pub scope: Option<String>,
}

/// Semantic tool discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Whether the tool index is built/served at all
    pub enabled: bool,
    /// Directory containing per-server tool manifests to index
    pub manifests_dir: PathBuf,
    /// Number of top-ranked services considered in the tool-level re-rank
    pub top_services: usize,
    /// Number of tools returned per finder query
    pub top_tools: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifests_dir: PathBuf::from("config/servers"),
            top_services: 5,
            top_tools: 10,
        }
    }
}

/// Out-of-band metrics shipping configuration. Absence of either field
/// silently disables emission; this is a genuinely out-of-scope sink, its
/// config surface is modeled only because the gateway reads it at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics collector URL
    pub service_url: Option<String>,
    /// API key for the metrics collector
    pub api_key: Option<String>,
}

impl MetricsConfig {
    /// Whether shipping is configured
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.service_url.is_some() && self.api_key.is_some()
    }
}

/// A single inbound OAuth2 login provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2ProviderConfig {
    /// Whether this provider is offered on `/oauth2/providers`
    pub enabled: bool,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Userinfo endpoint, used as a fallback when JWT claims aren't enough
    pub userinfo_url: Option<String>,
    /// `response_type` query parameter, almost always `code`
    pub response_type: String,
    /// Requested scopes
    pub scopes: Vec<String>,
}

impl Default for OAuth2ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: String::new(),
            token_url: String::new(),
            userinfo_url: None,
            response_type: "code".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string(), "profile".to_string()],
        }
    }
}

/// Registry-wide OAuth2 session/redirect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2SessionConfig {
    /// Where to send the browser after a successful login
    pub success_redirect: String,
    /// Where to send the browser after a failed login
    pub error_redirect: String,
    /// Session cookie name
    pub cookie_name: String,
    /// Session cookie max age, in seconds
    pub max_age_secs: u64,
    /// `HttpOnly` flag
    pub httponly: bool,
    /// `SameSite` policy
    pub samesite: String,
    /// `Secure` flag (should be true behind TLS)
    pub secure: bool,
}

impl Default for OAuth2SessionConfig {
    fn default() -> Self {
        Self {
            success_redirect: "/".to_string(),
            error_redirect: "/login".to_string(),
            cookie_name: "mcp_gateway_session".to_string(),
            max_age_secs: 28_800,
            httponly: true,
            samesite: "lax".to_string(),
            secure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_without_a_file() {
        let config = Config::load(None).expect("defaults alone must be sufficient");
        assert_eq!(config.server.port, 8888);
        assert_eq!(config.signing.max_tokens_per_user_per_hour, 10);
    }

    #[test]
    fn metrics_disabled_unless_both_fields_set() {
        let mut metrics = MetricsConfig::default();
        assert!(!metrics.enabled());
        metrics.service_url = Some("https://metrics.example.com".to_string());
        assert!(!metrics.enabled());
        metrics.api_key = Some("key".to_string());
        assert!(metrics.enabled());
    }

    #[test]
    fn expands_var_with_value_present() {
        // SAFETY-irrelevant: setting a process env var for a single-threaded test read-back.
        unsafe { std::env::set_var("MCP_AUTH_REGISTRY_TEST_VAR", "value") };
        assert_eq!(expand_env_vars("host: ${MCP_AUTH_REGISTRY_TEST_VAR}"), "host: value");
        unsafe { std::env::remove_var("MCP_AUTH_REGISTRY_TEST_VAR") };
    }

    #[test]
    fn expands_var_to_default_when_unset() {
        assert_eq!(
            expand_env_vars("port: ${MCP_AUTH_REGISTRY_UNSET_VAR:-9000}"),
            "port: 9000"
        );
    }
}
