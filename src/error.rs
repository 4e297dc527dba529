//! Crate-wide error type

use thiserror::Error;

/// Convenience result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds, matching the auth/discovery control plane's error taxonomy.
///
/// Each variant is mapped to an HTTP status only at the outermost handler
/// layer (`auth_engine`/`http`) — nothing below that layer constructs an
/// HTTP type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// No credential was presented on the request
    #[error("missing credential")]
    AuthMissing,

    /// A credential was presented but its signature does not verify
    #[error("invalid signature")]
    AuthInvalidSignature,

    /// A credential was presented but is expired
    #[error("credential expired")]
    AuthExpired,

    /// A credential was presented but is structurally invalid
    #[error("malformed credential: {0}")]
    AuthMalformed(String),

    /// The principal's scopes do not grant access to the requested server/tool
    #[error("access denied to {server}.{method}")]
    AuthzDenied {
        /// Target server name
        server: String,
        /// Target method or tool
        method: String,
    },

    /// The principal has no scopes configured at all (fail closed)
    #[error("no scopes configured for principal")]
    PolicyEmpty,

    /// The upstream identity provider could not be reached or returned an error
    #[error("upstream provider error: {0}")]
    UpstreamProvider(String),

    /// Token issuance rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimited,

    /// The on-disk token vault contains a record that failed to parse or verify
    #[error("token vault corrupt: {0}")]
    VaultCorrupt(String),

    /// A required configuration value was absent
    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    /// I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failure
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Anything else, not meant to be matched on by callers
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error maps to, used only by the outermost
    /// handler layer when building a response.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Error::AuthMissing | Error::AuthInvalidSignature | Error::AuthExpired => 401,
            Error::AuthMalformed(_) => 401,
            Error::AuthzDenied { .. } | Error::PolicyEmpty => 403,
            Error::RateLimited => 429,
            Error::Config(_) | Error::ConfigMissing(_) => 400,
            Error::UpstreamProvider(_) | Error::VaultCorrupt(_) => 500,
            Error::Io(_) | Error::Json(_) | Error::Yaml(_) | Error::Http(_) | Error::Internal(_) => 500,
        }
    }
}
