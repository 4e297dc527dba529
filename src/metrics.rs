//! Local process counters, exposed via the `metrics` facade and, when the
//! `metrics` feature is enabled, scraped over HTTP by the bundled
//! Prometheus exporter. Shipping these anywhere else is out of scope; this
//! module only describes and increments them.

use telemetry_metrics as metrics;

const TOKENS_ISSUED: &str = "mcp_auth_tokens_issued_total";
const TOKENS_VALIDATED: &str = "mcp_auth_tokens_validated_total";
const TOKENS_EXPIRED: &str = "mcp_auth_tokens_expired_total";
const POLICY_DENIALS: &str = "mcp_auth_policy_denials_total";
const PROVIDER_FAILURES: &str = "mcp_auth_provider_verify_failures_total";

/// Describe every counter and, if the `metrics` feature is compiled in,
/// install the Prometheus recorder. Call once at process startup.
pub fn install() {
    metrics::describe_counter!(TOKENS_ISSUED, "Self-signed tokens minted by /internal/tokens");
    metrics::describe_counter!(TOKENS_VALIDATED, "Credentials accepted by /validate, labeled by method");
    metrics::describe_counter!(TOKENS_EXPIRED, "Credentials rejected by /validate as expired");
    metrics::describe_counter!(POLICY_DENIALS, "Requests denied by the scope policy");
    metrics::describe_counter!(PROVIDER_FAILURES, "Provider JWKS verification failures, labeled by provider");

    install_recorder();
}

#[cfg(feature = "metrics")]
fn install_recorder() {
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!(error = %e, "failed to install Prometheus metrics recorder");
    }
}

#[cfg(not(feature = "metrics"))]
fn install_recorder() {}

/// A self-signed token was minted.
pub fn token_issued() {
    metrics::counter!(TOKENS_ISSUED).increment(1);
}

/// A credential was accepted by `/validate`, via `method`
/// (`cognito`, `keycloak`, `self_signed`, `session_cookie`).
pub fn token_validated(method: &str) {
    metrics::counter!(TOKENS_VALIDATED, "method" => method.to_string()).increment(1);
}

/// A credential was rejected by `/validate` as expired.
pub fn token_expired() {
    metrics::counter!(TOKENS_EXPIRED).increment(1);
}

/// A request was denied by the scope policy.
pub fn policy_denied() {
    metrics::counter!(POLICY_DENIALS).increment(1);
}

/// A provider's JWKS verification rejected a token, for `provider`
/// (`cognito`, `keycloak`).
pub fn provider_verify_failed(provider: &str) {
    metrics::counter!(PROVIDER_FAILURES, "provider" => provider.to_string()).increment(1);
}
