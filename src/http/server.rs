//! HTTP router and handlers for the Authorization Engine's external surface.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth_engine::{AuthEngine, ValidateHeaders};
use crate::config::Config;
use crate::discovery::ToolIndex;
use crate::error::Error;
use crate::policy::Policy;
use crate::session::SessionSigner;
use crate::token::TokenIssuer;

use super::oauth_routes;

/// Shared application state, injected into every handler.
pub struct AppState {
    pub config: Config,
    pub auth_engine: AuthEngine,
    pub policy: Arc<Policy>,
    /// `"cognito"` or `"keycloak"` — read off the configured provider once
    /// at startup, for the `/config` response.
    pub provider_kind: &'static str,
    pub session_signer: Arc<SessionSigner>,
    pub token_issuer: Arc<TokenIssuer>,
    pub tool_index: Option<ToolIndex>,
    pub http_client: reqwest::Client,
}

/// Build the axum router over every endpoint in the HTTP surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(auth_config))
        .route("/validate", get(validate))
        .route("/internal/tokens", post(issue_token))
        .route("/oauth2/providers", get(oauth_routes::list_providers))
        .route("/oauth2/login/{provider}", get(oauth_routes::login))
        .route("/oauth2/callback/{provider}", get(oauth_routes::callback))
        .route("/oauth2/logout/{provider}", get(oauth_routes::logout))
        .route("/tools/find", get(find_tools))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "mcp-auth-registry" }))
}

async fn auth_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = if state.provider_kind == "keycloak" {
        json!({
            "auth_type": "keycloak",
            "description": "Keycloak JWT token validation",
            "required_headers": ["Authorization: Bearer <token>"],
            "optional_headers": [],
        })
    } else {
        json!({
            "auth_type": "cognito",
            "description": "Header-based Cognito token validation",
            "required_headers": [
                "Authorization: Bearer <token>",
                "X-User-Pool-Id: <pool_id>",
                "X-Client-Id: <client_id>"
            ],
            "optional_headers": ["X-Region: <region> (default: us-east-1)"],
        })
    };
    Json(body)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn validate(State(state): State<Arc<AppState>>, headers: HeaderMap, addr: Option<axum::extract::ConnectInfo<std::net::SocketAddr>>) -> Response {
    let validate_headers = ValidateHeaders {
        authorization: header_value(&headers, "x-authorization"),
        cookie: header_value(&headers, "cookie"),
        user_pool_id: header_value(&headers, "x-user-pool-id"),
        client_id: header_value(&headers, "x-client-id"),
        region: header_value(&headers, "x-region").unwrap_or_else(|| "us-east-1".to_string()),
        original_url: header_value(&headers, "x-original-url"),
        body: header_value(&headers, "x-body"),
        client_ip: addr.map(|info| info.0.ip().to_string()),
    };

    match state.auth_engine.validate(&validate_headers).await {
        Ok(outcome) => {
            let mut response = Json(&outcome).into_response();
            let response_headers = response.headers_mut();
            set_header(response_headers, "X-User", &outcome.username);
            set_header(response_headers, "X-Username", &outcome.username);
            set_header(response_headers, "X-Client-Id", &outcome.client_id);
            set_header(response_headers, "X-Scopes", &outcome.scopes.join(" "));
            set_header(response_headers, "X-Auth-Method", &outcome.method);
            set_header(response_headers, "X-Server-Name", outcome.server_name.as_deref().unwrap_or(""));
            set_header(response_headers, "X-Tool-Name", outcome.tool_name.as_deref().unwrap_or(""));
            response
        }
        Err(e) => {
            warn!(error = %e, "validation failed");
            error_response(&e)
        }
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = axum::http::HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn error_response(error: &Error) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(json!({ "valid": false, "error": error.to_string() }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert("WWW-Authenticate", axum::http::HeaderValue::from_static("Bearer"));
    }
    response
}

#[derive(Debug, Deserialize)]
struct GenerateTokenRequest {
    user_context: UserContext,
    #[serde(default)]
    requested_scopes: Vec<String>,
    #[serde(default = "default_expires_in_hours")]
    expires_in_hours: u32,
    #[serde(default)]
    description: Option<String>,
}

fn default_expires_in_hours() -> u32 {
    8
}

#[derive(Debug, Deserialize)]
struct UserContext {
    username: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerateTokenResponse {
    access_token: String,
    expires_in: u64,
    scope: String,
    issued_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

async fn issue_token(State(state): State<Arc<AppState>>, Json(request): Json<GenerateTokenRequest>) -> Response {
    let Some(username) = request.user_context.username else {
        return (StatusCode::BAD_REQUEST, "username is required in user context").into_response();
    };

    let mint_request = crate::token::issuer::MintRequest {
        username: &username,
        user_scopes: &request.user_context.scopes,
        requested_scopes: &request.requested_scopes,
        expires_in_hours: request.expires_in_hours,
        description: request.description.clone(),
    };

    match state.token_issuer.mint(&mint_request) {
        Ok((access_token, claims)) => {
            info!(user = %crate::auth_engine::redact::hash_username(&username), "issued self-signed token");
            Json(GenerateTokenResponse {
                access_token,
                expires_in: claims.exp.saturating_sub(claims.iat),
                scope: claims.scope,
                issued_at: claims.iat,
                description: claims.description,
            })
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct FindToolsQuery {
    query: String,
    #[serde(default = "default_top_k_services")]
    top_k_services: usize,
    #[serde(default = "default_top_n_tools")]
    top_n_tools: usize,
}

fn default_top_k_services() -> usize {
    3
}

fn default_top_n_tools() -> usize {
    1
}

async fn find_tools(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(query): axum::extract::Query<FindToolsQuery>,
) -> Response {
    let Some(index) = &state.tool_index else {
        return (StatusCode::NOT_FOUND, "tool discovery is disabled").into_response();
    };

    match index.find(&query.query, query.top_k_services, query.top_n_tools) {
        Ok(matches) => Json(matches).into_response(),
        Err(e) => error_response(&e),
    }
}
