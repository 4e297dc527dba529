//! Inbound browser OAuth2 login: `/oauth2/providers`, `/oauth2/login/{provider}`,
//! `/oauth2/callback/{provider}`, `/oauth2/logout/{provider}`.
//!
//! This is a separate flow from the Provider Adapter's JWKS-based bearer
//! verification: it exists so a human can sign into the registry's own
//! browser-facing endpoints (e.g. `/internal/tokens`) and get back a session
//! cookie, the same one the Authorization Engine accepts at `/validate`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth_engine::redact;
use crate::config::OAuth2ProviderConfig;
use crate::http::server::AppState;
use crate::principal::SessionPayload;

#[derive(Debug, Serialize, Deserialize)]
struct TempSession {
    state: String,
    provider: String,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

/// `GET /oauth2/providers` — list enabled login providers.
pub async fn list_providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let names: Vec<&str> = state
        .config
        .oauth2_providers
        .iter()
        .filter(|(_, p)| p.enabled)
        .map(|(name, _)| name.as_str())
        .collect();
    axum::Json(serde_json::json!({ "providers": names }))
}

/// `GET /oauth2/login/{provider}` — generate state, stash it in a short-lived
/// signed cookie, redirect to the provider's authorization endpoint.
pub async fn login(State(state): State<Arc<AppState>>, Path(provider): Path<String>, jar: CookieJar) -> Response {
    let Some(provider_config) = state.config.oauth2_providers.get(&provider).filter(|p| p.enabled) else {
        return (StatusCode::NOT_FOUND, format!("provider {provider} not found or disabled")).into_response();
    };

    let oauth_state = random_state();
    let redirect_uri = state.config.oauth2_session.success_redirect.clone();
    let temp_session = TempSession {
        state: oauth_state.clone(),
        provider: provider.clone(),
        redirect_uri,
    };

    let Ok(signed) = state.session_signer.sign(&temp_session) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to start oauth2 flow").into_response();
    };

    let callback_uri = format!("{}/oauth2/callback/{provider}", external_base_url(&state));
    let params = [
        ("client_id", provider_config.client_id.clone()),
        ("response_type", provider_config.response_type.clone()),
        ("scope", provider_config.scopes.join(" ")),
        ("state", oauth_state),
        ("redirect_uri", callback_uri),
    ];
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
        query.append_pair(key, value);
    }
    let auth_url = format!("{}?{}", provider_config.auth_url, query.finish());

    let cookie = Cookie::build(("oauth2_temp_session", signed))
        .max_age(::time::Duration::seconds(600))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    info!(provider = %provider, "initiated oauth2 login");
    (jar.add(cookie), Redirect::to(&auth_url)).into_response()
}

/// `GET /oauth2/callback/{provider}` — exchange the code, resolve user info,
/// mint a registry session cookie.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    if let Some(error) = query.error {
        warn!(provider = %provider, error = %error, "oauth2 provider returned an error");
        return Redirect::to(&format!("{}?error=oauth2_error", state.config.oauth2_session.error_redirect)).into_response();
    }

    let (Some(code), Some(returned_state), Some(temp_cookie)) =
        (query.code, query.state, jar.get("oauth2_temp_session"))
    else {
        return (StatusCode::BAD_REQUEST, "missing required oauth2 parameters").into_response();
    };

    let temp_session: TempSession = match state.session_signer.unsign(temp_cookie.value(), 600) {
        Ok(session) => session,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid or expired oauth2 session").into_response(),
    };

    if temp_session.state != returned_state || temp_session.provider != provider {
        return (StatusCode::BAD_REQUEST, "state or provider mismatch").into_response();
    }

    let Some(provider_config) = state.config.oauth2_providers.get(&provider) else {
        return (StatusCode::NOT_FOUND, "provider not found").into_response();
    };

    let callback_uri = format!("{}/oauth2/callback/{provider}", external_base_url(&state));
    let token_response = match exchange_code_for_token(&state, provider_config, &code, &callback_uri).await {
        Ok(response) => response,
        Err(e) => {
            warn!(provider = %provider, error = %e, "token exchange failed");
            return Redirect::to(&format!("{}?error=oauth2_callback_failed", state.config.oauth2_session.error_redirect))
                .into_response();
        }
    };

    let (username, email, groups) = resolve_user_identity(&state, provider_config, &token_response).await;
    let Some(username) = username else {
        return Redirect::to(&format!("{}?error=oauth2_callback_failed", state.config.oauth2_session.error_redirect))
            .into_response();
    };

    let session_payload = SessionPayload { username: username.clone(), groups };
    let Ok(signed_session) = state.session_signer.sign(&session_payload) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to establish session").into_response();
    };

    let session_config = &state.config.oauth2_session;
    let session_cookie = Cookie::build((session_config.cookie_name.clone(), signed_session))
        .max_age(::time::Duration::seconds(i64::try_from(session_config.max_age_secs).unwrap_or(28800)))
        .http_only(session_config.httponly)
        .same_site(same_site_from_str(&session_config.samesite))
        .secure(session_config.secure)
        .path("/")
        .build();

    info!(provider = %provider, user = %redact::hash_username(&username), email = email.as_deref().unwrap_or(""), "oauth2 login succeeded");

    let jar = jar.add(session_cookie).remove(Cookie::from("oauth2_temp_session"));
    (jar, Redirect::to(&temp_session.redirect_uri)).into_response()
}

/// `GET /oauth2/logout/{provider}` — clear the registry session cookie.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::from(state.config.oauth2_session.cookie_name.clone()));
    (jar, Redirect::to(&state.config.oauth2_session.success_redirect)).into_response()
}

async fn exchange_code_for_token(
    state: &AppState,
    provider_config: &OAuth2ProviderConfig,
    code: &str,
    callback_uri: &str,
) -> crate::error::Result<TokenResponse> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("client_id", provider_config.client_id.as_str());
    form.insert("client_secret", provider_config.client_secret.as_str());
    form.insert("code", code);
    form.insert("redirect_uri", callback_uri);

    let response = state.http_client.post(&provider_config.token_url).form(&form).send().await?;
    let response = response.error_for_status()?;
    let token_response: TokenResponse = response.json().await?;
    Ok(token_response)
}

/// Resolve `(username, email, groups)` for the freshly-authenticated user.
/// Keycloak's ID token carries claims directly; everything else falls back
/// to the provider's userinfo endpoint.
async fn resolve_user_identity(
    state: &AppState,
    provider_config: &OAuth2ProviderConfig,
    token_response: &TokenResponse,
) -> (Option<String>, Option<String>, Vec<String>) {
    if let Some(id_token) = &token_response.id_token
        && let Some(claims) = decode_id_token_unverified(id_token)
    {
        return (claims.username, claims.email, claims.groups);
    }

    let Some(userinfo_url) = &provider_config.userinfo_url else {
        return (None, None, Vec::new());
    };

    let Ok(response) = state
        .http_client
        .get(userinfo_url)
        .bearer_auth(&token_response.access_token)
        .send()
        .await
    else {
        return (None, None, Vec::new());
    };

    let Ok(info) = response.json::<serde_json::Value>().await else {
        return (None, None, Vec::new());
    };

    let username = info
        .get("preferred_username")
        .or_else(|| info.get("username"))
        .or_else(|| info.get("email"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let email = info.get("email").and_then(serde_json::Value::as_str).map(str::to_string);
    let groups = info
        .get("groups")
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    (username, email, groups)
}

struct IdTokenClaims {
    username: Option<String>,
    email: Option<String>,
    groups: Vec<String>,
}

fn decode_id_token_unverified(id_token: &str) -> Option<IdTokenClaims> {
    let parts: Vec<&str> = id_token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return None;
    }
    let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, parts[1]).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&payload).ok()?;

    let username = value
        .get("preferred_username")
        .or_else(|| value.get("sub"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let email = value.get("email").and_then(serde_json::Value::as_str).map(str::to_string);
    let groups = value
        .get("groups")
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Some(IdTokenClaims { username, email, groups })
}

fn external_base_url(state: &AppState) -> String {
    format!("http://{}:{}", state.config.server.host, state.config.server.port)
}

fn same_site_from_str(value: &str) -> SameSite {
    match value.to_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

fn random_state() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
