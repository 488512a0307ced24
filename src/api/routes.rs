//! API route handlers for the connections-auth service.
//!
//! All handlers receive `SharedState` via Axum state extraction.
//! Browser flows (GET callbacks) answer with redirects; API flows answer
//! with JSON.

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use super::cookies::{self, OAUTH_STATE_COOKIE, SESSION_COOKIE};
use crate::auth::{Account, SessionClaims};
use crate::crypto::{SecretString, STATE_MAX_AGE_SECS};
use crate::error::AuthError;
use crate::providers::{Credentials, CredentialsProvider, OAuthProvider, ProviderInfo, ProviderKind};
use crate::SharedState;

// =============================================================================
// V1 Router
// =============================================================================

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Sign-in ──────────────────────────────────────────────────────
        .route("/auth/providers", get(auth_providers))
        .route("/auth/signin/{provider}", get(auth_signin))
        .route(
            "/auth/callback/{provider}",
            get(auth_callback_redirect).post(auth_callback_credentials),
        )
        // ── Session ──────────────────────────────────────────────────────
        .route("/auth/session", get(auth_session))
        .route("/auth/signout", post(auth_signout))
        .route("/auth/token/{provider}", get(auth_provider_token))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "connections-auth",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Providers
// =============================================================================

#[derive(Serialize)]
struct ProviderEntry {
    #[serde(flatten)]
    info: ProviderInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    signin_url: Option<String>,
    callback_url: String,
}

/// GET /v1/auth/providers — List configured sign-in providers.
async fn auth_providers(State(state): State<SharedState>) -> impl IntoResponse {
    let providers: Vec<ProviderEntry> = state
        .registry
        .list()
        .into_iter()
        .map(|info| ProviderEntry {
            signin_url: (info.kind == ProviderKind::Oauth)
                .then(|| format!("{}/v1/auth/signin/{}", state.config.base_url, info.id)),
            callback_url: state.config.callback_url(&info.id),
            info,
        })
        .collect();

    Json(json!({
        "data": {
            "providers": providers,
            "sign_in_page": state.config.sign_in_page,
        }
    }))
}

// =============================================================================
// OAuth sign-in
// =============================================================================

#[derive(Deserialize)]
struct SigninQuery {
    #[serde(default)]
    scopes: String,
}

/// GET /v1/auth/signin/:provider — Redirect to an OAuth provider.
///
/// The signed state also goes into an `oauth_state` cookie; the callback
/// only accepts a state matching that cookie.
async fn auth_signin(
    State(state): State<SharedState>,
    Path(provider_id): Path<String>,
    Query(q): Query<SigninQuery>,
) -> Result<Response, AuthError> {
    let provider = state
        .registry
        .oauth(&provider_id)
        .ok_or_else(|| AuthError::ProviderNotFound(provider_id.clone()))?;

    let signed_state = state
        .state_signer
        .issue_state(chrono::Utc::now().timestamp())?;

    let scopes: Vec<String> = q
        .scopes
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let callback_url = state.config.callback_url(&provider_id);
    let auth_url = provider.auth_url(&scopes, &signed_state, &callback_url);

    let state_cookie = cookies::state_cookie(
        &signed_state,
        std::time::Duration::from_secs(STATE_MAX_AGE_SECS.unsigned_abs()),
        secure_cookies(&state),
    );

    Ok((
        [(header::SET_COOKIE, state_cookie)],
        Redirect::temporary(&auth_url),
    )
        .into_response())
}

#[derive(Deserialize)]
struct OAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_sign_in(
    state: &SharedState,
    provider: &dyn OAuthProvider,
    query: &str,
    state_cookie: Option<&str>,
    existing: Option<SessionClaims>,
) -> Result<SessionClaims, AuthError> {
    let q: OAuthCallbackQuery = serde_urlencoded::from_str(query)
        .map_err(|e| AuthError::BadRequest(format!("invalid callback query: {e}")))?;

    if let Some(error) = q.error {
        return Err(AuthError::FlowError(format!("provider returned {error}")));
    }

    let signed_state = q
        .state
        .ok_or_else(|| AuthError::BadRequest("missing state".into()))?;
    let expected = state_cookie.ok_or(AuthError::InvalidState)?;
    if !bool::from(expected.as_bytes().ct_eq(signed_state.as_bytes())) {
        return Err(AuthError::InvalidState);
    }
    state
        .state_signer
        .check_state(&signed_state, chrono::Utc::now().timestamp())?;

    let code = q
        .code
        .ok_or_else(|| AuthError::BadRequest("missing code".into()))?;

    let callback_url = state.config.callback_url(provider.id());
    let tokens = provider.exchange_code(&code, &callback_url).await?;
    let user = provider.fetch_user(&tokens).await?;

    state
        .sessions
        .on_sign_in(existing, &user, &Account::oauth(provider.id(), tokens))
        .await
}

// =============================================================================
// Credentials sign-in
// =============================================================================

async fn credentials_sign_in(
    state: &SharedState,
    provider: &dyn CredentialsProvider,
    credentials: &Credentials,
    existing: Option<SessionClaims>,
) -> Result<SessionClaims, AuthError> {
    let user = provider
        .authorize(credentials)
        .await
        .ok_or(AuthError::CredentialsSignin)?;

    state
        .sessions
        .on_sign_in(existing, &user, &Account::credentials(provider.id()))
        .await
}

fn query_credentials(query: &str) -> Result<Credentials, AuthError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|e| AuthError::BadRequest(format!("invalid query: {e}")))?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

fn body_credentials(headers: &HeaderMap, body: &[u8]) -> Result<Credentials, AuthError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let query = std::str::from_utf8(body)
            .map_err(|_| AuthError::BadRequest("form body is not UTF-8".into()))?;
        query_credentials(query)
    } else {
        serde_json::from_slice(body)
            .map_err(|e| AuthError::BadRequest(format!("invalid credentials body: {e}")))
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// GET /v1/auth/callback/:provider — Browser callback.
///
/// OAuth providers come back with `code` and `state`; the Telegram widget
/// redirects with its signed fields in the query string. Either way the
/// browser ends up on the post-login URL with a session cookie, or on the
/// sign-in page with an `error` code.
async fn auth_callback_redirect(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let query = query.unwrap_or_default();
    let existing = existing_session(&state, &headers);
    let secure = secure_cookies(&state);
    let mut set_cookies = Vec::new();

    let result = if let Some(provider) = state.registry.oauth(&provider_id) {
        // The state cookie is single use, whatever the outcome.
        set_cookies.push((header::SET_COOKIE, cookies::clear_state_cookie(secure)));
        let state_cookie = cookies::read(&headers, OAUTH_STATE_COOKIE);
        oauth_sign_in(&state, provider, &query, state_cookie, existing).await
    } else if let Some(provider) = state.registry.credentials(&provider_id) {
        match query_credentials(&query) {
            Ok(credentials) => credentials_sign_in(&state, provider, &credentials, existing).await,
            Err(e) => Err(e),
        }
    } else {
        Err(AuthError::ProviderNotFound(provider_id.clone()))
    };

    let signed_in = result.and_then(|claims| state.sessions.issue(&claims));
    match signed_in {
        Ok(token) => {
            set_cookies.push((header::SET_COOKIE, session_cookie(&state, &token)));
            (
                AppendHeaders(set_cookies),
                Redirect::temporary(&state.config.post_login_url),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("[Callback:{provider_id}] sign-in failed: {e}");
            (
                AppendHeaders(set_cookies),
                Redirect::temporary(&state.config.sign_in_error_url(e.code())),
            )
                .into_response()
        }
    }
}

/// POST /v1/auth/callback/:provider — Credentials sign-in from JSON or form body.
async fn auth_callback_credentials(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
    body: Bytes,
) -> Result<Response, AuthError> {
    let provider = state
        .registry
        .credentials(&provider_id)
        .ok_or_else(|| AuthError::ProviderNotFound(provider_id.clone()))?;

    let credentials = body_credentials(&headers, &body)?;
    let existing = existing_session(&state, &headers);

    let claims = credentials_sign_in(&state, provider, &credentials, existing)
        .await
        .inspect_err(|e| tracing::warn!("[Callback:{provider_id}] sign-in failed: {e}"))?;
    let token = state.sessions.issue(&claims)?;
    let session = state.sessions.session(&claims);

    Ok((
        [(header::SET_COOKIE, session_cookie(&state, &token))],
        Json(json!({ "data": { "token": token, "session": session } })),
    )
        .into_response())
}

// =============================================================================
// Session
// =============================================================================

/// Session token from `Authorization: Bearer` or, failing that, the cookie.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| cookies::read(headers, SESSION_COOKIE))
}

fn require_session(state: &SharedState, headers: &HeaderMap) -> Result<SessionClaims, AuthError> {
    let token = session_token(headers).ok_or(AuthError::Unauthorized)?;
    state.sessions.decode(token)
}

/// A still-valid session, so a new sign-in adds to its connections.
fn existing_session(state: &SharedState, headers: &HeaderMap) -> Option<SessionClaims> {
    cookies::read(headers, SESSION_COOKIE).and_then(|token| state.sessions.decode(token).ok())
}

fn secure_cookies(state: &SharedState) -> bool {
    state.config.base_url.starts_with("https://")
}

fn session_cookie(state: &SharedState, token: &str) -> String {
    cookies::session_cookie(token, state.sessions.ttl(), secure_cookies(state))
}

/// GET /v1/auth/session — The client-visible session.
async fn auth_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AuthError> {
    let claims = require_session(&state, &headers)?;
    Ok(Json(json!({ "data": state.sessions.session(&claims) })))
}

/// POST /v1/auth/signout — Drop the session cookie.
async fn auth_signout(State(state): State<SharedState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cookies::clear_session_cookie(secure_cookies(&state)))],
        Json(json!({ "data": { "success": true } })),
    )
}

/// GET /v1/auth/token/:provider — Decrypted provider tokens for internal callers.
async fn auth_provider_token(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
) -> Result<Json<Value>, AuthError> {
    let expected = state
        .config
        .auth_service_secret
        .as_ref()
        .ok_or(AuthError::Unauthorized)?;
    let presented = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok())
        .map(SecretString::from)
        .ok_or(AuthError::Unauthorized)?;
    if presented != *expected {
        return Err(AuthError::Unauthorized);
    }

    let claims = require_session(&state, &headers)?;
    let tokens = state
        .sessions
        .provider_tokens(&claims, &provider_id)?
        .ok_or_else(|| AuthError::NotFound(format!("{provider_id} connection")))?;

    Ok(Json(json!({ "data": tokens })))
}
