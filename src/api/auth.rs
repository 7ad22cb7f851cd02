use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Json, Redirect, Response},
};
use serde_json::json;

use crate::{
    error::AuthError,
    management::{refresh::TokenEndpoint, session::SessionManager},
    server::AppState,
    spotify::{client::WebApi, items},
    types::SessionView,
    utils, warning,
};

pub const SESSION_COOKIE: &str = "soundlens_session";

/// Runs the callback protocol and returns the new session id.
///
/// Order matters: the state nonce is verified and consumed before any code
/// exchange, a forged or replayed callback never reaches the authorization
/// server. The profile fetch is best effort; a session without a profile
/// is still a session.
pub async fn handle_callback<E: TokenEndpoint, A: WebApi>(
    manager: &SessionManager<E>,
    api: &A,
    params: &HashMap<String, String>,
    redirect_uri: &str,
) -> Result<String, AuthError> {
    if let Some(error) = params.get("error") {
        // the grant is over either way; retire the nonce so it cannot
        // linger in the pending set
        if let Some(state) = params.get("state") {
            let _ = manager.take_auth_state(state).await;
        }
        return Err(AuthError::Api {
            status: 400,
            body: error.clone(),
        });
    }

    let state = params.get("state").ok_or(AuthError::StateMismatch)?;
    manager.take_auth_state(state).await?;

    let code = params.get("code").ok_or(AuthError::Api {
        status: 400,
        body: "missing code".to_string(),
    })?;

    let token = manager.exchange_code(code, redirect_uri).await?;

    let profile = match items::profile(api, &token.access_token).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            warning!("profile fetch failed: {}", e);
            None
        }
    };

    Ok(manager.create_session(&token, profile).await)
}

/// Extracts and verifies the session id from the request's cookies.
pub fn session_id_from_headers(secret: &str, headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix(SESSION_COOKIE) {
            if let Some(value) = value.strip_prefix('=') {
                return utils::verify_session_cookie(secret, value);
            }
        }
    }
    None
}

fn set_cookie(secret: &str, sid: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/",
        SESSION_COOKIE,
        utils::seal_session_id(secret, sid)
    )
}

fn clear_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// `GET /auth/login` - parks a state nonce and redirects to the authorize
/// page.
pub async fn login(Extension(state): Extension<Arc<AppState>>) -> Redirect {
    let nonce = state.sessions.begin_auth().await;
    Redirect::temporary(&utils::authorize_url(&state.config, &nonce, false))
}

/// `GET /auth/callback` - completes the authorization-code flow, sets the
/// session cookie and sends the browser to the dashboard.
pub async fn callback(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let result = handle_callback(
        &state.sessions,
        &state.web_api,
        &params,
        &state.config.redirect_uri,
    )
    .await;
    // whatever happened, that session's next reconnect click may proceed
    if let Some(old_sid) = session_id_from_headers(&state.config.session_secret, &headers) {
        state.reconnect.finish(&old_sid);
    }

    match result {
        Ok(sid) => (
            AppendHeaders([(header::SET_COOKIE, set_cookie(&state.config.session_secret, &sid))]),
            Redirect::to("/dashboard"),
        )
            .into_response(),
        Err(AuthError::StateMismatch) => {
            warning!("callback rejected: state mismatch");
            Redirect::to("/auth/error?error=state_mismatch").into_response()
        }
        Err(e) => {
            warning!("callback failed: {}", e);
            Redirect::to("/auth/error?error=auth_failed").into_response()
        }
    }
}

/// `GET /auth/session` - materializes the caller's session and returns its
/// view. Without a valid cookie this is the unauthenticated view, not an
/// error.
pub async fn session(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Json<SessionView> {
    match session_id_from_headers(&state.config.session_secret, &headers) {
        Some(sid) => Json(state.sessions.materialize(&sid).await),
        None => Json(SessionView::unauthenticated()),
    }
}

/// `GET /auth/logout` - destroys the session and expires the cookie.
pub async fn logout(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(sid) = session_id_from_headers(&state.config.session_secret, &headers) {
        state.sessions.destroy(&sid).await;
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie())]),
        Redirect::to("/"),
    )
}

/// `GET /auth/reconnect` - starts a fresh grant with the consent dialog
/// forced. While one is already in flight for the caller's session,
/// answers 409 instead of issuing a second redirect.
pub async fn reconnect(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match session_id_from_headers(&state.config.session_secret, &headers) {
        Some(sid) => match state
            .reconnect
            .start(&state.sessions, &state.config, &sid)
            .await
        {
            Some(url) => Redirect::temporary(&url).into_response(),
            None => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "reconnect_in_flight" })),
            )
                .into_response(),
        },
        // no session to guard: same as a fresh sign-in, dialog forced
        None => {
            let nonce = state.sessions.begin_auth().await;
            Redirect::temporary(&utils::authorize_url(&state.config, &nonce, true))
                .into_response()
        }
    }
}
