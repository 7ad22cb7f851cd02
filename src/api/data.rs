use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension,
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::{
    api::auth::session_id_from_headers,
    error::AuthError,
    management::session::SessionTokenSource,
    server::AppState,
    spotify::SpotifyClient,
    types::TimeRange,
};

const DEFAULT_LIMIT: u32 = 20;

fn limit(params: &HashMap<String, String>) -> u32 {
    params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_LIMIT)
        .min(50)
}

fn client(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<SpotifyClient<crate::spotify::HttpWebApi, SessionTokenSource<crate::management::HttpTokenEndpoint>>, Response>
{
    let sid = session_id_from_headers(&state.config.session_secret, headers)
        .ok_or_else(|| error_response(AuthError::Unauthorized))?;
    let tokens = SessionTokenSource::new(state.sessions.clone(), sid);
    Ok(SpotifyClient::new(state.web_api.clone(), tokens))
}

/// Maps a call failure to its HTTP shape. Terminal auth errors read as
/// 401 so the client knows to surface the reconnect prompt; transient
/// exhaustion keeps its own status so only the affected panel degrades.
fn error_response(e: AuthError) -> Response {
    let (status, label) = match &e {
        AuthError::NoRefreshToken | AuthError::Unauthorized | AuthError::RefreshFailed { .. } => {
            (StatusCode::UNAUTHORIZED, "unauthorized")
        }
        AuthError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        AuthError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
        AuthError::Api { status, .. } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            "upstream_error",
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    (status, Json(json!({ "error": label }))).into_response()
}

/// `GET /api/top-tracks?time_range=&limit=`
pub async fn top_tracks(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let client = match client(&state, &headers) {
        Ok(client) => client,
        Err(response) => return response,
    };
    let range = TimeRange::from_param(params.get("time_range").map(String::as_str));
    match client.top_tracks(range, limit(&params)).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/top-artists?time_range=&limit=`
pub async fn top_artists(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let client = match client(&state, &headers) {
        Ok(client) => client,
        Err(response) => return response,
    };
    let range = TimeRange::from_param(params.get("time_range").map(String::as_str));
    match client.top_artists(range, limit(&params)).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/recently-played?limit=`
pub async fn recently_played(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let client = match client(&state, &headers) {
        Ok(client) => client,
        Err(response) => return response,
    };
    match client.recently_played(limit(&params)).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/playlists?limit=&offset=` - empty items when the grant lacks
/// the playlist scopes.
pub async fn playlists(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let client = match client(&state, &headers) {
        Ok(client) => client,
        Err(response) => return response,
    };
    let offset = params
        .get("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    match client.playlists(limit(&params), offset).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => error_response(e),
    }
}
