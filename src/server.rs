use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{Extension, Router, routing::get};

use crate::{
    Res, api,
    config::Config,
    info,
    management::{
        Clock, HttpTokenEndpoint, ReconnectFlow, SessionManager, SessionStore, SystemClock,
        TokenRefresher, http_client,
    },
    spotify::HttpWebApi,
};

/// Shared state for all route handlers.
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionManager<HttpTokenEndpoint>>,
    pub web_api: HttpWebApi,
    pub reconnect: ReconnectFlow,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = http_client();
        let endpoint = HttpTokenEndpoint::new(
            client.clone(),
            &config.token_url,
            &config.client_id,
            &config.client_secret,
        );
        let store = SessionStore::open(crate::config::session_store_path()).await;
        let sessions = Arc::new(SessionManager::new(
            store,
            TokenRefresher::new(endpoint),
            clock.clone(),
        ));
        let web_api = HttpWebApi::new(client, &config.api_url);
        AppState {
            config,
            sessions,
            web_api,
            reconnect: ReconnectFlow::new(clock),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/auth/login", get(api::auth::login))
        .route("/auth/callback", get(api::auth::callback))
        .route("/auth/session", get(api::auth::session))
        .route("/auth/logout", get(api::auth::logout))
        .route("/auth/reconnect", get(api::auth::reconnect))
        .route("/api/top-tracks", get(api::data::top_tracks))
        .route("/api/top-artists", get(api::data::top_artists))
        .route("/api/recently-played", get(api::data::recently_played))
        .route("/api/playlists", get(api::data::playlists))
        .layer(Extension(state))
}

/// Binds the listener and serves until shutdown.
pub async fn start_api_server(state: Arc<AppState>) -> Res<()> {
    let addr = SocketAddr::from_str(&state.config.server_addr)?;
    let app = router(state);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
