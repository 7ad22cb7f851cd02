//! Configuration management for the SoundLens auth service.
//!
//! This module handles loading and accessing configuration values from
//! environment variables and `.env` files. Required secrets (client
//! credentials, session secret) fail fast at startup with a
//! `MissingConfiguration` error rather than silently disabling auth; the
//! Spotify endpoint URLs carry production defaults and can be overridden
//! for tests or mock servers.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{env, path::PathBuf};

use crate::error::AuthError;

const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:3000";

/// Scopes requested on sign-in. Matches what the dashboard, the recently
/// played feed and the playback widget need.
const DEFAULT_SCOPE: &str = "user-read-email user-read-private user-top-read \
    user-read-recently-played user-read-playback-state user-modify-playback-state \
    playlist-read-private playlist-read-collaborative streaming";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Looks for the file in the platform-specific local data directory under
/// `soundlens/.env`:
/// - Linux: `~/.local/share/soundlens/.env`
/// - macOS: `~/Library/Application Support/soundlens/.env`
/// - Windows: `%LOCALAPPDATA%/soundlens/.env`
///
/// A missing file is not an error; configuration may come entirely from the
/// process environment (e.g. in deployment).
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created.
pub async fn load_env() -> Result<(), String> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("soundlens/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Environment variables required for the service to start. `check` reports
/// on exactly this list.
pub const REQUIRED_VARS: [&str; 4] = [
    "SPOTIFY_CLIENT_ID",
    "SPOTIFY_CLIENT_SECRET",
    "SPOTIFY_REDIRECT_URI",
    "SOUNDLENS_SESSION_SECRET",
];

/// Runtime configuration, resolved once at startup and injected into the
/// components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    /// Secret used to sign session cookies. Never logged.
    pub session_secret: String,
    pub server_addr: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
}

impl Config {
    /// Resolves the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfiguration` naming the first absent required
    /// variable. Optional endpoint URLs fall back to the Spotify defaults.
    pub fn from_env() -> Result<Self, AuthError> {
        Ok(Config {
            client_id: required("SPOTIFY_CLIENT_ID")?,
            client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: required("SPOTIFY_REDIRECT_URI")?,
            session_secret: required("SOUNDLENS_SESSION_SECRET")?,
            scope: env::var("SPOTIFY_SCOPE").unwrap_or_else(|_| DEFAULT_SCOPE.to_string()),
            server_addr: env::var("SERVER_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_SERVER_ADDRESS.to_string()),
            auth_url: env::var("SPOTIFY_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string()),
            token_url: env::var("SPOTIFY_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            api_url: env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        })
    }
}

fn required(name: &'static str) -> Result<String, AuthError> {
    env::var(name).map_err(|_| AuthError::MissingConfiguration(name))
}

/// Returns the path where session records are persisted between restarts.
pub fn session_store_path() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("soundlens/cache/sessions.json");
    path
}
