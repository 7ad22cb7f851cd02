use serde::{Deserialize, Serialize};

/// Short-lived bearer credential for the Spotify Web API.
///
/// `expires_at` is an absolute epoch-seconds instant fixed at issuance
/// (`now + expires_in`); it is never recomputed from a relative value later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCredential {
    pub token: String,
    pub expires_at: u64,
}

impl AccessCredential {
    /// A credential is usable iff `now < expires_at`. Recomputed fresh on
    /// every check; never cached as a boolean.
    pub fn is_usable(&self, now: u64) -> bool {
        now < self.expires_at
    }

    /// A usable credential within `threshold` seconds of expiry is stale
    /// and should be preemptively replaced.
    pub fn is_stale(&self, now: u64, threshold: u64) -> bool {
        self.is_usable(now) && self.expires_at - now < threshold
    }
}

/// Long-lived, rotatable refresh credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCredential(pub String);

/// Error state carried by a session. Cleared on successful refresh, set on
/// failure, reset by a fresh sign-in through the reconnect flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorFlag {
    None,
    NoRefreshToken,
    RefreshFailed,
}

/// Spotify profile fields captured when the session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Server-held session state: the single source of truth for a user's
/// credentials. The refresh credential never leaves this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access: Option<AccessCredential>,
    pub refresh: Option<RefreshCredential>,
    pub error: SessionErrorFlag,
    /// Epoch seconds at creation; records past their lifetime are swept.
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SpotifyProfile>,
}

/// The view produced by session materialization and served to clients.
///
/// A non-`None` error flag means the token, even if syntactically present,
/// must not be trusted for new calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub access_token: Option<String>,
    pub expires_at: Option<u64>,
    pub error: SessionErrorFlag,
    pub authenticated: bool,
}

impl SessionView {
    pub fn unauthenticated() -> Self {
        SessionView {
            access_token: None,
            expires_at: None,
            error: SessionErrorFlag::None,
            authenticated: false,
        }
    }
}

/// A session state change, broadcast to client-side observers (token
/// mirror, refresh monitor).
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub sid: String,
    pub view: SessionView,
}

/// Standard OAuth2 token endpoint response, for both the
/// authorization-code and refresh-token grants. `refresh_token` is
/// optional on refresh: absence means "keep using the previous one".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

/// A minimal HTTP reply as seen by the token and API transports.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Time window selector for the personalization endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }

    /// Parses a query-string value, falling back to the default window.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("short_term") => TimeRange::ShortTerm,
            Some("long_term") => TimeRange::LongTerm,
            _ => TimeRange::MediumTerm,
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub album: AlbumRef,
    pub artists: Vec<TrackArtist>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub collaborative: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayHistoryItem {
    pub track: Track,
    pub played_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTracksResponse {
    pub items: Vec<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopArtistsResponse {
    pub items: Vec<Artist>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentlyPlayedResponse {
    pub items: Vec<PlayHistoryItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistsResponse {
    pub items: Vec<Playlist>,
}
