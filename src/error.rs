use std::fmt;

/// Error taxonomy for the authentication core and the Spotify API wrapper.
///
/// Refresh failures are normally captured into a session's error flag rather
/// than propagated; the variants here surface at component boundaries (route
/// handlers, the API call wrapper, startup checks).
#[derive(Debug)]
pub enum AuthError {
    /// A refresh was attempted with no refresh credential available.
    /// Terminal until a fresh sign-in.
    NoRefreshToken,
    /// The authorization server rejected the refresh or was unreachable.
    /// Terminal until the reconnect flow runs. Carries the upstream status
    /// and body for diagnostics; never the credential values themselves.
    RefreshFailed { status: u16, body: String },
    /// A 401 that survived the single refresh-and-retry, or a call made
    /// against a session in a terminal error state.
    Unauthorized,
    /// Retries exhausted on 429 responses.
    RateLimited,
    /// Retries exhausted on 5xx responses or transport failures.
    ServiceUnavailable,
    /// Any other non-2xx upstream response, surfaced as-is.
    Api { status: u16, body: String },
    /// A required server-side secret or URI is absent. Raised at startup,
    /// never silently ignored.
    MissingConfiguration(&'static str),
    /// The CSRF state parameter on the OAuth callback was missing or did
    /// not match an issued one. No session is created.
    StateMismatch,
    /// Transport-level failure (connect error, timeout). Treated like a
    /// non-2xx response for retry/backoff purposes.
    Http(String),
    IoError(std::io::Error),
    SerdeError(serde_json::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoRefreshToken => write!(f, "no refresh token available"),
            AuthError::RefreshFailed { status, body } => {
                write!(f, "token refresh failed ({status}): {body}")
            }
            AuthError::Unauthorized => write!(f, "unauthorized"),
            AuthError::RateLimited => write!(f, "rate limited by the Spotify API"),
            AuthError::ServiceUnavailable => write!(f, "Spotify API unavailable"),
            AuthError::Api { status, body } => write!(f, "Spotify API error ({status}): {body}"),
            AuthError::MissingConfiguration(name) => {
                write!(f, "missing required configuration: {name}")
            }
            AuthError::StateMismatch => write!(f, "OAuth state parameter mismatch"),
            AuthError::Http(msg) => write!(f, "http transport error: {msg}"),
            AuthError::IoError(e) => write!(f, "io error: {e}"),
            AuthError::SerdeError(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::IoError(err)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::SerdeError(err)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest error strings contain URLs at most, never header values,
        // so bearer credentials cannot leak through here.
        AuthError::Http(err.to_string())
    }
}
