use crate::{
    error::AuthError,
    management::session::SessionTokens,
    spotify::client::{SpotifyClient, WebApi},
    types::{
        Artist, PlayHistoryItem, Playlist, PlaylistsResponse, RecentlyPlayedResponse,
        SpotifyProfile, TimeRange, TopArtistsResponse, TopTracksResponse, Track,
    },
};

impl<A: WebApi, S: SessionTokens> SpotifyClient<A, S> {
    /// Fetches the user's top tracks for the given time range.
    pub async fn top_tracks(
        &self,
        time_range: TimeRange,
        limit: u32,
    ) -> Result<Vec<Track>, AuthError> {
        let response: TopTracksResponse = self
            .get_json(&format!(
                "/me/top/tracks?time_range={}&limit={}",
                time_range.as_str(),
                limit
            ))
            .await?;
        Ok(response.items)
    }

    /// Fetches the user's top artists for the given time range.
    pub async fn top_artists(
        &self,
        time_range: TimeRange,
        limit: u32,
    ) -> Result<Vec<Artist>, AuthError> {
        let response: TopArtistsResponse = self
            .get_json(&format!(
                "/me/top/artists?time_range={}&limit={}",
                time_range.as_str(),
                limit
            ))
            .await?;
        Ok(response.items)
    }

    /// Fetches the user's recently played tracks. Like playlists, this
    /// endpoint is scope gated, so a grant without the history scope yields
    /// an empty list rather than an error.
    pub async fn recently_played(&self, limit: u32) -> Result<Vec<PlayHistoryItem>, AuthError> {
        let response: RecentlyPlayedResponse = self
            .get_json_or_default(&format!("/me/player/recently-played?limit={}", limit))
            .await?;
        Ok(response.items)
    }

    /// Fetches the user's playlists. A grant without the playlist scopes
    /// yields an empty list rather than an error.
    pub async fn playlists(&self, limit: u32, offset: u32) -> Result<Vec<Playlist>, AuthError> {
        let response: PlaylistsResponse = self
            .get_json_or_default(&format!(
                "/me/playlists?limit={}&offset={}",
                limit, offset
            ))
            .await?;
        Ok(response.items)
    }
}

/// Fetches the signed-in user's profile with an explicit bearer token.
///
/// Used during the callback, before the session exists, so it bypasses the
/// wrapper and performs a single plain call.
pub async fn profile<A: WebApi>(api: &A, bearer: &str) -> Result<SpotifyProfile, AuthError> {
    let reply = api.get("/me".to_string(), bearer.to_string()).await?;
    if !reply.is_success() {
        return Err(AuthError::Api {
            status: reply.status,
            body: reply.body,
        });
    }
    let profile = serde_json::from_str(&reply.body)?;
    Ok(profile)
}
