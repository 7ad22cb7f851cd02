//! Spotify Web API access.
//!
//! [`SpotifyClient`] wraps every request with the session's token supply:
//! a valid credential is materialized up front, a 401 earns exactly one
//! refresh-and-replay, and transient failures (429, 5xx, transport) back
//! off exponentially up to a bounded retry count. Endpoint methods in
//! [`items`] stay thin over that wrapper.

pub mod client;
pub mod items;

pub use client::{CallAttemptState, HttpWebApi, RetryConfig, SpotifyClient, WebApi};
