//! HTTP endpoints for the SoundLens server.
//!
//! Three groups of routes:
//!
//! - **Auth** ([`auth`]): the authorization-code flow (`/auth/login`,
//!   `/auth/callback`), the session view endpoint (`/auth/session`),
//!   sign-out (`/auth/logout`) and the reconnect entry point
//!   (`/auth/reconnect`). State nonces are verified server side before any
//!   code exchange, and the session cookie is signed and HttpOnly.
//! - **Data** ([`data`]): listening-history panels proxied through the
//!   session's token supply with refresh-once and bounded backoff.
//! - **Monitoring** ([`health`]): status and version for deploy checks.
//!
//! All handlers are plain async functions wired into an axum `Router` by
//! [`crate::server`], with shared state injected via `Extension`.

pub mod auth;
pub mod data;
mod health;

pub use health::health;
