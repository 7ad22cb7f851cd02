use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::config::Config;

pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

pub fn generate_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    STANDARD.encode(format!("{client_id}:{client_secret}"))
}

// secret wraps the message on both sides so the digest is not extendable
fn sign_session_id(secret: &str, sid: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(sid.as_bytes());
    hasher.update(b".");
    hasher.update(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Produces the tamper-evident cookie value `sid.sig` for a session id.
pub fn seal_session_id(secret: &str, sid: &str) -> String {
    format!("{sid}.{}", sign_session_id(secret, sid))
}

/// Verifies a `sid.sig` cookie value and returns the session id, or None
/// when the signature does not match byte-for-byte.
pub fn verify_session_cookie(secret: &str, value: &str) -> Option<String> {
    let (sid, sig) = value.split_once('.')?;
    if sig == sign_session_id(secret, sid) {
        Some(sid.to_string())
    } else {
        None
    }
}

pub fn percent_encode(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            _ => format!("%{:02X}", c as u8),
        })
        .collect()
}

/// Builds the Spotify authorization redirect URL. The `state` nonce must be
/// registered with the session manager before redirecting so the callback
/// can verify it.
pub fn authorize_url(config: &Config, state: &str, show_dialog: bool) -> String {
    format!(
        "{auth_url}?client_id={client_id}&response_type=code&redirect_uri={redirect_uri}&scope={scope}&state={state}&show_dialog={show_dialog}",
        auth_url = config.auth_url,
        client_id = percent_encode(&config.client_id),
        redirect_uri = percent_encode(&config.redirect_uri),
        scope = percent_encode(&config.scope),
        state = percent_encode(state),
        show_dialog = show_dialog,
    )
}
