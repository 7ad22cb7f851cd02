use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    management::session::Clock,
    types::{SessionErrorFlag, SessionEvent, SessionView},
};

pub const KEY_ACCESS_TOKEN: &str = "spotify_access_token";
pub const KEY_TOKEN_EXPIRY: &str = "spotify_token_expiry";
pub const KEY_CONNECTED: &str = "spotify_connected";

/// Where the mirror stands relative to the session it follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Nothing observed yet.
    Unknown,
    /// Last observation carried a usable credential; store is populated.
    Mirrored,
    /// Last observation was an error flag or sign-out; store is wiped.
    Cleared,
}

/// Client-side key-value cache for the mirrored credential.
///
/// Consumers read through [`current_token`](TokenSource::current_token),
/// which re-checks expiry so a mirrored-but-expired token never escapes.
pub struct MirrorStore {
    values: Mutex<HashMap<&'static str, String>>,
    clock: Arc<dyn Clock>,
}

impl MirrorStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MirrorStore {
            values: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn fill(&self, token: &str, expires_at: u64) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(KEY_ACCESS_TOKEN, token.to_string());
            values.insert(KEY_TOKEN_EXPIRY, expires_at.to_string());
            values.insert(KEY_CONNECTED, "true".to_string());
        }
    }

    fn wipe(&self) {
        if let Ok(mut values) = self.values.lock() {
            values.clear();
        }
    }
}

/// Hands out the mirrored token, if one is cached and still valid.
pub trait TokenSource: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

impl TokenSource for MirrorStore {
    fn current_token(&self) -> Option<String> {
        let expiry: u64 = self.get(KEY_TOKEN_EXPIRY)?.parse().ok()?;
        if expiry <= self.clock.now() {
            return None;
        }
        self.get(KEY_ACCESS_TOKEN)
    }
}

/// Keeps a [`MirrorStore`] consistent with the session views it observes.
///
/// Any error flag clears the store, so stale credentials never linger on
/// the client side of the boundary. Refresh credentials are never mirrored.
pub struct TokenMirror {
    state: MirrorState,
    store: Arc<MirrorStore>,
}

impl TokenMirror {
    pub fn new(store: Arc<MirrorStore>) -> Self {
        TokenMirror {
            state: MirrorState::Unknown,
            store,
        }
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    /// Folds one observed view into the mirror.
    pub fn observe(&mut self, view: &SessionView) {
        match (&view.error, &view.access_token) {
            (SessionErrorFlag::None, Some(token)) => {
                self.store.fill(token, view.expires_at.unwrap_or(0));
                self.state = MirrorState::Mirrored;
            }
            _ => {
                self.store.wipe();
                self.state = MirrorState::Cleared;
            }
        }
    }
}

/// Drives a [`TokenMirror`] from the session event stream, filtered to one
/// session id. Runs until the channel closes.
pub fn spawn_mirror(
    mut events: broadcast::Receiver<SessionEvent>,
    sid: String,
    store: Arc<MirrorStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut mirror = TokenMirror::new(store);
        loop {
            match events.recv().await {
                Ok(event) if event.sid == sid => mirror.observe(&event.view),
                Ok(_) => {}
                // dropped events only mean we missed intermediate views;
                // the next one re-synchronizes the store
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
