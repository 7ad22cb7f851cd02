use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    config::Config,
    management::{
        refresh::TokenEndpoint,
        session::{Clock, SessionManager},
    },
    utils,
};

/// How long a started reconnect blocks another one for the same session.
/// An abandoned redirect (closed tab) releases the slot after this.
pub const RECONNECT_TTL_SECS: u64 = 300;

/// Guards the user-facing reconnect path.
///
/// Once a session is flagged, automatic refresh stops and recovery runs
/// through a full authorize redirect with the consent dialog forced, so
/// the user sees what is happening. The guard is keyed by session id:
/// repeated clicks on the same session while a redirect is in flight are
/// no-ops, while other sessions reconnect independently.
pub struct ReconnectFlow {
    in_flight: Mutex<HashMap<String, u64>>,
    clock: Arc<dyn Clock>,
}

impl ReconnectFlow {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        ReconnectFlow {
            in_flight: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn is_connecting(&self, sid: &str) -> bool {
        let now = self.clock.now();
        match self.in_flight.lock() {
            Ok(in_flight) => in_flight
                .get(sid)
                .is_some_and(|started| now.saturating_sub(*started) < RECONNECT_TTL_SECS),
            Err(_) => false,
        }
    }

    /// Claims the session's in-flight slot. `false` while a reconnect for
    /// the same session is already running and not yet aged out.
    pub fn begin(&self, sid: &str) -> bool {
        let now = self.clock.now();
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return false;
        };
        in_flight.retain(|_, started| now.saturating_sub(*started) < RECONNECT_TTL_SECS);
        if in_flight.contains_key(sid) {
            return false;
        }
        in_flight.insert(sid.to_string(), now);
        true
    }

    /// Releases the session's slot once its callback lands (or fails).
    pub fn finish(&self, sid: &str) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(sid);
        }
    }

    /// Starts a reconnect for `sid`: parks a fresh state nonce and returns
    /// the authorize URL to redirect to. `None` when one is already in
    /// flight for that session.
    pub async fn start<E: TokenEndpoint>(
        &self,
        manager: &SessionManager<E>,
        config: &Config,
        sid: &str,
    ) -> Option<String> {
        if !self.begin(sid) {
            return None;
        }
        let state = manager.begin_auth().await;
        Some(utils::authorize_url(config, &state, true))
    }
}
