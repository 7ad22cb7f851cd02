use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::Arc,
};

use tokio::sync::{Mutex, broadcast};

use crate::{
    error::AuthError,
    management::refresh::{TokenEndpoint, TokenRefresher},
    types::{
        AccessCredential, RefreshCredential, SessionErrorFlag, SessionEvent, SessionRecord,
        SessionView, SpotifyProfile, TokenResponse,
    },
    utils, warning,
};

/// Seconds before expiry at which a credential counts as stale and gets
/// refreshed ahead of demand.
pub const REFRESH_THRESHOLD_SECS: u64 = 600;

/// How long a parked authorize nonce stays valid. A callback arriving
/// later than this is rejected like any other unknown state.
pub const AUTH_STATE_TTL_SECS: u64 = 600;

/// Sessions older than this are dropped regardless of credential state.
pub const SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

// `/auth/login` is unauthenticated, so the pending set must stay bounded
// even under churn that never completes a callback
const MAX_PENDING_STATES: usize = 128;

const EVENT_CAPACITY: usize = 16;

/// Source of the current time, in epoch seconds.
///
/// Session logic never reads the wall clock directly so that expiry and
/// staleness decisions stay deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Session records keyed by session id, with optional JSON persistence.
///
/// Persistence is best effort: a write failure never breaks an in-flight
/// request, it only costs sessions across a restart.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Volatile store, used by tests and by `serve` when no cache dir exists.
    pub fn in_memory() -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Opens a store backed by a JSON file, loading any prior sessions.
    /// A missing or unreadable file yields an empty store.
    pub async fn open(path: PathBuf) -> Self {
        let sessions = match async_fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        SessionStore {
            sessions: Mutex::new(sessions),
            path: Some(path),
        }
    }

    pub async fn get(&self, sid: &str) -> Option<SessionRecord> {
        self.sessions.lock().await.get(sid).cloned()
    }

    pub async fn put(&self, sid: String, record: SessionRecord) {
        self.sessions.lock().await.insert(sid, record);
    }

    pub async fn remove(&self, sid: &str) -> Option<SessionRecord> {
        self.sessions.lock().await.remove(sid)
    }

    /// Applies `apply` to the record under the store lock and returns the
    /// updated copy. `None` when the session disappeared in the meantime.
    pub async fn update<F>(&self, sid: &str, apply: F) -> Option<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut sessions = self.sessions.lock().await;
        let record = sessions.get_mut(sid)?;
        apply(record);
        Some(record.clone())
    }

    /// Drops every record older than `ttl`.
    pub async fn sweep_expired(&self, now: u64, ttl: u64) {
        self.sessions
            .lock()
            .await
            .retain(|_, record| now.saturating_sub(record.created_at) < ttl);
    }

    /// Writes the current sessions to disk when a path is configured.
    pub async fn persist(&self) -> crate::Res<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let sessions = self.sessions.lock().await;
        let raw = serde_json::to_string_pretty(&*sessions)?;
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::write(path, raw).await?;
        Ok(())
    }
}

/// Owns session records and the token lifecycle around them.
///
/// Every read of a session goes through [`materialize`](Self::materialize),
/// which returns a usable credential or a terminal error flag and never
/// hands out an expired token. Observers subscribe to [`SessionEvent`]s to
/// follow credential changes without polling.
pub struct SessionManager<E: TokenEndpoint> {
    store: SessionStore,
    refresher: TokenRefresher<E>,
    clock: Arc<dyn Clock>,
    refresh_threshold: u64,
    events: broadcast::Sender<SessionEvent>,
    // authorize-redirect nonces awaiting their callback, oldest first
    pending_states: Mutex<VecDeque<(String, u64)>>,
}

impl<E: TokenEndpoint> SessionManager<E> {
    pub fn new(store: SessionStore, refresher: TokenRefresher<E>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SessionManager {
            store,
            refresher,
            clock,
            refresh_threshold: REFRESH_THRESHOLD_SECS,
            events,
            pending_states: Mutex::new(VecDeque::new()),
        }
    }

    /// Overrides the staleness threshold. Tests shrink it to exercise the
    /// proactive refresh path quickly.
    pub fn with_refresh_threshold(mut self, secs: u64) -> Self {
        self.refresh_threshold = secs;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Generates and parks a state nonce for an authorize redirect.
    ///
    /// Abandoned nonces age out after [`AUTH_STATE_TTL_SECS`] and the set
    /// is capped at a fixed size, so redirects that never come back cannot
    /// grow it indefinitely.
    pub async fn begin_auth(&self) -> String {
        let state = utils::generate_state();
        let now = self.clock.now();
        let mut pending = self.pending_states.lock().await;
        while let Some((_, created)) = pending.front() {
            if now.saturating_sub(*created) >= AUTH_STATE_TTL_SECS {
                pending.pop_front();
            } else {
                break;
            }
        }
        while pending.len() >= MAX_PENDING_STATES {
            pending.pop_front();
        }
        pending.push_back((state.clone(), now));
        state
    }

    /// Consumes a pending state nonce. The callback must present the exact
    /// bytes handed out by [`begin_auth`](Self::begin_auth) while the nonce
    /// is still live; anything else is rejected before any code exchange
    /// happens.
    pub async fn take_auth_state(&self, state: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        let mut pending = self.pending_states.lock().await;
        let Some(pos) = pending.iter().position(|(s, _)| s == state) else {
            return Err(AuthError::StateMismatch);
        };
        match pending.remove(pos) {
            Some((_, created)) if now.saturating_sub(created) < AUTH_STATE_TTL_SECS => Ok(()),
            _ => Err(AuthError::StateMismatch),
        }
    }

    /// Exchanges an authorization code for the initial token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.refresher.exchange_code(code, redirect_uri).await
    }

    /// Creates a session from a fresh token exchange and returns its id.
    ///
    /// Absolute expiry is fixed here, at receipt time, so that every later
    /// usability check is a plain comparison against the clock.
    pub async fn create_session(
        &self,
        token: &TokenResponse,
        profile: Option<SpotifyProfile>,
    ) -> String {
        let sid = utils::generate_session_id();
        let now = self.clock.now();
        let record = SessionRecord {
            access: Some(AccessCredential {
                token: token.access_token.clone(),
                expires_at: now + token.expires_in,
            }),
            refresh: token.refresh_token.clone().map(RefreshCredential),
            error: SessionErrorFlag::None,
            created_at: now,
            profile,
        };
        self.store.sweep_expired(now, SESSION_TTL_SECS).await;
        self.store.put(sid.clone(), record.clone()).await;
        if let Err(e) = self.store.persist().await {
            warning!("failed to persist sessions: {}", e);
        }
        self.publish(&sid, &record);
        sid
    }

    /// Produces the current view of a session, refreshing the access
    /// credential on the way when it is stale or expired.
    ///
    /// Once a session carries an error flag the flag is the answer: no
    /// further refresh is attempted until the user reconnects.
    pub async fn materialize(&self, sid: &str) -> SessionView {
        let Some(record) = self.live_record(sid).await else {
            return SessionView::unauthenticated();
        };

        if record.error != SessionErrorFlag::None {
            return self.view_of(&record);
        }

        let now = self.clock.now();
        if let Some(access) = &record.access {
            if access.is_usable(now) && !access.is_stale(now, self.refresh_threshold) {
                return self.view_of(&record);
            }
        }

        self.refresh_and_apply(sid, record.refresh.clone()).await
    }

    /// Refreshes immediately, skipping the fast path. Used by the proactive
    /// monitor and by explicit reconnect checks. A flagged session is left
    /// untouched, same as [`materialize`](Self::materialize).
    pub async fn refresh_now(&self, sid: &str) -> SessionView {
        let Some(record) = self.live_record(sid).await else {
            return SessionView::unauthenticated();
        };
        if record.error != SessionErrorFlag::None {
            return self.view_of(&record);
        }
        self.refresh_and_apply(sid, record.refresh.clone()).await
    }

    /// Removes a session. Idempotent.
    pub async fn destroy(&self, sid: &str) {
        if self.store.remove(sid).await.is_some() {
            if let Err(e) = self.store.persist().await {
                warning!("failed to persist sessions: {}", e);
            }
            let _ = self.events.send(SessionEvent {
                sid: sid.to_string(),
                view: SessionView::unauthenticated(),
            });
        }
    }

    /// Raw record access, for diagnostics and tests. Expired records read
    /// as absent, same as everywhere else.
    pub async fn session(&self, sid: &str) -> Option<SessionRecord> {
        self.live_record(sid).await
    }

    /// Fetches a record, dropping it first when its lifetime is over.
    async fn live_record(&self, sid: &str) -> Option<SessionRecord> {
        let record = self.store.get(sid).await?;
        if self.clock.now().saturating_sub(record.created_at) >= SESSION_TTL_SECS {
            self.store.remove(sid).await;
            if let Err(e) = self.store.persist().await {
                warning!("failed to persist sessions: {}", e);
            }
            return None;
        }
        Some(record)
    }

    async fn refresh_and_apply(
        &self,
        sid: &str,
        refresh: Option<RefreshCredential>,
    ) -> SessionView {
        // The store lock is not held across the network call. Concurrent
        // callers may race a refresh each; whoever applies last converges
        // on a usable credential either way.
        let outcome = self.refresher.refresh(refresh.as_ref()).await;
        let now = self.clock.now();
        let threshold = self.refresh_threshold;

        let updated = self
            .store
            .update(sid, |record| match &outcome {
                Ok(token) => {
                    record.access = Some(AccessCredential {
                        token: token.access_token.clone(),
                        expires_at: now + token.expires_in,
                    });
                    // rotation is optional: keep the prior refresh
                    // credential when the response omits one
                    if let Some(rotated) = &token.refresh_token {
                        record.refresh = Some(RefreshCredential(rotated.clone()));
                    }
                    record.error = SessionErrorFlag::None;
                }
                Err(e) => {
                    // a racer may have landed a fresh credential while our
                    // attempt was in flight; keep theirs and stay unflagged
                    let racer_won = record
                        .access
                        .as_ref()
                        .is_some_and(|a| a.is_usable(now) && !a.is_stale(now, threshold));
                    if !racer_won {
                        record.error = match e {
                            AuthError::NoRefreshToken => SessionErrorFlag::NoRefreshToken,
                            _ => SessionErrorFlag::RefreshFailed,
                        };
                    }
                }
            })
            .await;

        let Some(record) = updated else {
            return SessionView::unauthenticated();
        };

        if let Err(e) = self.store.persist().await {
            warning!("failed to persist sessions: {}", e);
        }
        self.publish(sid, &record);
        self.view_of(&record)
    }

    fn view_of(&self, record: &SessionRecord) -> SessionView {
        match record.error {
            SessionErrorFlag::None => match &record.access {
                Some(access) => SessionView {
                    access_token: Some(access.token.clone()),
                    expires_at: Some(access.expires_at),
                    error: SessionErrorFlag::None,
                    authenticated: true,
                },
                None => SessionView::unauthenticated(),
            },
            flag => SessionView {
                access_token: None,
                expires_at: None,
                error: flag,
                authenticated: true,
            },
        }
    }

    fn publish(&self, sid: &str, record: &SessionRecord) {
        // no subscribers is fine
        let _ = self.events.send(SessionEvent {
            sid: sid.to_string(),
            view: self.view_of(record),
        });
    }
}

/// Token supply seam for the API call wrapper.
///
/// `current` hands out whatever the session yields right now; `refreshed`
/// forces a refresh, used once per call after a 401.
pub trait SessionTokens: Send + Sync {
    fn current(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
    fn refreshed(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// [`SessionTokens`] backed by a [`SessionManager`] session.
pub struct SessionTokenSource<E: TokenEndpoint> {
    manager: Arc<SessionManager<E>>,
    sid: String,
}

impl<E: TokenEndpoint> SessionTokenSource<E> {
    pub fn new(manager: Arc<SessionManager<E>>, sid: String) -> Self {
        SessionTokenSource { manager, sid }
    }

    fn token_of(view: SessionView) -> Result<String, AuthError> {
        match view.error {
            SessionErrorFlag::NoRefreshToken => Err(AuthError::NoRefreshToken),
            SessionErrorFlag::RefreshFailed => Err(AuthError::Unauthorized),
            SessionErrorFlag::None => view.access_token.ok_or(AuthError::Unauthorized),
        }
    }
}

impl<E: TokenEndpoint> SessionTokens for SessionTokenSource<E> {
    async fn current(&self) -> Result<String, AuthError> {
        Self::token_of(self.manager.materialize(&self.sid).await)
    }

    async fn refreshed(&self) -> Result<String, AuthError> {
        Self::token_of(self.manager.refresh_now(&self.sid).await)
    }
}
