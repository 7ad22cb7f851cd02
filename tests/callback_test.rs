use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use soundlens::{
    api::auth::handle_callback,
    config::Config,
    error::AuthError,
    management::{
        Clock, RECONNECT_TTL_SECS, ReconnectFlow, SessionManager, SessionStore, TokenEndpoint,
        TokenRefresher,
    },
    spotify::WebApi,
    types::HttpReply,
};

struct TestClock(Arc<AtomicU64>);

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct ScriptedEndpoint {
    replies: Mutex<VecDeque<HttpReply>>,
    calls: Arc<AtomicUsize>,
}

impl TokenEndpoint for ScriptedEndpoint {
    async fn post_form(&self, _form: Vec<(String, String)>) -> Result<HttpReply, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected call to token endpoint");
        Ok(reply)
    }
}

struct ScriptedApi {
    replies: Mutex<VecDeque<HttpReply>>,
}

impl WebApi for &ScriptedApi {
    async fn get(&self, _path: String, _bearer: String) -> Result<HttpReply, AuthError> {
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected API call"))
    }
}

const TOKEN_BODY: &str =
    r#"{"access_token":"access-1","refresh_token":"refresh-1","expires_in":3600,"token_type":"Bearer"}"#;
const PROFILE_BODY: &str =
    r#"{"id":"user-1","display_name":"Listener","email":"listener@example.com"}"#;

fn manager_with(
    replies: Vec<HttpReply>,
) -> (Arc<SessionManager<ScriptedEndpoint>>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = ScriptedEndpoint {
        replies: Mutex::new(replies.into()),
        calls: calls.clone(),
    };
    let manager = Arc::new(SessionManager::new(
        SessionStore::in_memory(),
        TokenRefresher::new(endpoint),
        Arc::new(TestClock(Arc::new(AtomicU64::new(1_000)))),
    ));
    (manager, calls)
}

fn api_with(replies: Vec<HttpReply>) -> ScriptedApi {
    ScriptedApi {
        replies: Mutex::new(replies.into()),
    }
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn valid_callback_creates_session_with_profile() {
    let (manager, _) = manager_with(vec![HttpReply {
        status: 200,
        body: TOKEN_BODY.to_string(),
    }]);
    let api = api_with(vec![HttpReply {
        status: 200,
        body: PROFILE_BODY.to_string(),
    }]);

    let state = manager.begin_auth().await;
    let query = params(&[("code", "auth-code"), ("state", &state)]);
    let sid = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap();

    let record = manager.session(&sid).await.unwrap();
    assert_eq!(record.access.unwrap().token, "access-1");
    assert_eq!(record.refresh.unwrap().0, "refresh-1");
    assert_eq!(record.profile.unwrap().id, "user-1");
}

#[tokio::test]
async fn forged_state_rejected_before_code_exchange() {
    let (manager, calls) = manager_with(vec![]);
    let api = api_with(vec![]);

    manager.begin_auth().await;
    let query = params(&[("code", "auth-code"), ("state", "forged")]);
    let err = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::StateMismatch));
    // the exchange never happened
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_state_rejected() {
    let (manager, calls) = manager_with(vec![]);
    let api = api_with(vec![]);

    let query = params(&[("code", "auth-code")]);
    let err = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StateMismatch));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_error_param_fails_without_exchange() {
    let (manager, calls) = manager_with(vec![]);
    let api = api_with(vec![]);

    let state = manager.begin_auth().await;
    let query = params(&[("error", "access_denied"), ("state", &state)]);
    let err = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Api { status: 400, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // the denied grant retired its nonce
    assert!(matches!(
        manager.take_auth_state(&state).await,
        Err(AuthError::StateMismatch)
    ));
}

#[tokio::test]
async fn missing_code_fails_after_state_check() {
    let (manager, calls) = manager_with(vec![]);
    let api = api_with(vec![]);

    let state = manager.begin_auth().await;
    let query = params(&[("state", &state)]);
    let err = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Api { status: 400, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_profile_fetch_still_creates_session() {
    let (manager, _) = manager_with(vec![HttpReply {
        status: 200,
        body: TOKEN_BODY.to_string(),
    }]);
    let api = api_with(vec![HttpReply {
        status: 503,
        body: String::new(),
    }]);

    let state = manager.begin_auth().await;
    let query = params(&[("code", "auth-code"), ("state", &state)]);
    let sid = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap();

    let record = manager.session(&sid).await.unwrap();
    assert!(record.profile.is_none());
    assert_eq!(record.access.unwrap().token, "access-1");
}

fn test_config() -> Config {
    Config {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_uri: "http://127.0.0.1:3000/auth/callback".to_string(),
        scope: "user-read-email".to_string(),
        session_secret: "secret".to_string(),
        server_addr: "127.0.0.1:3000".to_string(),
        auth_url: "https://accounts.spotify.com/authorize".to_string(),
        token_url: "https://accounts.spotify.com/api/token".to_string(),
        api_url: "https://api.spotify.com/v1".to_string(),
    }
}

fn reconnect_at(now: u64) -> (ReconnectFlow, Arc<AtomicU64>) {
    let clock_value = Arc::new(AtomicU64::new(now));
    let flow = ReconnectFlow::new(Arc::new(TestClock(clock_value.clone())));
    (flow, clock_value)
}

#[tokio::test]
async fn reconnect_forces_dialog_and_parks_a_nonce() {
    let (manager, _) = manager_with(vec![]);
    let (reconnect, _) = reconnect_at(1_000);

    let url = reconnect
        .start(&manager, &test_config(), "sid-1")
        .await
        .unwrap();
    assert!(url.contains("show_dialog=true"));
    assert!(reconnect.is_connecting("sid-1"));

    // the parked nonce is the one the callback will verify
    let state = url.split("state=").nth(1).unwrap().split('&').next().unwrap();
    assert!(manager.take_auth_state(state).await.is_ok());
}

#[tokio::test]
async fn second_reconnect_click_is_a_no_op() {
    let (manager, _) = manager_with(vec![]);
    let (reconnect, _) = reconnect_at(1_000);

    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_some());
    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_none());

    // the callback re-arms the guard
    reconnect.finish("sid-1");
    assert!(!reconnect.is_connecting("sid-1"));
    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_some());
}

#[tokio::test]
async fn reconnect_guard_is_per_session() {
    let (manager, _) = manager_with(vec![]);
    let (reconnect, _) = reconnect_at(1_000);

    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_some());
    // another user's session is not blocked
    assert!(reconnect.start(&manager, &test_config(), "sid-2").await.is_some());
    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_none());
}

#[tokio::test]
async fn abandoned_reconnect_releases_the_slot() {
    let (manager, _) = manager_with(vec![]);
    let (reconnect, clock) = reconnect_at(1_000);

    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_some());
    // the user closed the tab; no callback ever calls finish
    clock.store(1_000 + RECONNECT_TTL_SECS, Ordering::SeqCst);
    assert!(!reconnect.is_connecting("sid-1"));
    assert!(reconnect.start(&manager, &test_config(), "sid-1").await.is_some());
}

#[tokio::test]
async fn rejected_code_exchange_surfaces_error() {
    let (manager, _) = manager_with(vec![HttpReply {
        status: 400,
        body: r#"{"error":"invalid_grant"}"#.to_string(),
    }]);
    let api = api_with(vec![]);

    let state = manager.begin_auth().await;
    let query = params(&[("code", "bad-code"), ("state", &state)]);
    let err = handle_callback(&manager, &&api, &query, "http://localhost/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Api { status: 400, .. }));
}
