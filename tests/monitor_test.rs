use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use soundlens::{
    error::AuthError,
    management::{
        Clock, MonitorConfig, RefreshMonitor, SessionManager, SessionStore, TokenEndpoint,
        TokenRefresher,
        monitor::needs_refresh,
    },
    types::{HttpReply, SessionErrorFlag, SessionEvent, SessionView, TokenResponse},
};
use tokio::sync::broadcast;

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

fn view(expires_at: Option<u64>, error: SessionErrorFlag, authenticated: bool) -> SessionView {
    SessionView {
        access_token: expires_at.map(|_| "access".to_string()),
        expires_at,
        error,
        authenticated,
    }
}

#[test]
fn refresh_needed_inside_staleness_window() {
    let v = view(Some(1_500), SessionErrorFlag::None, true);
    assert!(needs_refresh(&v, 1_000, 600));
}

#[test]
fn refresh_not_needed_while_fresh() {
    let v = view(Some(1_601), SessionErrorFlag::None, true);
    assert!(!needs_refresh(&v, 1_000, 600));
}

#[test]
fn refresh_needed_once_expired() {
    let v = view(Some(900), SessionErrorFlag::None, true);
    assert!(needs_refresh(&v, 1_000, 600));
}

#[test]
fn flagged_session_is_left_alone() {
    let v = view(Some(1_100), SessionErrorFlag::RefreshFailed, true);
    assert!(!needs_refresh(&v, 1_000, 600));
}

#[test]
fn unauthenticated_view_is_left_alone() {
    assert!(!needs_refresh(&SessionView::unauthenticated(), 1_000, 600));
}

#[tokio::test]
async fn monitor_refreshes_before_expiry() {
    let clock_value = Arc::new(AtomicU64::new(1_000));
    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = ScriptedEndpoint {
        replies: Mutex::new(
            vec![HttpReply {
                status: 200,
                body: r#"{"access_token":"access-2","expires_in":3600,"token_type":"Bearer"}"#
                    .to_string(),
            }]
            .into(),
        ),
        calls: calls.clone(),
    };
    let clock: Arc<dyn Clock> = Arc::new(TestClock(clock_value.clone()));
    let manager = Arc::new(SessionManager::new(
        SessionStore::in_memory(),
        TokenRefresher::new(endpoint),
        clock.clone(),
    ));

    let sid = manager
        .create_session(
            &TokenResponse {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: 3_600,
                token_type: Some("Bearer".to_string()),
                scope: None,
            },
            None,
        )
        .await;

    let monitor = RefreshMonitor::spawn(
        manager.clone(),
        manager.subscribe(),
        sid.clone(),
        clock,
        MonitorConfig {
            interval: Duration::from_millis(10),
            refresh_threshold: 600,
        },
    );

    // nothing to do while the credential is fresh
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // move inside the staleness window; the next tick refreshes
    clock_value.store(4_100, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(2), async {
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("monitor never refreshed");

    let record = manager.session(&sid).await.unwrap();
    assert_eq!(record.access.unwrap().token, "access-2");

    // the refreshed credential is fresh again, no further calls
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    monitor.stop();
}

#[tokio::test]
async fn monitor_checks_on_view_changes_between_ticks() {
    let clock_value = Arc::new(AtomicU64::new(1_000));
    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = ScriptedEndpoint {
        replies: Mutex::new(
            vec![HttpReply {
                status: 200,
                body: r#"{"access_token":"access-2","expires_in":3600,"token_type":"Bearer"}"#
                    .to_string(),
            }]
            .into(),
        ),
        calls: calls.clone(),
    };
    let clock: Arc<dyn Clock> = Arc::new(TestClock(clock_value.clone()));
    let manager = Arc::new(SessionManager::new(
        SessionStore::in_memory(),
        TokenRefresher::new(endpoint),
        clock.clone(),
    ));

    let sid = manager
        .create_session(
            &TokenResponse {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: 3_600,
                token_type: Some("Bearer".to_string()),
                scope: None,
            },
            None,
        )
        .await;

    // ticks never fire inside the test; only observed events can trigger
    let (tx, rx) = broadcast::channel(16);
    let monitor = RefreshMonitor::spawn(
        manager.clone(),
        rx,
        sid.clone(),
        clock,
        MonitorConfig {
            interval: Duration::from_secs(3_600),
            refresh_threshold: 600,
        },
    );

    clock_value.store(4_100, Ordering::SeqCst);
    tx.send(SessionEvent {
        sid: sid.clone(),
        view: SessionView {
            access_token: Some("access-1".to_string()),
            expires_at: Some(4_600),
            error: SessionErrorFlag::None,
            authenticated: true,
        },
    })
    .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("monitor never reacted to the view change");

    let record = manager.session(&sid).await.unwrap();
    assert_eq!(record.access.unwrap().token, "access-2");
    monitor.stop();
}

#[tokio::test]
async fn stopped_monitor_does_nothing() {
    let clock_value = Arc::new(AtomicU64::new(1_000));
    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = ScriptedEndpoint {
        replies: Mutex::new(VecDeque::new()),
        calls: calls.clone(),
    };
    let clock: Arc<dyn Clock> = Arc::new(TestClock(clock_value.clone()));
    let manager = Arc::new(SessionManager::new(
        SessionStore::in_memory(),
        TokenRefresher::new(endpoint),
        clock.clone(),
    ));

    let sid = manager
        .create_session(
            &TokenResponse {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: 3_600,
                token_type: None,
                scope: None,
            },
            None,
        )
        .await;

    let monitor = RefreshMonitor::spawn(
        manager.clone(),
        manager.subscribe(),
        sid,
        clock,
        MonitorConfig {
            interval: Duration::from_millis(10),
            refresh_threshold: 600,
        },
    );
    monitor.stop();

    clock_value.store(4_100, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
