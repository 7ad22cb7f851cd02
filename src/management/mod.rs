//! Session and token lifecycle: materialization, refresh, the client-side
//! token mirror, the proactive refresh monitor and the reconnect flow.

pub mod mirror;
pub mod monitor;
pub mod reconnect;
pub mod refresh;
pub mod session;

pub use mirror::{MirrorState, MirrorStore, TokenMirror, TokenSource};
pub use monitor::{MonitorConfig, RefreshMonitor};
pub use reconnect::{RECONNECT_TTL_SECS, ReconnectFlow};
pub use refresh::{HttpTokenEndpoint, TokenEndpoint, TokenRefresher, http_client};
pub use session::{
    AUTH_STATE_TTL_SECS, Clock, REFRESH_THRESHOLD_SECS, SESSION_TTL_SECS, SessionManager,
    SessionStore, SessionTokenSource, SessionTokens, SystemClock,
};
