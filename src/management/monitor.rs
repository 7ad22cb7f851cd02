use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    management::{
        refresh::TokenEndpoint,
        session::{Clock, REFRESH_THRESHOLD_SECS, SessionManager},
    },
    types::{SessionErrorFlag, SessionEvent, SessionView},
};

/// Cadence and staleness window of the proactive refresh loop.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub refresh_threshold: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval: Duration::from_secs(300),
            refresh_threshold: REFRESH_THRESHOLD_SECS,
        }
    }
}

/// Whether the view warrants a proactive refresh right now.
///
/// Flagged sessions are excluded: their next refresh comes from the
/// reconnect flow, not from the monitor.
pub fn needs_refresh(view: &SessionView, now: u64, threshold: u64) -> bool {
    if !view.authenticated || view.error != SessionErrorFlag::None {
        return false;
    }
    match view.expires_at {
        Some(expires_at) => expires_at.saturating_sub(now) < threshold,
        None => false,
    }
}

/// Background task refreshing one session's credential before it goes
/// stale, so interactive calls rarely pay the refresh latency.
pub struct RefreshMonitor {
    handle: JoinHandle<()>,
}

impl RefreshMonitor {
    /// Spawns the monitor for `sid`. Each tick re-materializes the session
    /// when it is inside the staleness window; observed session events keep
    /// the monitor's picture of expiry current between ticks.
    pub fn spawn<E: TokenEndpoint + 'static>(
        manager: Arc<SessionManager<E>>,
        mut events: broadcast::Receiver<SessionEvent>,
        sid: String,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut view = manager.materialize(&sid).await;
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately and materialize above already
            // covered it
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if needs_refresh(&view, clock.now(), config.refresh_threshold) {
                            view = manager.materialize(&sid).await;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(e) if e.sid == sid => {
                            view = e.view;
                            // check right away instead of waiting out the tick
                            if needs_refresh(&view, clock.now(), config.refresh_threshold) {
                                view = manager.materialize(&sid).await;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            view = manager.materialize(&sid).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        RefreshMonitor { handle }
    }

    /// Cancels the monitor task.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for RefreshMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
