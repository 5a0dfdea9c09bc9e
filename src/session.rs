//! Periodic session revalidation
//!
//! While a table view is mounted, a `SessionMonitor` asks the backend every
//! `interval` whether the login session is still valid. An expired session is
//! reported once and ends the monitor; transient check failures are reported
//! and polling continues. Stopping (or dropping) the monitor cancels the
//! background task, so unmounting a view never leaves a timer behind.

use crate::error::TableError;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Valid,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Expired,
    CheckFailed(String),
}

pub trait SessionApi: Send + Sync + 'static {
    fn check_session(&self) -> impl Future<Output = Result<SessionStatus, TableError>> + Send;

    /// Role of the logged-in user, when the backend reports one
    fn session_role(&self) -> impl Future<Output = Result<Option<String>, TableError>> + Send {
        async { Ok(None) }
    }
}

pub struct SessionMonitor {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Spawns the polling task. The first check happens one `interval` after
    /// start. Must be called from within a tokio runtime.
    pub fn start<S, F>(api: Arc<S>, interval: Duration, mut on_event: F) -> Self
    where
        S: SessionApi,
        F: FnMut(SessionEvent) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                let status = api.check_session().await;
                if *stop_rx.borrow() {
                    break;
                }
                match status {
                    Ok(SessionStatus::Valid) => debug!("session still valid"),
                    Ok(SessionStatus::Expired) => {
                        info!("session expired");
                        on_event(SessionEvent::Expired);
                        break;
                    }
                    Err(e) => {
                        warn!("session check failed: {}", e);
                        on_event(SessionEvent::CheckFailed(e.to_string()));
                    }
                }
            }
            debug!("session monitor stopped");
        });

        SessionMonitor {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Cancels polling. No event is emitted after this returns.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
