//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use beacon_core::{ListenerHandle, ListenerStats, Observation, ObservationStore};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shared application state handed to every handler.
pub type SharedState = Arc<AppState>;

/// State behind the status API.
#[derive(Debug)]
pub struct AppState {
    listener: ListenerHandle,
    recent: RwLock<VecDeque<Observation>>,
    recent_capacity: usize,
    sink_kind: &'static str,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state reading from `listener`, keeping at most
    /// `recent_capacity` recent observations.
    #[must_use]
    pub fn new(listener: ListenerHandle, recent_capacity: usize, sink_kind: &'static str) -> Self {
        Self {
            listener,
            recent: RwLock::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
            sink_kind,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Wrap in an [`Arc`] for use as router state.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Observations waiting for the next upload cycle.
    #[must_use]
    pub fn store(&self) -> Arc<ObservationStore> {
        self.listener.store()
    }

    /// Listener and upload counters.
    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        self.listener.stats()
    }

    /// Configured sink kind (`phant` or `json`).
    #[must_use]
    pub const fn sink_kind(&self) -> &'static str {
        self.sink_kind
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Wall-clock start time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record an observation in the recent buffer, evicting the oldest when
    /// full.
    pub async fn push_recent(&self, observation: Observation) {
        if self.recent_capacity == 0 {
            return;
        }
        let mut recent = self.recent.write().await;
        while recent.len() >= self.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(observation);
    }

    /// Recent observations, newest first.
    pub async fn recent(&self) -> Vec<Observation> {
        self.recent.read().await.iter().rev().cloned().collect()
    }
}

/// Feed every broadcast observation into the recent buffer until the
/// channel closes or the task is aborted.
pub fn spawn_recent_feed(
    state: SharedState,
    mut events: broadcast::Receiver<Observation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(observation) => state.push_recent(observation).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Recent observation feed lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Recent observation feed stopped");
    })
}
