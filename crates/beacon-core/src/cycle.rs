//! Periodic upload of pending observations.
//!
//! One task owns the [`UploadCycle`] and runs cycles back to back, so two
//! cycles never overlap. If a cycle outlasts the interval the missed ticks
//! are skipped rather than queued.
//!
//! Delivery is single-attempt: an observation whose send fails is logged and
//! dropped. It is not put back into the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::store::ObservationStore;
use crate::upload::ObservationSink;

/// Outcome of a single upload cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Observations taken from the store.
    pub drained: usize,
    /// Observations the sink accepted.
    pub delivered: usize,
    /// Observations dropped after a failed send.
    pub failed: usize,
}

/// Running totals across all cycles.
#[derive(Debug, Default)]
pub struct UploadCounters {
    cycles: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`UploadCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadTotals {
    /// Completed upload cycles, including empty ones.
    #[schema(example = 42)]
    pub cycles: u64,
    /// Observations delivered.
    #[schema(example = 310)]
    pub delivered: u64,
    /// Observations dropped after a failed send.
    #[schema(example = 3)]
    pub failed: u64,
}

impl UploadCounters {
    fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Current totals.
    #[must_use]
    pub fn totals(&self) -> UploadTotals {
        UploadTotals {
            cycles: self.cycles.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Shortest interval [`UploadCycle`] will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drains the store on a fixed interval and hands each observation to a sink.
pub struct UploadCycle<S> {
    store: Arc<ObservationStore>,
    sink: S,
    interval: Duration,
    flush_on_shutdown: bool,
    counters: Arc<UploadCounters>,
}

impl<S: ObservationSink> UploadCycle<S> {
    /// Create a cycle that flushes `store` into `sink` every `interval`.
    /// A zero interval is raised to [`MIN_INTERVAL`].
    pub fn new(store: Arc<ObservationStore>, sink: S, interval: Duration) -> Self {
        Self {
            store,
            sink,
            interval: interval.max(MIN_INTERVAL),
            flush_on_shutdown: true,
            counters: Arc::default(),
        }
    }

    /// Whether [`run`](Self::run) performs a final cycle after shutdown.
    #[must_use]
    pub const fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }

    /// Shared handle to the running totals.
    #[must_use]
    pub fn counters(&self) -> Arc<UploadCounters> {
        Arc::clone(&self.counters)
    }

    /// Drain the store and send every observation once.
    pub async fn run_once(&self) -> CycleReport {
        let batch = self.store.drain_all();
        let mut report = CycleReport {
            drained: batch.len(),
            ..CycleReport::default()
        };

        if batch.is_empty() {
            debug!("Upload cycle: nothing pending");
            self.counters.record(&report);
            return report;
        }

        info!(entries = batch.len(), "Beginning upload");
        for observation in &batch {
            match self.sink.send(observation).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        address = %observation.address,
                        beacon_type = %observation.beacon_type,
                        error = %e,
                        "Upload failed, dropping observation"
                    );
                }
            }
        }

        self.counters.record(&report);
        info!(
            delivered = report.delivered,
            failed = report.failed,
            "Finished upload"
        );
        report
    }

    /// Run cycles every interval until `shutdown` turns `true` or its sender
    /// is dropped. The first cycle fires one interval after the call.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "Upload cycle started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.flush_on_shutdown {
            debug!("Flushing pending observations before shutdown");
            self.run_once().await;
        }
        info!("Upload cycle stopped");
    }
}
