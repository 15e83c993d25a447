//! The running pipeline: advertisement feed in, periodic uploads out.
//!
//! [`BeaconListener`] owns two tasks. The ingest task classifies every
//! advertisement and records matches in the [`ObservationStore`]. The upload
//! task runs the [`UploadCycle`]. Both stop on [`BeaconListener::shutdown`],
//! ingest first, so the final flush sees every advertisement that arrived.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use utoipa::ToSchema;

use crate::bluetooth::AdvertisementFeed;
use crate::classifier::classify;
use crate::config::UploadConfig;
use crate::cycle::{UploadCounters, UploadCycle, UploadTotals};
use crate::store::ObservationStore;
use crate::types::{AdvertisementRecord, BeaconType, Observation};
use crate::upload::ObservationSink;

/// Capacity of the observation broadcast channel. Slow subscribers lag and
/// skip ahead rather than stall ingest.
pub const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct IngestCounters {
    received: AtomicU64,
    eddystone: AtomicU64,
    ibeacon: AtomicU64,
}

/// Counters for a running listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListenerStats {
    /// Advertisements seen, beacon or not.
    #[schema(example = 1200)]
    pub received: u64,
    /// Advertisements classified as Eddystone.
    #[schema(example = 480)]
    pub eddystone: u64,
    /// Advertisements classified as iBeacon.
    #[schema(example = 310)]
    pub ibeacon: u64,
    /// Advertisements no filter accepted.
    #[schema(example = 410)]
    pub ignored: u64,
    /// Observations waiting for the next upload cycle.
    #[schema(example = 4)]
    pub pending: usize,
    /// Upload cycle totals.
    pub upload: UploadTotals,
}

/// Classify-and-store step shared by the listener handle and its ingest task.
#[derive(Debug)]
struct Ingestor {
    store: Arc<ObservationStore>,
    counters: IngestCounters,
    events: broadcast::Sender<Observation>,
}

impl Ingestor {
    fn ingest(&self, record: &AdvertisementRecord) -> Option<BeaconType> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let Some(beacon_type) = classify(record) else {
            trace!(
                address = %record.address,
                name = record.local_name.as_deref(),
                rssi = record.rssi,
                "Ignoring non-beacon advertisement"
            );
            return None;
        };

        match beacon_type {
            BeaconType::Eddystone => self.counters.eddystone.fetch_add(1, Ordering::Relaxed),
            BeaconType::IBeacon => self.counters.ibeacon.fetch_add(1, Ordering::Relaxed),
        };

        let observation = Observation::from_record(record, beacon_type);
        debug!(
            address = %observation.address,
            name = record.local_name.as_deref(),
            rssi = observation.rssi,
            beacon_type = %beacon_type,
            "Beacon observed"
        );
        self.store.upsert(observation.clone());
        // No subscribers is fine.
        let _ = self.events.send(observation);
        Some(beacon_type)
    }

    fn stats(&self, upload: &UploadCounters) -> ListenerStats {
        let received = self.counters.received.load(Ordering::Relaxed);
        let eddystone = self.counters.eddystone.load(Ordering::Relaxed);
        let ibeacon = self.counters.ibeacon.load(Ordering::Relaxed);
        ListenerStats {
            received,
            eddystone,
            ibeacon,
            ignored: received.saturating_sub(eddystone + ibeacon),
            pending: self.store.len(),
            upload: upload.totals(),
        }
    }

    async fn run(
        self: Arc<Self>,
        mut records: mpsc::Receiver<AdvertisementRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                record = records.recv() => match record {
                    Some(record) => {
                        self.ingest(&record);
                    }
                    None => {
                        info!("Advertisement feed closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        // Refuse new records, then take what is already queued.
                        records.close();
                        while let Some(record) = records.recv().await {
                            self.ingest(&record);
                        }
                        break;
                    }
                }
            }
        }
        debug!("Ingest task stopped");
    }
}

/// Cloneable read side of a [`BeaconListener`], for status reporting.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    ingestor: Arc<Ingestor>,
    upload_counters: Arc<UploadCounters>,
}

impl ListenerHandle {
    /// Receive every observation as it is stored.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Observation> {
        self.ingestor.events.subscribe()
    }

    /// The store holding observations awaiting upload.
    #[must_use]
    pub fn store(&self) -> Arc<ObservationStore> {
        Arc::clone(&self.ingestor.store)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        self.ingestor.stats(&self.upload_counters)
    }
}

/// Owns the ingest and upload tasks for one advertisement feed.
///
/// Dropping the listener without calling [`shutdown`](Self::shutdown) still
/// stops both tasks, but nothing waits for them.
#[derive(Debug)]
pub struct BeaconListener {
    handle: ListenerHandle,
    stop_ingest: watch::Sender<bool>,
    stop_upload: watch::Sender<bool>,
    ingest_task: JoinHandle<()>,
    upload_task: JoinHandle<()>,
    producer: Option<JoinHandle<()>>,
}

impl BeaconListener {
    /// Start consuming `feed` and uploading to `sink` every
    /// `settings.interval()`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S>(feed: AdvertisementFeed, sink: S, settings: &UploadConfig) -> Self
    where
        S: ObservationSink + 'static,
    {
        let store = Arc::new(ObservationStore::new());
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        let ingestor = Arc::new(Ingestor {
            store: Arc::clone(&store),
            counters: IngestCounters::default(),
            events,
        });

        let cycle = UploadCycle::new(store, sink, settings.interval())
            .with_flush_on_shutdown(settings.flush_on_shutdown);
        let upload_counters = cycle.counters();

        let (stop_ingest, ingest_rx) = watch::channel(false);
        let (stop_upload, upload_rx) = watch::channel(false);
        let (records, producer) = feed.into_parts();

        let ingest_task = tokio::spawn(Arc::clone(&ingestor).run(records, ingest_rx));
        let upload_task = tokio::spawn(cycle.run(upload_rx));

        info!(
            interval_secs = settings.interval_secs,
            flush_on_shutdown = settings.flush_on_shutdown,
            "Beacon listener started"
        );

        Self {
            handle: ListenerHandle {
                ingestor,
                upload_counters,
            },
            stop_ingest,
            stop_upload,
            ingest_task,
            upload_task,
            producer,
        }
    }

    /// Classify `record` and, if it is a beacon, store and broadcast it.
    pub fn ingest(&self, record: &AdvertisementRecord) -> Option<BeaconType> {
        self.handle.ingestor.ingest(record)
    }

    /// Read-only handle sharing this listener's store and counters.
    #[must_use]
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    /// Receive every observation as it is stored.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Observation> {
        self.handle.subscribe()
    }

    /// The store holding observations awaiting upload.
    #[must_use]
    pub fn store(&self) -> Arc<ObservationStore> {
        self.handle.store()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        self.handle.stats()
    }

    /// Stop ingest, then the advertisement producer, then the upload cycle,
    /// waiting for each. Returns the final counters, which include the
    /// shutdown flush when it is enabled.
    pub async fn shutdown(self) -> ListenerStats {
        info!("Stopping beacon listener");

        let _ = self.stop_ingest.send(true);
        if let Err(e) = self.ingest_task.await {
            warn!(error = %e, "Ingest task ended abnormally");
        }

        // The ingest task closed the receiver, which ends the producer.
        if let Some(producer) = self.producer {
            if let Err(e) = producer.await {
                warn!(error = %e, "Advertisement producer ended abnormally");
            }
        }

        let _ = self.stop_upload.send(true);
        if let Err(e) = self.upload_task.await {
            warn!(error = %e, "Upload task ended abnormally");
        }

        let stats = self.handle.stats();
        info!(
            received = stats.received,
            delivered = stats.upload.delivered,
            failed = stats.upload.failed,
            "Beacon listener stopped"
        );
        stats
    }
}
