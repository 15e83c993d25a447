//! Bluetooth Low Energy advertisement sources.
//!
//! This module provides functionality to:
//! - Scan for BLE advertisements through BlueZ (feature `bluetooth`)
//! - Replay synthetic beacon traffic on hosts without a radio (feature `mock-bluetooth`)
//!
//! Either way the result is an [`AdvertisementFeed`]: a bounded channel of
//! [`AdvertisementRecord`]s plus the task producing them. Dropping the
//! receiving side stops the producer.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::AdvertisementRecord;

/// Errors raised while setting up or running a scan.
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// No adapter with the requested name, or no adapter at all.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// The adapter is off and powering it on was not allowed.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The BlueZ D-Bus session could not be opened.
    #[error("Failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Error detail.
        message: String,
    },

    /// Discovery could not be started.
    #[error("Bluetooth discovery failed: {message}")]
    DiscoveryFailed {
        /// Error detail.
        message: String,
    },

    /// Any other Bluetooth stack error.
    #[error("Bluetooth error: {message}")]
    Internal {
        /// Error detail.
        message: String,
    },
}

/// Result type for Bluetooth operations.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

/// A stream of advertisements and the task that produces it.
#[derive(Debug)]
pub struct AdvertisementFeed {
    receiver: mpsc::Receiver<AdvertisementRecord>,
    producer: Option<JoinHandle<()>>,
}

impl AdvertisementFeed {
    /// A feed driven by the returned sender instead of a scanner task.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<AdvertisementRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                receiver: rx,
                producer: None,
            },
        )
    }

    fn spawned(receiver: mpsc::Receiver<AdvertisementRecord>, producer: JoinHandle<()>) -> Self {
        Self {
            receiver,
            producer: Some(producer),
        }
    }

    /// Split into the receiver and the producer task, if any.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Receiver<AdvertisementRecord>, Option<JoinHandle<()>>) {
        (self.receiver, self.producer)
    }
}

#[cfg(feature = "bluetooth")]
pub use scanner::BluetoothScanner;

#[cfg(feature = "bluetooth")]
mod scanner {
    use bluer::{
        Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, ErrorKind, Session,
    };
    use chrono::Utc;
    use futures::{pin_mut, StreamExt};
    use tokio::sync::mpsc;
    use tracing::{debug, info, trace, warn};

    use super::{AdvertisementFeed, BluetoothError, BluetoothResult};
    use crate::config::ScannerConfig;
    use crate::types::{AdvertisementRecord, BluetoothAddress, ManufacturerData};

    impl From<bluer::Error> for BluetoothError {
        fn from(err: bluer::Error) -> Self {
            match err.kind {
                ErrorKind::NotFound => Self::AdapterNotFound,
                ErrorKind::NotReady => Self::AdapterPoweredOff,
                _ => Self::Internal {
                    message: err.to_string(),
                },
            }
        }
    }

    /// BlueZ addresses are in display order; pack them big-endian like the
    /// platform integer form.
    impl From<Address> for BluetoothAddress {
        fn from(address: Address) -> Self {
            let [a, b, c, d, e, f] = address.0;
            Self::new(u64::from_be_bytes([0, 0, a, b, c, d, e, f]))
        }
    }

    /// Passive-style LE scanner on a BlueZ adapter.
    pub struct BluetoothScanner;

    impl BluetoothScanner {
        /// Open the adapter, start LE discovery and spawn the scan task.
        ///
        /// # Errors
        ///
        /// Returns an error if the session cannot be opened, the adapter is
        /// missing or off, or discovery cannot be started.
        pub async fn start(config: &ScannerConfig) -> BluetoothResult<AdvertisementFeed> {
            let session = Session::new()
                .await
                .map_err(|e| BluetoothError::SessionInitFailed {
                    message: e.to_string(),
                })?;

            let adapter = match &config.adapter {
                Some(name) => session.adapter(name)?,
                None => session.default_adapter().await?,
            };

            if !adapter.is_powered().await? {
                if !config.power_on {
                    return Err(BluetoothError::AdapterPoweredOff);
                }
                info!(adapter = adapter.name(), "Powering on Bluetooth adapter");
                adapter.set_powered(true).await?;
            }

            adapter
                .set_discovery_filter(DiscoveryFilter {
                    transport: DiscoveryTransport::Le,
                    duplicate_data: true,
                    ..Default::default()
                })
                .await
                .map_err(|e| BluetoothError::DiscoveryFailed {
                    message: e.to_string(),
                })?;

            let (tx, rx) = mpsc::channel(config.channel_capacity);
            info!(adapter = adapter.name(), "Starting BLE advertisement scan");

            let producer = tokio::spawn(async move {
                // The session must outlive discovery.
                let _session = session;
                if let Err(e) = scan(&adapter, &tx).await {
                    warn!(error = %e, "BLE scan ended with error");
                }
                info!(adapter = adapter.name(), "BLE advertisement scan stopped");
            });

            Ok(AdvertisementFeed::spawned(rx, producer))
        }
    }

    async fn scan(adapter: &Adapter, tx: &mpsc::Sender<AdvertisementRecord>) -> bluer::Result<()> {
        let events = adapter.discover_devices_with_changes().await?;
        pin_mut!(events);

        loop {
            let event = tokio::select! {
                event = events.next() => event,
                () = tx.closed() => break,
            };
            let Some(event) = event else { break };

            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match read_advertisement(adapter, address).await {
                Ok(Some(record)) => {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Ok(None) => trace!(%address, "Device out of range, skipping"),
                Err(e) => debug!(%address, error = %e, "Failed to read advertisement"),
            }
        }
        Ok(())
    }

    async fn read_advertisement(
        adapter: &Adapter,
        address: Address,
    ) -> bluer::Result<Option<AdvertisementRecord>> {
        let device = adapter.device(address)?;

        // BlueZ reports no RSSI for cached devices that are not advertising.
        let Some(rssi) = device.rssi().await? else {
            return Ok(None);
        };

        let service_uuids = device
            .uuids()
            .await?
            .unwrap_or_default()
            .into_iter()
            .collect();
        let manufacturer_data = device
            .manufacturer_data()
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|(company_id, data)| ManufacturerData::new(company_id, data))
            .collect();

        Ok(Some(AdvertisementRecord {
            address: address.into(),
            timestamp: Utc::now(),
            rssi,
            service_uuids,
            manufacturer_data,
            local_name: device.name().await?,
        }))
    }

}

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use mock::{mock_advertisements, MockScanner};

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
mod mock {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::mpsc;
    use tracing::info;

    use super::AdvertisementFeed;
    use crate::classifier::{APPLE_COMPANY_ID, EDDYSTONE_SERVICE_UUID, IBEACON_PREFIX};
    use crate::config::ScannerConfig;
    use crate::types::{AdvertisementRecord, BluetoothAddress};

    /// Synthetic traffic: two Eddystone beacons, two iBeacons and one
    /// ordinary peripheral that no filter accepts.
    #[must_use]
    pub fn mock_advertisements() -> Vec<AdvertisementRecord> {
        let mut ibeacon = IBEACON_PREFIX.to_vec();
        ibeacon.extend_from_slice(&[
            0xE2, 0xC5, 0x6D, 0xB5, 0xDF, 0xFB, 0x48, 0xD2, 0xB0, 0x60, 0xD0, 0xF5, 0xA7, 0x10,
            0x96, 0xE0, 0x00, 0x01, 0x00, 0x02, 0xC5,
        ]);

        vec![
            AdvertisementRecord::new(BluetoothAddress::new(0x0000_C0FF_EE00_0001), -52)
                .with_service_uuid(EDDYSTONE_SERVICE_UUID)
                .with_local_name("eddystone-lobby"),
            AdvertisementRecord::new(BluetoothAddress::new(0x0000_C0FF_EE00_0002), -67)
                .with_service_uuid(EDDYSTONE_SERVICE_UUID),
            AdvertisementRecord::new(BluetoothAddress::new(0x0000_A991_E000_0003), -71)
                .with_manufacturer_data(APPLE_COMPANY_ID, ibeacon.clone()),
            AdvertisementRecord::new(BluetoothAddress::new(0x0000_A991_E000_0004), -80)
                .with_manufacturer_data(APPLE_COMPANY_ID, ibeacon),
            AdvertisementRecord::new(BluetoothAddress::new(0x0000_5EB5_0B00_0005), -45)
                .with_manufacturer_data(0x0059, vec![0x01, 0x02, 0x03])
                .with_local_name("thermometer"),
        ]
    }

    /// Emits [`mock_advertisements`] round-robin, one per tick, with a
    /// drifting RSSI.
    pub struct MockScanner;

    impl MockScanner {
        /// Spawn the mock producer.
        #[must_use]
        pub fn start(config: &ScannerConfig) -> AdvertisementFeed {
            let (tx, rx) = mpsc::channel(config.channel_capacity);
            let period = Duration::from_millis(config.mock_interval_ms);
            info!(period_ms = config.mock_interval_ms, "Starting mock advertisement scan");

            let producer = tokio::spawn(async move {
                let devices = mock_advertisements();
                let mut ticker = tokio::time::interval(period);
                for (tick, template) in devices.iter().cycle().enumerate() {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        () = tx.closed() => break,
                    }
                    let drift = i16::try_from(tick % 7).unwrap_or_default();
                    let mut record = template.clone().with_timestamp(Utc::now());
                    record.rssi -= drift;
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                info!("Mock advertisement scan stopped");
            });

            AdvertisementFeed::spawned(rx, producer)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BluetoothAddress;

    #[tokio::test]
    async fn test_channel_feed_delivers_records() {
        let (tx, feed) = AdvertisementFeed::channel(4);
        let (mut rx, producer) = feed.into_parts();
        assert!(producer.is_none());

        tx.send(AdvertisementRecord::new(BluetoothAddress::new(1), -60))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().rssi, -60);
    }

    #[test]
    fn test_error_messages() {
        assert!(BluetoothError::AdapterPoweredOff
            .to_string()
            .contains("powered off"));
        let err = BluetoothError::DiscoveryFailed {
            message: "busy".into(),
        };
        assert!(err.to_string().contains("busy"));
    }
}
