//! # beacon-core
//!
//! Core pipeline for the beacon-relay BLE beacon uploader.
//!
//! This crate provides:
//! - Classification of BLE advertisements as Eddystone or iBeacon
//! - An in-memory store keeping the latest observation per device
//! - A periodic upload cycle delivering observations to an HTTP sink
//! - Configuration management for the scanner, sink and status server
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Addresses, advertisement records and observations
//! - [`classifier`] - Ordered Eddystone/iBeacon filters
//! - [`store`] - Address-keyed store of pending observations
//! - [`upload`] - Observation sinks (phant GET and JSON POST)
//! - [`cycle`] - Interval-driven drain-and-send loop
//! - [`bluetooth`] - Advertisement sources (BlueZ scanner and mock)
//! - [`listener`] - Owned ingest and upload tasks with explicit shutdown
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod classifier;
pub mod config;
pub mod cycle;
pub mod error;
pub mod listener;
pub mod store;
pub mod types;
pub mod upload;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluetoothScanner;
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use bluetooth::{mock_advertisements, MockScanner};
pub use bluetooth::{AdvertisementFeed, BluetoothError, BluetoothResult};
pub use classifier::{classify, BeaconFilter};
pub use config::{
    is_valid_mac_address, is_valid_phant_key, Config, ConfigError, ConfigResult, ScannerConfig,
    ServerConfig, SinkConfig, UploadConfig,
};
pub use cycle::{CycleReport, UploadCounters, UploadCycle, UploadTotals};
pub use error::{RelayError, Result};
pub use listener::{BeaconListener, ListenerHandle, ListenerStats};
pub use store::ObservationStore;
pub use types::{
    AdvertisementRecord, BeaconType, BluetoothAddress, ManufacturerData, Observation,
    ParseAddressError,
};
pub use upload::{HttpSink, ObservationSink, UploadError, UploadResult};

/// Alias for [`RelayError`].
pub type Error = RelayError;
