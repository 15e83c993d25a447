//! In-memory store of the latest observation per device.
//!
//! The store is written from the advertisement path and drained by the
//! upload cycle. Both sides hold the lock only for a map operation, never
//! across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{BluetoothAddress, Observation};

/// Address-keyed map holding at most one pending observation per device.
#[derive(Debug, Default)]
pub struct ObservationStore {
    entries: Mutex<HashMap<BluetoothAddress, Observation>>,
}

impl ObservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the observation for its address.
    ///
    /// Returns the observation it replaced, if any.
    pub fn upsert(&self, observation: Observation) -> Option<Observation> {
        self.lock().insert(observation.address, observation)
    }

    /// Remove and return every pending observation.
    ///
    /// Read and clear happen under one lock, so an upsert racing with the
    /// drain lands either in this batch or in the next one.
    #[must_use]
    pub fn drain_all(&self) -> Vec<Observation> {
        std::mem::take(&mut *self.lock()).into_values().collect()
    }

    /// Copy of the pending observations, leaving the store untouched.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Observation> {
        self.lock().values().cloned().collect()
    }

    /// Pending observation for one address.
    #[must_use]
    pub fn get(&self, address: BluetoothAddress) -> Option<Observation> {
        self.lock().get(&address).cloned()
    }

    /// Number of pending observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written HashMap entry.
    fn lock(&self) -> MutexGuard<'_, HashMap<BluetoothAddress, Observation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
