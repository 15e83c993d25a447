//! Beacon packet classification.
//!
//! Each [`BeaconFilter`] recognises one beacon protocol by byte patterns in
//! the advertisement. [`classify`] runs the filters in [`BeaconFilter::ORDER`]
//! and returns the label of the first one that matches.

use uuid::{uuid, Uuid};

use crate::types::{AdvertisementRecord, BeaconType};

/// Service UUID advertised by Eddystone beacons (16-bit `0xFEAA` on the SIG base).
pub const EDDYSTONE_SERVICE_UUID: Uuid = uuid!("0000feaa-0000-1000-8000-00805f9b34fb");

/// Bluetooth SIG company identifier for Apple.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// iBeacon type and length bytes at the start of the Apple payload.
pub const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];

/// A single beacon protocol filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconFilter {
    /// Matches the Eddystone service UUID.
    Eddystone,
    /// Matches Apple manufacturer data carrying the iBeacon prefix.
    IBeacon,
}

impl BeaconFilter {
    /// Evaluation order. The first matching filter wins.
    pub const ORDER: [Self; 2] = [Self::Eddystone, Self::IBeacon];

    /// Returns `true` if the advertisement is accepted by this filter.
    #[must_use]
    pub fn matches(self, record: &AdvertisementRecord) -> bool {
        match self {
            Self::Eddystone => record.service_uuids.contains(&EDDYSTONE_SERVICE_UUID),
            Self::IBeacon => record.manufacturer_data.iter().any(|entry| {
                entry.company_id == APPLE_COMPANY_ID && entry.data.starts_with(&IBEACON_PREFIX)
            }),
        }
    }

    /// Label attached to observations accepted by this filter.
    #[must_use]
    pub const fn beacon_type(self) -> BeaconType {
        match self {
            Self::Eddystone => BeaconType::Eddystone,
            Self::IBeacon => BeaconType::IBeacon,
        }
    }
}

/// Classify an advertisement, returning `None` if no filter accepts it.
#[must_use]
pub fn classify(record: &AdvertisementRecord) -> Option<BeaconType> {
    BeaconFilter::ORDER
        .into_iter()
        .find(|filter| filter.matches(record))
        .map(BeaconFilter::beacon_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BluetoothAddress;

    fn record() -> AdvertisementRecord {
        AdvertisementRecord::new(BluetoothAddress::new(0x0123_4567_89AB), -60)
    }

    fn ibeacon_payload() -> Vec<u8> {
        let mut payload = vec![0x02, 0x15];
        payload.extend_from_slice(&[0u8; 21]);
        payload
    }

    #[test]
    fn test_eddystone_uuid_matches() {
        let rec = record().with_service_uuid(EDDYSTONE_SERVICE_UUID);
        assert_eq!(classify(&rec), Some(BeaconType::Eddystone));
    }

    #[test]
    fn test_eddystone_wins_over_ibeacon() {
        let rec = record()
            .with_service_uuid(EDDYSTONE_SERVICE_UUID)
            .with_manufacturer_data(APPLE_COMPANY_ID, ibeacon_payload());
        assert_eq!(classify(&rec), Some(BeaconType::Eddystone));
    }

    #[test]
    fn test_eddystone_among_other_services() {
        let other = uuid!("0000180f-0000-1000-8000-00805f9b34fb");
        let rec = record()
            .with_service_uuid(other)
            .with_service_uuid(EDDYSTONE_SERVICE_UUID)
            .with_manufacturer_data(0x0059, vec![0xFF]);
        assert_eq!(classify(&rec), Some(BeaconType::Eddystone));
    }

    #[test]
    fn test_ibeacon_matches() {
        let rec = record().with_manufacturer_data(APPLE_COMPANY_ID, ibeacon_payload());
        assert_eq!(classify(&rec), Some(BeaconType::IBeacon));
    }

    #[test]
    fn test_ibeacon_exact_prefix_only() {
        let rec = record().with_manufacturer_data(APPLE_COMPANY_ID, vec![0x02, 0x15]);
        assert_eq!(classify(&rec), Some(BeaconType::IBeacon));
    }

    #[test]
    fn test_ibeacon_second_entry_matches() {
        let rec = record()
            .with_manufacturer_data(0x0006, vec![0x02, 0x15])
            .with_manufacturer_data(APPLE_COMPANY_ID, vec![0x10, 0x05])
            .with_manufacturer_data(APPLE_COMPANY_ID, ibeacon_payload());
        assert_eq!(classify(&rec), Some(BeaconType::IBeacon));
    }

    #[test]
    fn test_short_apple_payload_rejected() {
        let rec = record().with_manufacturer_data(APPLE_COMPANY_ID, vec![0x01]);
        assert_eq!(classify(&rec), None);

        let rec = record().with_manufacturer_data(APPLE_COMPANY_ID, vec![0x02]);
        assert_eq!(classify(&rec), None);

        let rec = record().with_manufacturer_data(APPLE_COMPANY_ID, Vec::new());
        assert_eq!(classify(&rec), None);
    }

    #[test]
    fn test_wrong_company_rejected() {
        let rec = record().with_manufacturer_data(0x004D, ibeacon_payload());
        assert_eq!(classify(&rec), None);
    }

    #[test]
    fn test_apple_non_beacon_rejected() {
        // Apple "Nearby" and other continuity payloads share the company id.
        let rec = record().with_manufacturer_data(APPLE_COMPANY_ID, vec![0x10, 0x05, 0x01]);
        assert_eq!(classify(&rec), None);
    }

    #[test]
    fn test_empty_record_rejected() {
        assert_eq!(classify(&record()), None);
    }

    #[test]
    fn test_filter_order() {
        assert_eq!(BeaconFilter::ORDER[0], BeaconFilter::Eddystone);
        assert_eq!(BeaconFilter::ORDER[1], BeaconFilter::IBeacon);
        assert_eq!(BeaconFilter::IBeacon.beacon_type(), BeaconType::IBeacon);
    }
}
