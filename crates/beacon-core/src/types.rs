//! Shared data model: device addresses, raw advertisements and observations.
//!
//! [`AdvertisementRecord`] is what a scanner hands to the pipeline.
//! [`Observation`] is what survives classification and gets uploaded.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;
use uuid::Uuid;

/// A 48-bit Bluetooth device address stored in the low bits of a `u64`.
///
/// The textual form lists the low six bytes in little-endian order, so
/// `0x0123_4567_89AB` renders as `AB:89:67:45:23:01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BluetoothAddress(u64);

/// Mask selecting the 48 significant bits of an address.
const ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

impl BluetoothAddress {
    /// Create an address from its raw integer value. Bits above 48 are dropped.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw & ADDRESS_MASK)
    }

    /// The raw integer value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The six address bytes in textual order (little-endian).
    #[must_use]
    pub fn octets(self) -> [u8; 6] {
        let le = self.0.to_le_bytes();
        [le[0], le[1], le[2], le[3], le[4], le[5]]
    }

    /// Build an address from six bytes in textual order.
    #[must_use]
    pub fn from_octets(octets: [u8; 6]) -> Self {
        let mut le = [0u8; 8];
        le[..6].copy_from_slice(&octets);
        Self(u64::from_le_bytes(le))
    }
}

impl From<u64> for BluetoothAddress {
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.octets();
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Error returned when parsing a textual address fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Bluetooth address '{0}', expected format AA:BB:CC:DD:EE:FF")]
pub struct ParseAddressError(pub String);

impl FromStr for BluetoothAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !crate::config::is_valid_mac_address(s) {
            return Err(ParseAddressError(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(s.split(':')) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError(s.to_string()))?;
        }
        Ok(Self::from_octets(octets))
    }
}

impl Serialize for BluetoothAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BluetoothAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Beacon protocol recognised by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BeaconType {
    /// Google Eddystone, identified by its 16-bit service UUID.
    #[serde(rename = "EDDYSTONE")]
    Eddystone,
    /// Apple iBeacon, identified by Apple manufacturer data.
    #[serde(rename = "IBEACON")]
    IBeacon,
}

impl BeaconType {
    /// Wire label used by the upload sinks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eddystone => "EDDYSTONE",
            Self::IBeacon => "IBEACON",
        }
    }
}

impl fmt::Display for BeaconType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manufacturer-specific data entry from an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerData {
    /// Bluetooth SIG company identifier.
    pub company_id: u16,
    /// Opaque payload following the company identifier.
    pub data: Vec<u8>,
}

impl ManufacturerData {
    /// Create a manufacturer data entry.
    #[must_use]
    pub fn new(company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            company_id,
            data: data.into(),
        }
    }
}

/// A raw advertisement as delivered by the platform scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRecord {
    /// Advertising device address.
    pub address: BluetoothAddress,
    /// When the advertisement was received.
    pub timestamp: DateTime<Utc>,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Advertised 128-bit service identifiers.
    pub service_uuids: Vec<Uuid>,
    /// Manufacturer-specific data entries.
    pub manufacturer_data: Vec<ManufacturerData>,
    /// Advertised local name, if any. Diagnostics only.
    pub local_name: Option<String>,
}

impl AdvertisementRecord {
    /// Create an empty record for `address` received now.
    #[must_use]
    pub fn new(address: BluetoothAddress, rssi: i16) -> Self {
        Self {
            address,
            timestamp: Utc::now(),
            rssi,
            service_uuids: Vec::new(),
            manufacturer_data: Vec::new(),
            local_name: None,
        }
    }

    /// Add a service identifier.
    #[must_use]
    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    /// Add a manufacturer data entry.
    #[must_use]
    pub fn with_manufacturer_data(mut self, company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data
            .push(ManufacturerData::new(company_id, data));
        self
    }

    /// Override the receive timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the advertised local name.
    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }
}

/// A classified advertisement, the unit stored and uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AB:89:67:45:23:01",
    "captured_at": "2025-01-15T03:30:00Z",
    "rssi": -61,
    "beacon_type": "IBEACON"
}))]
pub struct Observation {
    /// Device address, `AA:BB:CC:DD:EE:FF`.
    #[schema(value_type = String, example = "AB:89:67:45:23:01")]
    pub address: BluetoothAddress,

    /// When the advertisement was captured (UTC).
    pub captured_at: DateTime<Utc>,

    /// Signal strength in dBm.
    #[schema(example = -61)]
    pub rssi: i16,

    /// Which beacon filter matched.
    pub beacon_type: BeaconType,
}

impl Observation {
    /// Derive an observation from a record the classifier accepted.
    #[must_use]
    pub fn from_record(record: &AdvertisementRecord, beacon_type: BeaconType) -> Self {
        Self {
            address: record.address,
            captured_at: record.timestamp,
            rssi: record.rssi,
            beacon_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_formats_little_endian() {
        let addr = BluetoothAddress::new(0x0123_4567_89AB);
        assert_eq!(addr.to_string(), "AB:89:67:45:23:01");
    }

    #[test]
    fn test_address_ignores_high_bits() {
        let addr = BluetoothAddress::new(0xFFFF_0000_0000_0001);
        assert_eq!(addr.as_u64(), 1);
        assert_eq!(addr.to_string(), "01:00:00:00:00:00");
    }

    #[test]
    fn test_address_parse_matches_display() {
        let addr: BluetoothAddress = "AB:89:67:45:23:01".parse().unwrap();
        assert_eq!(addr.as_u64(), 0x0123_4567_89AB);

        assert!("AB:89:67:45:23".parse::<BluetoothAddress>().is_err());
        assert!("not-an-address".parse::<BluetoothAddress>().is_err());
    }

    #[test]
    fn test_beacon_type_labels() {
        assert_eq!(BeaconType::Eddystone.to_string(), "EDDYSTONE");
        assert_eq!(
            serde_json::to_string(&BeaconType::IBeacon).unwrap(),
            "\"IBEACON\""
        );
    }

    #[test]
    fn test_observation_serializes_address_as_text() {
        let record = AdvertisementRecord::new(BluetoothAddress::new(0x0123_4567_89AB), -70);
        let obs = Observation::from_record(&record, BeaconType::Eddystone);
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["address"], "AB:89:67:45:23:01");
        assert_eq!(json["beacon_type"], "EDDYSTONE");
        assert_eq!(json["rssi"], -70);
    }
}
