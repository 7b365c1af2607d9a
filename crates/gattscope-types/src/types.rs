//! Discovery data model: observations, advertisement records and the
//! first-write-wins device registry.

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::advertisement::{AdStructure, complete_local_name};
use crate::error::ParseError;

/// Link-layer address type of an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AddressType {
    /// IEEE-assigned public address.
    #[default]
    Public,
    /// Random (static or private) address.
    Random,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::Public => write!(f, "public"),
            AddressType::Random => write!(f, "random"),
        }
    }
}

impl FromStr for AddressType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(AddressType::Public),
            "random" => Ok(AddressType::Random),
            other => Err(ParseError::InvalidAddressType(other.to_string())),
        }
    }
}

/// Normalize a device address for use as an identity key.
///
/// ```
/// use gattscope_types::normalize_address;
///
/// assert_eq!(normalize_address(" aa:bb:cc:dd:ee:ff "), "AA:BB:CC:DD:EE:FF");
/// ```
#[must_use]
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

/// A single sighting of an advertiser returned by one scan poll.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// Device address as reported by the stack.
    pub address: String,
    /// Address type.
    pub address_type: AddressType,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// AD structures in wire order.
    pub ad_structures: Vec<AdStructure>,
}

impl Observation {
    /// Create an observation with no AD structures.
    pub fn new(address: impl Into<String>, address_type: AddressType, rssi: i16) -> Self {
        Self {
            address: address.into(),
            address_type,
            rssi,
            ad_structures: Vec::new(),
        }
    }

    /// Append an AD structure.
    #[must_use]
    pub fn with_structure(mut self, structure: AdStructure) -> Self {
        self.ad_structures.push(structure);
        self
    }
}

/// The stored record for one discovered device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdvertisementRecord {
    /// Normalized address; the registry key.
    pub address: String,
    /// Address type.
    pub address_type: AddressType,
    /// RSSI at first sighting, in dBm.
    pub rssi: i16,
    /// Value of the first "Complete Local Name" structure, if any.
    pub local_name: Option<String>,
    /// AD structures in wire order.
    pub ad_structures: Vec<AdStructure>,
}

impl From<Observation> for AdvertisementRecord {
    fn from(observation: Observation) -> Self {
        let local_name = complete_local_name(&observation.ad_structures).map(str::to_string);
        Self {
            address: normalize_address(&observation.address),
            address_type: observation.address_type,
            rssi: observation.rssi,
            local_name,
            ad_structures: observation.ad_structures,
        }
    }
}

/// Ordered, first-write-wins map from address to [`AdvertisementRecord`].
///
/// Iteration order is insertion (discovery) order. Stored records are never
/// handed out mutably: once an address is present, later sightings cannot
/// change it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    records: Vec<AdvertisementRecord>,
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless its address is already present.
    ///
    /// Returns the 1-based discovery sequence number of the new entry, or
    /// `None` when the address was already known (the record is dropped).
    pub fn insert_first(&mut self, record: AdvertisementRecord) -> Option<usize> {
        if self.index.contains_key(&record.address) {
            return None;
        }
        self.index.insert(record.address.clone(), self.records.len());
        self.records.push(record);
        Some(self.records.len())
    }

    /// Look up a record by address (any case).
    pub fn get(&self, address: &str) -> Option<&AdvertisementRecord> {
        self.index
            .get(&normalize_address(address))
            .map(|&i| &self.records[i])
    }

    /// Whether the address is present (any case).
    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(&normalize_address(address))
    }

    /// Number of distinct devices.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no device has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in discovery order.
    pub fn records(&self) -> &[AdvertisementRecord] {
        &self.records
    }

    /// Iterate over records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &AdvertisementRecord> {
        self.records.iter()
    }

    /// Total number of AD structures across all records.
    pub fn ad_structure_count(&self) -> usize {
        self.records.iter().map(|r| r.ad_structures.len()).sum()
    }

    /// Consume the registry, returning records in discovery order.
    pub fn into_records(self) -> Vec<AdvertisementRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a DeviceRegistry {
    type Item = &'a AdvertisementRecord;
    type IntoIter = std::slice::Iter<'a, AdvertisementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::{COMPLETE_LOCAL_NAME, FLAGS};

    fn observation(address: &str, rssi: i16, name: Option<&str>) -> Observation {
        let mut obs = Observation::new(address, AddressType::Random, rssi)
            .with_structure(AdStructure::new(FLAGS, "06"));
        if let Some(name) = name {
            obs = obs.with_structure(AdStructure::new(COMPLETE_LOCAL_NAME, name));
        }
        obs
    }

    #[test]
    fn test_record_from_observation() {
        let record = AdvertisementRecord::from(observation("aa:bb:cc:dd:ee:ff", -60, Some("Lamp")));
        assert_eq!(record.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(record.local_name.as_deref(), Some("Lamp"));
        assert_eq!(record.ad_structures.len(), 2);

        let nameless = AdvertisementRecord::from(observation("11:22:33:44:55:66", -70, None));
        assert_eq!(nameless.local_name, None);
    }

    #[test]
    fn test_first_write_wins() {
        let mut registry = DeviceRegistry::new();
        let first = AdvertisementRecord::from(observation("AA:BB:CC:DD:EE:FF", -40, Some("A")));
        let later = AdvertisementRecord::from(observation("aa:bb:cc:dd:ee:ff", -90, Some("B")));

        assert_eq!(registry.insert_first(first.clone()), Some(1));
        assert_eq!(registry.insert_first(later), None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("aa:bb:cc:dd:ee:ff"), Some(&first));
    }

    #[test]
    fn test_insertion_order_and_counts() {
        let mut registry = DeviceRegistry::new();
        for (i, addr) in ["01", "02", "03"].iter().enumerate() {
            let seq = registry.insert_first(AdvertisementRecord::from(observation(addr, -50, None)));
            assert_eq!(seq, Some(i + 1));
        }
        let order: Vec<_> = registry.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(order, ["01", "02", "03"]);
        assert_eq!(registry.ad_structure_count(), 3);
        assert!(registry.contains("02"));
        assert!(!registry.contains("04"));
    }

    #[test]
    fn test_address_type_parse_and_display() {
        assert_eq!("Public".parse::<AddressType>().unwrap(), AddressType::Public);
        assert_eq!("random".parse::<AddressType>().unwrap(), AddressType::Random);
        assert!("static".parse::<AddressType>().is_err());
        assert_eq!(AddressType::Random.to_string(), "random");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_serializes() {
        let record = AdvertisementRecord::from(observation("AA:BB:CC:DD:EE:FF", -40, Some("A")));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"address_type\":\"random\""));
        assert!(json.contains("\"local_name\":\"A\""));
    }
}
