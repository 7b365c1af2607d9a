//! Flattened CSV export of a discovery registry.
//!
//! Each record expands into one row per AD structure, in registry order and
//! then wire order. A record with no AD structures produces no rows.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use gattscope_types::{AddressType, DeviceRegistry};

use crate::error::Result;

/// CSV header row.
pub const CSV_HEADERS: [&str; 6] = [
    "Device Address",
    "Address Type",
    "RSSI",
    "Device Name",
    "Description",
    "Value",
];

/// One AD structure of one record, with the record's identifying fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    /// Peripheral address.
    pub address: String,
    /// Public or random.
    pub address_type: AddressType,
    /// RSSI of the first sighting, in dBm.
    pub rssi: i16,
    /// Complete local name, empty in the CSV when absent.
    pub device_name: Option<String>,
    /// Human-readable AD type.
    pub description: String,
    /// Rendered AD value.
    pub value: String,
}

impl ExportRow {
    fn to_record(&self) -> [String; 6] {
        [
            self.address.clone(),
            self.address_type.to_string(),
            self.rssi.to_string(),
            self.device_name.clone().unwrap_or_default(),
            self.description.clone(),
            self.value.clone(),
        ]
    }
}

/// Flatten a registry into export rows.
pub fn rows(registry: &DeviceRegistry) -> Vec<ExportRow> {
    registry
        .iter()
        .flat_map(|record| {
            record.ad_structures.iter().map(move |ad| ExportRow {
                address: record.address.clone(),
                address_type: record.address_type,
                rssi: record.rssi,
                device_name: record.local_name.clone(),
                description: ad.description.clone(),
                value: ad.value.clone(),
            })
        })
        .collect()
}

/// Write the registry as CSV to `writer`.
///
/// Returns the number of data rows written, excluding the header.
pub fn write_csv<W: Write>(registry: &DeviceRegistry, writer: W) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADERS)?;
    let rows = rows(registry);
    for row in &rows {
        csv.write_record(row.to_record())?;
    }
    csv.flush()?;
    Ok(rows.len())
}

/// Write the registry as CSV to the file at `path`, replacing it.
pub fn export_csv(registry: &DeviceRegistry, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let file = BufWriter::new(File::create(path)?);
    let count = write_csv(registry, file)?;
    info!("Data saved to {} ({} rows)", path.display(), count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattscope_types::advertisement::{AdStructure, COMPLETE_LOCAL_NAME, FLAGS};
    use gattscope_types::{AdvertisementRecord, Observation};

    fn registry() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.insert_first(AdvertisementRecord::from(
            Observation::new("aa:00:00:00:00:01", AddressType::Public, -48)
                .with_structure(AdStructure::new(FLAGS, "06"))
                .with_structure(AdStructure::new(COMPLETE_LOCAL_NAME, "Thermo, Kitchen")),
        ));
        registry.insert_first(AdvertisementRecord::from(Observation::new(
            "aa:00:00:00:00:02",
            AddressType::Random,
            -90,
        )));
        registry
    }

    #[test]
    fn test_rows_flatten_in_order() {
        let rows = rows(&registry());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "Flags");
        assert_eq!(rows[1].description, "Complete Local Name");
        assert!(rows.iter().all(|r| r.address == "AA:00:00:00:00:01"));
        assert_eq!(rows[0].device_name.as_deref(), Some("Thermo, Kitchen"));
    }

    #[test]
    fn test_row_serializes() {
        let rows = rows(&registry());
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["address"], "AA:00:00:00:00:01");
        assert_eq!(json["address_type"], "public");
        assert_eq!(json["rssi"], -48);
        assert_eq!(json["value"], "06");
    }

    #[test]
    fn test_write_csv() {
        let mut out = Vec::new();
        let count = write_csv(&registry(), &mut out).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Device Address,Address Type,RSSI,Device Name,Description,Value"
        );
        assert_eq!(
            lines[1],
            "AA:00:00:00:00:01,public,-48,\"Thermo, Kitchen\",Flags,06"
        );
    }

    #[test]
    fn test_empty_registry_writes_header_only() {
        let mut out = Vec::new();
        assert_eq!(write_csv(&DeviceRegistry::new(), &mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.csv");
        assert_eq!(export_csv(&registry(), &path).unwrap(), 2);
        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.records().count(), 2);
    }
}
