//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::{Context, Result};
use gattscope_core::{
    CharacteristicHandle, DeviceRegistry, GattCatalog, Notification, describe, write_csv,
};
use gattscope_types::hex;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::format_description::well_known::Rfc3339;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self { no_color, compact }
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn count(&self, n: usize) -> String {
        if self.no_color {
            n.to_string()
        } else {
            n.to_string().green().bold().to_string()
        }
    }
}

// ============================================================================
// Scan results
// ============================================================================

#[must_use]
pub fn format_scan_text(registry: &DeviceRegistry, opts: &FormatOptions) -> String {
    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "Address")]
        address: String,
        #[tabled(rename = "Type")]
        address_type: String,
        #[tabled(rename = "RSSI")]
        rssi: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "AD")]
        structures: usize,
    }

    if registry.is_empty() {
        return "No devices found.\n".to_string();
    }

    let rows: Vec<DeviceRow> = registry
        .iter()
        .map(|record| DeviceRow {
            address: record.address.clone(),
            address_type: record.address_type.to_string(),
            rssi: format!("{} dBm", record.rssi),
            name: record.local_name.clone().unwrap_or_else(|| "-".to_string()),
            structures: record.ad_structures.len(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!(
        "Found {} device(s)\n\n{}\n",
        opts.count(registry.len()),
        table
    )
}

pub fn format_scan_json(registry: &DeviceRegistry, opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: &'a [gattscope_core::AdvertisementRecord],
    }

    opts.as_json(&ScanResult {
        count: registry.len(),
        devices: registry.records(),
    })
}

/// One row per AD structure, in the same layout as the CSV export file.
pub fn format_scan_csv(registry: &DeviceRegistry) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(registry, &mut buf)?;
    String::from_utf8(buf).context("CSV output was not UTF-8")
}

// ============================================================================
// GATT catalog
// ============================================================================

#[must_use]
pub fn format_catalog_text(address: &str, catalog: &GattCatalog, opts: &FormatOptions) -> String {
    let mut output = format!(
        "{}: {} service(s), {} characteristic(s)\n",
        address,
        opts.count(catalog.services().len()),
        catalog.characteristic_count()
    );
    for service in catalog.services() {
        let uuid = if opts.no_color {
            service.uuid.to_string()
        } else {
            service.uuid.to_string().cyan().to_string()
        };
        output.push_str(&format!("\n{} {}\n", uuid, describe(&service.uuid)));
        for characteristic in &service.characteristics {
            output.push_str(&format!(
                "  {}  {} {} [{}]\n",
                characteristic.handle,
                characteristic.uuid,
                describe(&characteristic.uuid),
                characteristic.properties
            ));
        }
    }
    output
}

pub fn format_catalog_json(
    address: &str,
    catalog: &GattCatalog,
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct CharacteristicJson {
        handle: CharacteristicHandle,
        uuid: String,
        name: &'static str,
        properties: String,
    }

    #[derive(Serialize)]
    struct ServiceJson {
        uuid: String,
        name: &'static str,
        characteristics: Vec<CharacteristicJson>,
    }

    #[derive(Serialize)]
    struct CatalogJson<'a> {
        address: &'a str,
        services: Vec<ServiceJson>,
    }

    let services = catalog
        .services()
        .iter()
        .map(|service| ServiceJson {
            uuid: service.uuid.to_string(),
            name: describe(&service.uuid),
            characteristics: service
                .characteristics
                .iter()
                .map(|c| CharacteristicJson {
                    handle: c.handle,
                    uuid: c.uuid.to_string(),
                    name: describe(&c.uuid),
                    properties: c.properties.to_string(),
                })
                .collect(),
        })
        .collect();

    opts.as_json(&CatalogJson { address, services })
}

pub fn format_catalog_csv(catalog: &GattCatalog) -> Result<String> {
    let mut csv = csv::Writer::from_writer(Vec::new());
    csv.write_record(["service_uuid", "handle", "uuid", "name", "properties"])?;
    for service in catalog.services() {
        for c in &service.characteristics {
            csv.write_record([
                service.uuid.to_string(),
                c.handle.to_string(),
                c.uuid.to_string(),
                describe(&c.uuid).to_string(),
                c.properties.to_string(),
            ])?;
        }
    }
    finish_csv(csv)
}

// ============================================================================
// Values and notifications
// ============================================================================

/// Printable ASCII rendering of `value`, if every byte is printable.
fn as_text(value: &[u8]) -> Option<&str> {
    if value.is_empty() || !value.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return None;
    }
    std::str::from_utf8(value).ok()
}

#[must_use]
pub fn format_value_text(handle: CharacteristicHandle, value: &[u8]) -> String {
    match as_text(value) {
        Some(text) => format!("{}: {} \"{}\"\n", handle, hex::encode(value), text),
        None => format!("{}: {}\n", handle, hex::encode(value)),
    }
}

pub fn format_value_json(
    handle: CharacteristicHandle,
    value: &[u8],
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct ValueJson<'a> {
        handle: CharacteristicHandle,
        hex: String,
        text: Option<&'a str>,
    }

    opts.as_json(&ValueJson {
        handle,
        hex: hex::encode(value),
        text: as_text(value),
    })
}

pub fn format_value_csv(handle: CharacteristicHandle, value: &[u8]) -> Result<String> {
    let mut csv = csv::Writer::from_writer(Vec::new());
    csv.write_record(["handle", "hex"])?;
    csv.write_record([handle.to_string(), hex::encode(value)])?;
    finish_csv(csv)
}

fn finish_csv(csv: csv::Writer<Vec<u8>>) -> Result<String> {
    let buf = csv.into_inner().context("Failed to flush CSV output")?;
    String::from_utf8(buf).context("CSV output was not UTF-8")
}

/// Format one notification as a single line.
pub fn format_notification(
    notification: &Notification,
    json: bool,
    opts: &FormatOptions,
) -> Result<String> {
    let timestamp = notification
        .received_at
        .format(&Rfc3339)
        .context("Failed to format timestamp")?;

    if json {
        #[derive(Serialize)]
        struct NotificationJson<'a> {
            received_at: &'a str,
            handle: CharacteristicHandle,
            hex: String,
        }
        let line = serde_json::to_string(&NotificationJson {
            received_at: &timestamp,
            handle: notification.handle,
            hex: hex::encode(&notification.payload),
        })?;
        return Ok(line + "\n");
    }

    let stamp = if opts.no_color {
        timestamp
    } else {
        timestamp.dimmed().to_string()
    };
    Ok(format!(
        "[{}] {}",
        stamp,
        format_value_text(notification.handle, &notification.payload)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gattscope_core::{AddressType, Observation};
    use gattscope_types::advertisement::{AdStructure, COMPLETE_LOCAL_NAME};
    use gattscope_types::uuid as uuids;
    use gattscope_types::{RawCharacteristic, RawService};
    use time::macros::datetime;

    fn plain() -> FormatOptions {
        FormatOptions::new(true, false)
    }

    fn registry() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.insert_first(
            Observation::new("AA:BB:CC:DD:EE:FF", AddressType::Public, -60)
                .with_structure(AdStructure::new(COMPLETE_LOCAL_NAME, "Thermo, Inc"))
                .into(),
        );
        registry.insert_first(Observation::new("11:22:33:44:55:66", AddressType::Random, -82).into());
        registry
    }

    fn catalog() -> GattCatalog {
        GattCatalog::from_raw(vec![RawService {
            uuid: uuids::BATTERY_SERVICE,
            characteristics: vec![RawCharacteristic {
                uuid: uuids::BATTERY_LEVEL,
                handle: CharacteristicHandle(0x0012),
                properties: 0x12,
            }],
        }])
        .unwrap()
    }

    #[test]
    fn test_scan_text_lists_devices() {
        let text = format_scan_text(&registry(), &plain());
        assert!(text.starts_with("Found 2 device(s)"));
        assert!(text.contains("AA:BB:CC:DD:EE:FF"));
        assert!(text.contains("-82 dBm"));
        assert!(text.contains("Thermo, Inc"));
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(
            format_scan_text(&DeviceRegistry::new(), &plain()),
            "No devices found.\n"
        );
    }

    #[test]
    fn test_scan_json() {
        let json = format_scan_json(&registry(), &FormatOptions::new(true, true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["devices"][0]["address"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(value["devices"][0]["local_name"], "Thermo, Inc");
    }

    #[test]
    fn test_scan_csv_quotes_values() {
        let csv = format_scan_csv(&registry()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"Thermo, Inc\""));
    }

    #[test]
    fn test_catalog_text() {
        let text = format_catalog_text("AA:BB:CC:DD:EE:FF", &catalog(), &plain());
        assert!(text.contains("1 service(s), 1 characteristic(s)"));
        assert!(text.contains("Battery Service"));
        assert!(text.contains("0x0012"));
        assert!(text.contains("Battery Level"));
    }

    #[test]
    fn test_catalog_json() {
        let json = format_catalog_json("AA:BB:CC:DD:EE:FF", &catalog(), &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["services"][0]["name"], "Battery Service");
        assert_eq!(value["services"][0]["characteristics"][0]["handle"], 0x12);
    }

    #[test]
    fn test_catalog_csv() {
        let catalog = catalog();
        let output = format_catalog_csv(&catalog).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(output.lines().nth(1).unwrap().starts_with(&uuids::BATTERY_SERVICE.to_string()));

        // Fields with separators survive a parse.
        let mut reader = csv::Reader::from_reader(output.as_bytes());
        let row = reader.records().next().unwrap().unwrap();
        let characteristic = &catalog.services()[0].characteristics[0];
        assert_eq!(&row[1], characteristic.handle.to_string());
        assert_eq!(&row[3], "Battery Level");
        assert_eq!(&row[4], characteristic.properties.to_string());
    }

    #[test]
    fn test_value_csv() {
        assert_eq!(
            format_value_csv(CharacteristicHandle(3), b"M1").unwrap(),
            "handle,hex\n0x0003,4d31\n"
        );
    }

    #[test]
    fn test_value_text() {
        assert_eq!(
            format_value_text(CharacteristicHandle(3), b"M1"),
            "0x0003: 4d31 \"M1\"\n"
        );
        assert_eq!(
            format_value_text(CharacteristicHandle(3), &[0x00, 0xff]),
            "0x0003: 00ff\n"
        );
        assert_eq!(format_value_text(CharacteristicHandle(3), &[]), "0x0003: \n");
    }

    #[test]
    fn test_value_json() {
        let json = format_value_json(CharacteristicHandle(1), &[0x64], &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["hex"], "64");
        assert_eq!(value["text"], "d");
    }

    #[test]
    fn test_notification_line() {
        let notification = Notification {
            handle: CharacteristicHandle(0x000e),
            payload: Bytes::from_static(&[0x00, 0x48]),
            received_at: datetime!(2026-03-01 12:00:00 UTC),
        };
        assert_eq!(
            format_notification(&notification, false, &plain()).unwrap(),
            "[2026-03-01T12:00:00Z] 0x000e: 0048\n"
        );
        let json = format_notification(&notification, true, &plain()).unwrap();
        assert_eq!(
            json,
            "{\"received_at\":\"2026-03-01T12:00:00Z\",\"handle\":14,\"hex\":\"0048\"}\n"
        );
    }
}
