//! Services command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gattscope_core::BleHost;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_catalog_csv, format_catalog_json, format_catalog_text};
use crate::util::write_output;

pub async fn cmd_services(
    host: Arc<dyn BleHost>,
    address: &str,
    timeout: Duration,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    let (controller, session) = super::connect(host, address, timeout, quiet).await?;
    let catalog = session.catalog().await?;
    controller.close_session(address).await?;

    let content = match format {
        OutputFormat::Text => format_catalog_text(address, &catalog, opts),
        OutputFormat::Json => format_catalog_json(address, &catalog, opts)?,
        OutputFormat::Csv => format_catalog_csv(&catalog)?,
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattscope_core::{MockHost, MockPeripheral, uuids};

    #[tokio::test]
    async fn test_services_lists_catalog_and_disconnects() {
        let host = Arc::new(MockHost::new());
        host.add_peripheral(
            "AA:BB:CC:DD:EE:FF",
            MockPeripheral::new().service(uuids::BATTERY_SERVICE, [(uuids::BATTERY_LEVEL, 3, 0x12)]),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("services.txt");

        cmd_services(
            host.clone(),
            "AA:BB:CC:DD:EE:FF",
            Duration::from_secs(5),
            OutputFormat::Text,
            Some(&out),
            true,
            &FormatOptions::new(true, false),
        )
        .await
        .unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("Battery Service"));
        assert!(text.contains("0x0003"));
        assert!(!host.link("AA:BB:CC:DD:EE:FF").await.unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_services_unknown_device() {
        let err = cmd_services(
            Arc::new(MockHost::new()),
            "00:00:00:00:00:01",
            Duration::from_secs(1),
            OutputFormat::Text,
            None,
            true,
            &FormatOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to connect to 00:00:00:00:00:01"));
    }
}
