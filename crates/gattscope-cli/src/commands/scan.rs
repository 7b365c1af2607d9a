//! Scan command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use gattscope_core::{BleEvent, BleHost, ScanOptions, SessionController};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_scan_csv, format_scan_json, format_scan_text};
use crate::style;
use crate::util::write_output;

/// Arguments for the scan command.
pub struct ScanArgs<'a> {
    pub options: ScanOptions,
    pub csv_file: Option<PathBuf>,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

pub async fn cmd_scan(host: Arc<dyn BleHost>, args: ScanArgs<'_>) -> Result<()> {
    let ScanArgs {
        options,
        csv_file,
        format,
        output,
        quiet,
        opts,
    } = args;

    let spinner = if !quiet && matches!(format, OutputFormat::Text) {
        Some(style::scanning_spinner(options.duration))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let progress = spinner.clone();
    let controller = SessionController::new(host);
    let result = controller
        .scan_until(&options, cancel, move |event| {
            if let (Some(sp), BleEvent::DeviceDiscovered { sequence, record }) = (&progress, event)
            {
                sp.set_message(format!(
                    "Scanning... {} device(s), latest {}",
                    sequence, record.address
                ));
            }
        })
        .await;
    interrupt.abort();

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let registry = result.context("Scan failed")?;

    if let Some(path) = csv_file {
        let rows = controller
            .export_csv(&path)
            .await
            .with_context(|| format!("Failed to export {}", path.display()))?;
        info!("Exported {} AD structure(s) to {}", rows, path.display());
    }

    let content = match format {
        OutputFormat::Text => format_scan_text(&registry, opts),
        OutputFormat::Json => format_scan_json(&registry, opts)?,
        OutputFormat::Csv => format_scan_csv(&registry)?,
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattscope_core::{AddressType, MockHost, Observation};
    use gattscope_types::advertisement::{AdStructure, COMPLETE_LOCAL_NAME};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_scan_writes_csv_export() {
        let host = MockHost::new();
        host.push_batch(vec![
            Observation::new("AA:BB:CC:DD:EE:FF", AddressType::Public, -60)
                .with_structure(AdStructure::new(COMPLETE_LOCAL_NAME, "Sensor")),
        ])
        .await;

        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("ble_devices.csv");
        let out = dir.path().join("scan.json");
        let opts = FormatOptions::new(true, true);
        cmd_scan(
            Arc::new(host),
            ScanArgs {
                options: ScanOptions::new().duration(Duration::from_millis(300)),
                csv_file: Some(csv.clone()),
                format: OutputFormat::Json,
                output: Some(&out),
                quiet: true,
                opts: &opts,
            },
        )
        .await
        .unwrap();

        let exported = std::fs::read_to_string(&csv).unwrap();
        assert_eq!(exported.lines().count(), 2);
        assert!(exported.contains("Sensor"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_scan_rejects_invalid_options() {
        let opts = FormatOptions::default();
        let err = cmd_scan(
            Arc::new(MockHost::new()),
            ScanArgs {
                options: ScanOptions::new().duration(Duration::ZERO),
                csv_file: None,
                format: OutputFormat::Text,
                output: None,
                quiet: true,
                opts: &opts,
            },
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Scan failed"));
    }
}
