//! Read command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gattscope_core::{BleHost, CharacteristicHandle, RetryConfig};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_value_csv, format_value_json, format_value_text};
use crate::util::write_output;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_read(
    host: Arc<dyn BleHost>,
    address: &str,
    handle: CharacteristicHandle,
    timeout: Duration,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    let (controller, _session) = super::connect(host, address, timeout, quiet).await?;
    let result = controller
        .read_with_retry(address, handle, &RetryConfig::default())
        .await;
    controller.close_session(address).await?;
    let value = result.with_context(|| format!("Failed to read {}", handle))?;

    let content = match format {
        OutputFormat::Text => format_value_text(handle, &value),
        OutputFormat::Json => format_value_json(handle, &value, opts)?,
        OutputFormat::Csv => format_value_csv(handle, &value)?,
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattscope_core::{MockHost, MockPeripheral, uuids};

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn host() -> Arc<MockHost> {
        let host = MockHost::new();
        host.add_peripheral(
            ADDR,
            MockPeripheral::new()
                .service(
                    uuids::DEVICE_INFO_SERVICE,
                    [(uuids::MODEL_NUMBER, 1, 0x02), (uuids::HEART_RATE_MEASUREMENT, 2, 0x10)],
                )
                .value(1, b"M1".to_vec()),
        );
        Arc::new(host)
    }

    #[tokio::test]
    async fn test_read_prints_hex() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("value.txt");
        cmd_read(
            host(),
            ADDR,
            CharacteristicHandle(1),
            Duration::from_secs(5),
            OutputFormat::Text,
            Some(&out),
            true,
            &FormatOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "0x0001: 4d31 \"M1\"\n"
        );
    }

    #[tokio::test]
    async fn test_read_not_readable_fails() {
        let host = host();
        let err = cmd_read(
            host.clone(),
            ADDR,
            CharacteristicHandle(2),
            Duration::from_secs(5),
            OutputFormat::Text,
            None,
            true,
            &FormatOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read 0x0002"));
        let link = host.link(ADDR).await.unwrap();
        assert_eq!(link.read_count(), 0);
        assert!(!link.is_connected());
    }
}
