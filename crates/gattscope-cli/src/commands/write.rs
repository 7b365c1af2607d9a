//! Write command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gattscope_core::{BleHost, CharacteristicHandle};
use gattscope_types::hex;
use tracing::info;

pub async fn cmd_write(
    host: Arc<dyn BleHost>,
    address: &str,
    handle: CharacteristicHandle,
    value: &str,
    timeout: Duration,
    quiet: bool,
) -> Result<()> {
    let bytes = hex::decode(value).with_context(|| format!("Invalid value '{}'", value))?;

    let (controller, session) = super::connect(host, address, timeout, quiet).await?;
    let result = session.write(handle, &bytes).await;
    controller.close_session(address).await?;
    result.with_context(|| format!("Failed to write {}", handle))?;

    info!("Wrote {} byte(s) to {}", bytes.len(), handle);
    if !quiet {
        eprintln!("Wrote {} to {}", hex::encode(&bytes), handle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattscope_core::{MockHost, MockPeripheral, WriteKind, uuids};

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn host() -> Arc<MockHost> {
        let host = MockHost::new();
        host.add_peripheral(
            ADDR,
            MockPeripheral::new().service(
                uuids::HEART_RATE_SERVICE,
                [(uuids::HEART_RATE_MEASUREMENT, 4, 0x08)],
            ),
        );
        Arc::new(host)
    }

    #[tokio::test]
    async fn test_write_sends_decoded_bytes() {
        let host = host();
        cmd_write(
            host.clone(),
            ADDR,
            CharacteristicHandle(4),
            "01:ff",
            Duration::from_secs(5),
            true,
        )
        .await
        .unwrap();
        let link = host.link(ADDR).await.unwrap();
        assert_eq!(
            link.writes().await,
            vec![(CharacteristicHandle(4), vec![0x01, 0xff], WriteKind::WithResponse)]
        );
    }

    #[tokio::test]
    async fn test_write_rejects_bad_hex_before_connecting() {
        let host = host();
        let err = cmd_write(
            host.clone(),
            ADDR,
            CharacteristicHandle(4),
            "0g",
            Duration::from_secs(5),
            true,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid value"));
        assert_eq!(host.connect_count(), 0);
    }
}
