//! Hardware integration tests for gattscope-core
//!
//! These tests require a Bluetooth adapter and should be run with:
//! ```
//! cargo test --package gattscope-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Session tests need a connectable peripheral in range:
//! - `GATTSCOPE_DEVICE`: peripheral address (or platform identifier on macOS)
//!
//! Example:
//! ```
//! GATTSCOPE_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package gattscope-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use gattscope_core::{BtleplugHost, DiscoveryEngine, GattSession, SessionConfig, SessionState};
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn get_device() -> Option<String> {
    env::var("GATTSCOPE_DEVICE").ok().filter(|s| !s.is_empty())
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_devices() {
    let host = Arc::new(BtleplugHost::new().await.expect("no adapter"));
    let mut engine = DiscoveryEngine::new(host);

    let result = timeout(
        BLE_TIMEOUT,
        engine.start_scan(Duration::from_secs(10), Duration::from_millis(100)),
    )
    .await;

    match result {
        Ok(Ok(registry)) => {
            println!("Scan discovered {} devices:", registry.len());
            for record in &registry {
                println!(
                    "  - {} ({}) {} dBm, {} AD structures",
                    record.local_name.as_deref().unwrap_or("Unknown"),
                    record.address,
                    record.rssi,
                    record.ad_structures.len()
                );
            }
        }
        Ok(Err(e)) => panic!("Scan failed: {}", e),
        Err(_) => panic!("Scan timed out"),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_session_lifecycle() {
    let Some(address) = get_device() else {
        println!("GATTSCOPE_DEVICE not set, skipping");
        return;
    };
    let host = Arc::new(BtleplugHost::new().await.expect("no adapter"));
    let session = GattSession::new(host, SessionConfig::default());

    let catalog = timeout(BLE_TIMEOUT, session.connect(&address))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    assert_eq!(session.state(), SessionState::Ready);
    println!("{} services:", catalog.services().len());
    for service in catalog.services() {
        println!("  {}", service.uuid);
        for characteristic in &service.characteristics {
            println!(
                "    {} {} [{}]",
                characteristic.handle, characteristic.uuid, characteristic.properties
            );
            if characteristic.properties.can_read() {
                match session.read(characteristic.handle).await {
                    Ok(value) => println!("      = {:02x?}", &value[..]),
                    Err(e) => println!("      read failed: {}", e),
                }
            }
        }
    }

    session.disconnect().await.expect("disconnect failed");
    assert_eq!(session.state(), SessionState::Disconnected);
}
