//! Service and characteristic enumeration.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use gattscope_types::GattCatalog;
use gattscope_types::uuid::name_for;

use crate::error::{Error, Result};
use crate::traits::HostLink;

/// Enumerate the link's services into a [`GattCatalog`].
///
/// The stack's enumeration order is preserved. Any failure, including the
/// time limit expiring or a malformed enumeration, yields
/// [`Error::Discovery`]; a partial catalog is never returned.
pub async fn discover_catalog(link: &dyn HostLink, limit: Duration) -> Result<GattCatalog> {
    info!("Discovering services...");
    let raw = timeout(limit, link.services())
        .await
        .map_err(|_| Error::Discovery(format!("enumeration timed out after {:?}", limit)))?
        .map_err(|e| Error::Discovery(e.to_string()))?;
    let catalog = GattCatalog::from_raw(raw).map_err(|e| Error::Discovery(e.to_string()))?;

    info!(
        "Found {} services, {} characteristics",
        catalog.services().len(),
        catalog.characteristic_count()
    );
    for service in catalog.services() {
        debug!("  Service: {} ({})", service.uuid, describe(&service.uuid));
        for characteristic in &service.characteristics {
            debug!(
                "    {} {} [{}] ({})",
                characteristic.handle,
                characteristic.uuid,
                characteristic.properties,
                describe(&characteristic.uuid)
            );
        }
    }
    Ok(catalog)
}

/// Human-readable name for a UUID, or "Unknown".
pub fn describe(uuid: &Uuid) -> &'static str {
    name_for(uuid).unwrap_or("Unknown")
}
