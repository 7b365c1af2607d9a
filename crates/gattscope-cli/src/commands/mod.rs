//! Command implementations for the CLI.

mod read;
mod scan;
mod services;
mod watch;
mod write;

pub use read::cmd_read;
pub use scan::{ScanArgs, cmd_scan};
pub use services::cmd_services;
pub use watch::{WatchArgs, cmd_watch};
pub use write::cmd_write;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gattscope_core::{BleHost, GattSession, SessionConfig, SessionController};

use crate::style;

/// Open a session to `address`, showing a spinner unless `quiet`.
pub(crate) async fn connect(
    host: Arc<dyn BleHost>,
    address: &str,
    timeout: Duration,
    quiet: bool,
) -> Result<(SessionController, Arc<GattSession>)> {
    let controller =
        SessionController::with_config(host, SessionConfig::default().connect_timeout(timeout));
    let spinner = (!quiet).then(|| style::connecting_spinner(address));
    let result = controller.open_session(address).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let session = result.with_context(|| format!("Failed to connect to {}", address))?;
    Ok((controller, session))
}
