//! Watch command implementation.
//!
//! Subscribes to one characteristic and prints each notification as it
//! arrives, until the duration elapses, the count is reached, the link drops,
//! or Ctrl-C is pressed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gattscope_core::{BleHost, CharacteristicHandle, Notification, SessionState};
use owo_colors::OwoColorize;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_notification};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub address: String,
    pub handle: CharacteristicHandle,
    pub duration: Option<Duration>,
    pub count: u32,
    pub timeout: Duration,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

pub async fn cmd_watch(host: Arc<dyn BleHost>, args: WatchArgs<'_>) -> Result<()> {
    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match args.output {
        Some(path) => Box::new(
            File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    watch_into(host, args, &mut sink).await
}

async fn watch_into<W>(host: Arc<dyn BleHost>, args: WatchArgs<'_>, sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let WatchArgs {
        address,
        handle,
        duration,
        count,
        timeout,
        format,
        output: _,
        quiet,
        opts,
    } = args;

    let (controller, session) = super::connect(host, &address, timeout, quiet).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    session
        .set_notification_handler(move |notification| {
            let _ = tx.send(notification);
        })
        .await;
    if let Err(e) = session.subscribe(handle).await {
        controller.close_session(&address).await?;
        return Err(e).with_context(|| format!("Failed to subscribe to {}", handle));
    }

    if !quiet {
        let target = if opts.no_color {
            format!("{} on {}", handle, address)
        } else {
            format!("{} on {}", handle.green(), address.cyan())
        };
        eprintln!("Watching {} | Press Ctrl+C to stop", target);
    }

    let json = matches!(format, OutputFormat::Json);
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let mut states = session.state_changes();
    let mut received: u32 = 0;

    loop {
        if count > 0 && received >= count {
            break;
        }
        let next = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, rx.recv()).await.ok(),
                None => Some(rx.recv().await),
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !quiet {
                    eprintln!("\nShutting down...");
                }
                break;
            }
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() != SessionState::Ready {
                    eprintln!("Connection lost.");
                    break;
                }
            }
            item = next => match item {
                Some(Some(notification)) => {
                    let line = format_notification(&notification, json, opts)?;
                    sink.write_all(line.as_bytes()).await?;
                    sink.flush().await?;
                    received += 1;
                }
                // Deadline reached, or the handler was dropped.
                _ => break,
            },
        }
    }

    if session.state() == SessionState::Ready {
        let _ = session.unsubscribe(handle).await;
    }
    controller.close_session(&address).await?;
    if !quiet {
        eprintln!("Received {} notification(s).", received);
    }
    Ok(())
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
            MockPeripheral::new().service(
                uuids::HEART_RATE_SERVICE,
                [(uuids::HEART_RATE_MEASUREMENT, 0x000e, 0x10)],
            ),
        );
        Arc::new(host)
    }

    fn args(opts: &FormatOptions, duration: Option<Duration>, count: u32) -> WatchArgs<'_> {
        WatchArgs {
            address: ADDR.to_string(),
            handle: CharacteristicHandle(0x000e),
            duration,
            count,
            timeout: Duration::from_secs(5),
            format: OutputFormat::Json,
            output: None,
            quiet: true,
            opts,
        }
    }

    #[tokio::test]
    async fn test_watch_stops_after_count() {
        let host = host();
        let opts = FormatOptions::new(true, true);
        let mut out: Vec<u8> = Vec::new();

        let feeder = {
            let host = host.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(link) = host.link(ADDR).await {
                        if !link.subscribed().await.is_empty() {
                            link.notify(CharacteristicHandle(0x000e), vec![0x00, 0x48]).await;
                            link.notify(CharacteristicHandle(0x000e), vec![0x00, 0x49]).await;
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        watch_into(host.clone(), args(&opts, Some(Duration::from_secs(5)), 2), &mut out)
            .await
            .unwrap();
        feeder.await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"hex\":\"0048\""));
        assert!(lines[1].contains("\"hex\":\"0049\""));
        assert!(!host.link(ADDR).await.unwrap().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ends_at_deadline() {
        let host = host();
        let opts = FormatOptions::default();
        let mut out: Vec<u8> = Vec::new();

        watch_into(host.clone(), args(&opts, Some(Duration::from_secs(2)), 0), &mut out)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(!host.link(ADDR).await.unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_watch_ends_when_link_drops() {
        let host = host();
        let opts = FormatOptions::default();
        let mut out: Vec<u8> = Vec::new();

        let dropper = {
            let host = host.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(link) = host.link(ADDR).await {
                        if !link.subscribed().await.is_empty() {
                            link.notify(CharacteristicHandle(0x000e), vec![0x00, 0x50]).await;
                            link.sever().await;
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        // No duration and no count: only the link drop ends the watch.
        tokio::time::timeout(
            Duration::from_secs(5),
            watch_into(host.clone(), args(&opts, None, 0), &mut out),
        )
        .await
        .expect("watch should end when the link drops")
        .unwrap();
        dropper.await.unwrap();
        assert!(!host.link(ADDR).await.unwrap().is_connected());
    }
}
