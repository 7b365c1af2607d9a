use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use gattscope_core::{BleHost, BtleplugHost, ScanOptions};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use cli::{Cli, Commands, DeviceArgs};
use commands::{ScanArgs, WatchArgs};
use config::{
    Config, resolve_csv_file, resolve_device, resolve_path, resolve_poll_interval,
    resolve_scan_duration, resolve_timeout,
};
use format::FormatOptions;
use util::require_device;

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "gattscope", &mut io::stdout());
        return Ok(());
    }

    // An explicit --config must parse; the default location is best effort.
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    init_tracing(&cli, &config)?;

    let opts = FormatOptions::new(cli.no_color, cli.compact);
    let output = cli.output.as_ref();
    let quiet = cli.quiet;

    let host: Arc<dyn BleHost> = Arc::new(
        BtleplugHost::new()
            .await
            .context("Failed to open the Bluetooth adapter")?,
    );

    match cli.command {
        Commands::Scan {
            duration,
            poll_interval,
            csv_file,
            no_csv,
            format,
        } => {
            let options = ScanOptions::new()
                .duration(resolve_scan_duration(duration, &config))
                .poll_interval(resolve_poll_interval(poll_interval, &config));
            commands::cmd_scan(
                host,
                ScanArgs {
                    options,
                    csv_file: resolve_csv_file(csv_file, no_csv, &config),
                    format,
                    output,
                    quiet,
                    opts: &opts,
                },
            )
            .await?;
        }
        Commands::Services { device, format } => {
            let (address, timeout) = target(device, &config)?;
            commands::cmd_services(host, &address, timeout, format, output, quiet, &opts).await?;
        }
        Commands::Read {
            device,
            handle,
            format,
        } => {
            let (address, timeout) = target(device, &config)?;
            commands::cmd_read(host, &address, handle, timeout, format, output, quiet, &opts)
                .await?;
        }
        Commands::Write {
            device,
            handle,
            value,
        } => {
            let (address, timeout) = target(device, &config)?;
            commands::cmd_write(host, &address, handle, &value, timeout, quiet).await?;
        }
        Commands::Watch {
            device,
            handle,
            duration,
            count,
            format,
        } => {
            let (address, timeout) = target(device, &config)?;
            commands::cmd_watch(
                host,
                WatchArgs {
                    address,
                    handle,
                    duration: duration.map(Duration::from_secs),
                    count,
                    timeout,
                    format,
                    output,
                    quiet,
                    opts: &opts,
                },
            )
            .await?;
        }
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }

    Ok(())
}

/// Resolve the peripheral address and connect timeout for a device command.
fn target(args: DeviceArgs, config: &Config) -> Result<(String, Duration)> {
    let address = require_device(resolve_device(args.device, config))?;
    Ok((address, resolve_timeout(args.timeout, config)))
}

/// Initialize tracing on stderr, and additionally on the log file if one is
/// configured. The file gets plain text without ANSI colors.
fn init_tracing(cli: &Cli, config: &Config) -> Result<()> {
    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = match resolve_path(cli.log_file.clone(), config.log_file.as_ref()) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(!cli.no_color)
                .with_writer(io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}
