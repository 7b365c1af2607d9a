//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use gattscope_types::CharacteristicHandle;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Peripheral address (MAC address, or platform identifier on macOS)
    #[arg(short, long, env = "GATTSCOPE_DEVICE")]
    pub device: Option<String>,

    /// Connection timeout in seconds (overrides config)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

#[derive(Parser)]
#[command(name = "gattscope")]
#[command(author, version, about = "Scan for BLE peripherals and talk GATT to them", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write the operational log to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for advertising peripherals
    Scan {
        /// Scan duration in seconds
        #[arg(short = 'D', long)]
        duration: Option<u64>,

        /// Length of each scan poll in milliseconds
        #[arg(long, value_name = "MS")]
        poll_interval: Option<u64>,

        /// Export every AD structure to this CSV file [default: ble_devices.csv]
        #[arg(long, value_name = "PATH", conflicts_with = "no_csv")]
        csv_file: Option<PathBuf>,

        /// Skip the CSV export
        #[arg(long)]
        no_csv: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect and list services and characteristics
    Services {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Read a characteristic
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// Characteristic handle (decimal or 0x-prefixed hex)
        #[arg(short = 'H', long)]
        handle: CharacteristicHandle,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a characteristic
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Characteristic handle (decimal or 0x-prefixed hex)
        #[arg(short = 'H', long)]
        handle: CharacteristicHandle,

        /// Value as hex bytes, e.g. "01ff" or "01:ff"
        #[arg(long)]
        value: String,
    },

    /// Subscribe to a characteristic and print notifications
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        /// Characteristic handle (decimal or 0x-prefixed hex)
        #[arg(short = 'H', long)]
        handle: CharacteristicHandle,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(short = 'D', long)]
        duration: Option<u64>,

        /// Stop after this many notifications (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["gattscope", "scan"]).unwrap();
        match cli.command {
            Commands::Scan {
                duration,
                poll_interval,
                csv_file,
                no_csv,
                format,
            } => {
                assert_eq!(duration, None);
                assert_eq!(poll_interval, None);
                assert_eq!(csv_file, None);
                assert!(!no_csv);
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_scan_with_options() {
        let cli = Cli::try_parse_from([
            "gattscope",
            "--log-file",
            "ble_scan.log",
            "scan",
            "--duration",
            "5",
            "--csv-file",
            "ble_devices.csv",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("ble_scan.log")));
        match cli.command {
            Commands::Scan {
                duration,
                csv_file,
                format,
                ..
            } => {
                assert_eq!(duration, Some(5));
                assert_eq!(csv_file, Some(PathBuf::from("ble_devices.csv")));
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_no_csv_conflicts_with_csv_file() {
        let cli = Cli::try_parse_from(["gattscope", "scan", "--no-csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { no_csv: true, .. }));
        assert!(
            Cli::try_parse_from(["gattscope", "scan", "--no-csv", "--csv-file", "out.csv"])
                .is_err()
        );
    }

    #[test]
    fn test_read_parses_hex_handle() {
        let cli = Cli::try_parse_from([
            "gattscope",
            "read",
            "--device",
            "AA:BB:CC:DD:EE:FF",
            "--handle",
            "0x000e",
        ])
        .unwrap();
        match cli.command {
            Commands::Read { device, handle, .. } => {
                assert_eq!(device.device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
                assert_eq!(handle, CharacteristicHandle(14));
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_invalid_handle_rejected() {
        assert!(Cli::try_parse_from(["gattscope", "read", "--handle", "zz"]).is_err());
    }

    #[test]
    fn test_write_requires_value() {
        assert!(Cli::try_parse_from(["gattscope", "write", "--handle", "3"]).is_err());
        let cli =
            Cli::try_parse_from(["gattscope", "write", "--handle", "3", "--value", "01ff"]).unwrap();
        assert!(matches!(cli.command, Commands::Write { ref value, .. } if value == "01ff"));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["gattscope", "-v", "-q", "scan"]).is_err());
    }
}
