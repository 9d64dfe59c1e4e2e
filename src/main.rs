//! usbfreedom - USB live-system provisioning.
//!
//! Writes a live image onto a USB stick:
//! - simple mode: raw copy onto the whole device
//! - persistence mode: FAT32 boot partition + ext4 persistence partition

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use usbfreedom::config::Config;
use usbfreedom::events::TracingSink;
use usbfreedom::process::{Host, SystemRunner};

#[derive(Parser)]
#[command(name = "usbfreedom")]
#[command(about = "Flash live images to USB, with optional persistence")]
#[command(
    after_help = "QUICK START:\n  usbfreedom list-devices               Find your stick\n  usbfreedom preflight --persistence     Check host tools\n  usbfreedom flash live.iso /dev/sdX     Write the image"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List removable block devices
    ListDevices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show details for one device
    Info {
        /// Device path, e.g. /dev/sdb
        device: String,
    },

    /// Write an image to a device (DESTROYS ALL DATA on it)
    Flash {
        /// Live image to write
        image: PathBuf,
        /// Target device, e.g. /dev/sdb
        device: String,
        /// Create a persistence partition after the boot partition
        #[arg(long)]
        persistence: bool,
        /// Persistence partition size in MB (-1 or 0 = all remaining space)
        #[arg(long, allow_hyphen_values = true)]
        persistence_size: Option<i64>,
        /// Refuse to flash unless the image has this SHA256
        #[arg(long)]
        sha256: Option<String>,
        /// Boot partition label
        #[arg(long)]
        boot_label: Option<String>,
        /// Persistence partition label
        #[arg(long)]
        persistence_label: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Check that required host tools are installed
    Preflight {
        /// Also check tools needed for persistence mode
        #[arg(long)]
        persistence: bool,
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show current configuration
    ShowConfig,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_dir = std::env::current_dir().context("Failed to determine current directory")?;

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load(&base_dir);
    init_logging(&config);

    let runner = SystemRunner;
    let sink = TracingSink;
    let host = Host::new(&runner, &sink);

    match cli.command {
        Commands::ListDevices { json } => {
            commands::cmd_list_devices(host, json)?;
        }

        Commands::Info { device } => {
            commands::cmd_info(host, &device)?;
        }

        Commands::Flash {
            image,
            device,
            persistence,
            persistence_size,
            sha256,
            boot_label,
            persistence_label,
            yes,
        } => {
            let args = commands::flash::FlashArgs {
                image,
                device,
                persistence,
                persistence_size_mb: persistence_size,
                sha256,
                boot_label,
                persistence_label,
                yes,
            };
            commands::cmd_flash(host, args, &config)?;
        }

        Commands::Preflight {
            persistence,
            strict,
        } => {
            commands::cmd_preflight(persistence, strict)?;
        }

        Commands::ShowConfig => {
            commands::cmd_show_config(&config)?;
        }
    }

    Ok(())
}
