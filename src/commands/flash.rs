//! Flash command - confirm, then run the provisioning pipeline.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use usbfreedom::config::Config;
use usbfreedom::flash::{FlashMode, FlashOptions, FlashReport, Flasher};
use usbfreedom::partition::PersistenceSize;
use usbfreedom::process::Host;

/// Arguments for the flash command, as parsed from the CLI.
pub struct FlashArgs {
    pub image: PathBuf,
    pub device: String,
    pub persistence: bool,
    pub persistence_size_mb: Option<i64>,
    pub sha256: Option<String>,
    pub boot_label: Option<String>,
    pub persistence_label: Option<String>,
    pub yes: bool,
}

/// CLI flags win over config values.
pub fn build_options(args: &FlashArgs, config: &Config) -> Result<FlashOptions> {
    let size_mb = args.persistence_size_mb.unwrap_or(config.persistence_size_mb);
    let persistence_size = PersistenceSize::from_mb(size_mb)
        .with_context(|| format!("Invalid persistence size: {}", size_mb))?;

    Ok(FlashOptions {
        persistence: args.persistence,
        persistence_size,
        boot_label: args
            .boot_label
            .clone()
            .unwrap_or_else(|| config.boot_label.clone()),
        persistence_label: args
            .persistence_label
            .clone()
            .unwrap_or_else(|| config.persistence_label.clone()),
        expected_sha256: args.sha256.clone(),
        ..FlashOptions::default()
    })
}

/// Ask before destroying the device. Only `y` or `yes` proceeds.
pub fn confirm(input: &mut impl BufRead, device: &str) -> Result<bool> {
    print!(
        "WARNING: This will erase all data on {}. Continue? [y/N] ",
        device
    );
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Execute the flash command.
pub fn cmd_flash(host: Host<'_>, args: FlashArgs, config: &Config) -> Result<()> {
    let options = build_options(&args, config)?;

    if !args.yes {
        let stdin = io::stdin();
        if !confirm(&mut stdin.lock(), &args.device)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let flasher = Flasher::new(host, &args.image, &args.device, options);
    let report = flasher
        .flash()
        .with_context(|| format!("Failed to flash {}", args.device))?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &FlashReport) {
    println!();
    match report.mode {
        FlashMode::Simple => println!("Flashed {} (simple mode)", report.device),
        FlashMode::Persistence => println!("Flashed {} with persistence", report.device),
    }
    println!("  Image: {} MB", report.image_bytes / 1024 / 1024);
    if let Some(layout) = &report.layout {
        println!("  Boot partition: {} MB", layout.boot_bytes / 1024 / 1024);
        println!(
            "  Persistence partition: {} MB",
            layout.persistence_bytes / 1024 / 1024
        );
    }
    for part in &report.partitions {
        println!(
            "  {}: {} {} {}",
            part.path,
            part.size.as_deref().unwrap_or("?"),
            part.fstype.as_deref().unwrap_or("?"),
            part.label.as_deref().unwrap_or("")
        );
    }
    if !report.warnings.is_empty() {
        println!("\n{} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }
}
