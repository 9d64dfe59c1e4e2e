//! List-devices command.

use anyhow::{Context, Result};

use usbfreedom::device::{self, DeviceInfo};
use usbfreedom::process::Host;

/// Print removable devices as a table or as JSON.
pub fn cmd_list_devices(host: Host<'_>, json: bool) -> Result<()> {
    let devices = device::list_removable_devices(host);

    if json {
        let out = serde_json::to_string_pretty(&devices).context("Failed to serialize devices")?;
        println!("{}", out);
        return Ok(());
    }

    print_table(&devices);
    Ok(())
}

fn print_table(devices: &[DeviceInfo]) {
    if devices.is_empty() {
        println!("No removable devices found.");
        return;
    }

    println!("{:<16} {:>8}  {:<16} {}", "DEVICE", "SIZE", "VENDOR", "MODEL");
    for dev in devices {
        println!(
            "{:<16} {:>6.1}GB  {:<16} {}",
            dev.path,
            dev.size_gb(),
            dev.vendor,
            dev.model
        );
    }
}
