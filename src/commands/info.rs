//! Info command - describe one device and its partitions.

use anyhow::{Context, Result};

use usbfreedom::partition::PartitionManager;
use usbfreedom::process::Host;

/// Print size, identity and the first two partitions of `device`.
pub fn cmd_info(host: Host<'_>, device: &str) -> Result<()> {
    let pm = PartitionManager::new(host, device)
        .with_context(|| format!("Cannot inspect {}", device))?;

    match pm.device_info() {
        Some(info) => {
            println!("Device:    {}", info.path);
            println!("Size:      {:.1}GB ({} bytes)", info.size_gb(), info.size_bytes);
            println!("Vendor:    {}", info.vendor);
            println!("Model:     {}", info.model);
            println!("Removable: {}", if info.removable { "yes" } else { "no" });
        }
        None => {
            let size = pm.device_size().context("Failed to read device size")?;
            println!("Device:    {}", device);
            println!("Size:      {} bytes", size);
        }
    }

    println!();
    for number in [1, 2] {
        let part = pm.partition_info(number);
        println!(
            "  {}  {:>8}  {:<6}  {}",
            part.path,
            part.size.as_deref().unwrap_or("-"),
            part.fstype.as_deref().unwrap_or("-"),
            part.label.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
