//! Removable block device inventory.
//!
//! Everything here is a fresh `lsblk` query. Nothing is cached: a stick can
//! be pulled or repartitioned between two calls.

use serde::Serialize;
use std::fmt;

use crate::process::Host;

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Snapshot of one block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub size_bytes: u64,
    pub vendor: String,
    pub model: String,
    pub removable: bool,
}

impl DeviceInfo {
    /// Size in GiB.
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_GIB
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.1}GB) - {} {}",
            self.path,
            self.size_gb(),
            self.vendor,
            self.model
        )
    }
}

/// List removable disks.
///
/// Returns an empty list if `lsblk` fails or finds nothing; no hardware is
/// not an error.
pub fn list_removable_devices(host: Host<'_>) -> Vec<DeviceInfo> {
    let result = host.run_unchecked(
        "lsblk",
        ["-n", "-d", "-o", "NAME,SIZE,VENDOR,MODEL,RM,TYPE", "-b"],
    );

    match result {
        Ok(result) if result.success() => parse_removable_devices(&result.stdout),
        Ok(result) => {
            host.sink.error(
                "device",
                format!(
                    "Failed to list USB devices: lsblk exited with {}",
                    result.code()
                ),
            );
            Vec::new()
        }
        Err(e) => {
            host.sink
                .error("device", format!("Failed to list USB devices: {}", e));
            Vec::new()
        }
    }
}

/// Parse `lsblk -n -d -o NAME,SIZE,VENDOR,MODEL,RM,TYPE -b` output.
///
/// Keeps only `disk` rows flagged removable. Short or malformed lines are
/// skipped.
pub fn parse_removable_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            let size_bytes = parts[1].parse::<u64>().ok()?;
            let removable = parts[4] == "1";
            if !removable || parts[5] != "disk" {
                return None;
            }
            Some(DeviceInfo {
                path: format!("/dev/{}", parts[0]),
                size_bytes,
                vendor: parts[2].to_string(),
                model: parts[3].to_string(),
                removable,
            })
        })
        .collect()
}

/// Parse `lsblk -n -b -o SIZE,VENDOR,MODEL,RM <path>` output for one device.
///
/// Only the first line describes the disk itself; the rest are partitions.
pub fn parse_device_info(path: &str, output: &str) -> Option<DeviceInfo> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    Some(DeviceInfo {
        path: path.to_string(),
        size_bytes: parts[0].parse().ok()?,
        vendor: parts[1].to_string(),
        model: parts[2].to_string(),
        removable: parts[3] == "1",
    })
}
