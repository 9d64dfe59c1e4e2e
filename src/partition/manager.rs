//! Destructive provisioning of one block device.
//!
//! The sequence is validate → unmount → wipe → partition table → format.
//! There is no rollback: a failed mandatory step leaves the device half
//! provisioned and the error goes straight back to the caller.

use serde::Serialize;
use std::thread;
use std::time::Duration;

use super::partition_path;
use super::scheme::{PartitionScheme, MIB};
use crate::device::{parse_device_info, DeviceInfo};
use crate::error::{FlashError, Result};
use crate::mount::unmount_device;
use crate::process::{Cmd, Host};
use crate::step::{best_effort, mandatory, Warning};

/// Volume label for the FAT32 boot partition.
pub const DEFAULT_BOOT_LABEL: &str = "USBBOOT";

/// Volume label for the ext4 persistence partition.
pub const DEFAULT_PERSISTENCE_LABEL: &str = "persistence";

/// Offset of the first partition, in MiB.
const FIRST_PARTITION_START_MIB: u64 = 1;

const SETTLE_ATTEMPTS: u32 = 5;
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// How far the device has been provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ProvisionState {
    Validated,
    Unmounted,
    Wiped,
    Tabled,
    Formatted,
}

/// Computed layout written by [`PartitionManager::create_partition_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionLayout {
    pub total_bytes: u64,
    pub boot_bytes: u64,
    pub persistence_bytes: u64,
    /// End of partition 1 / start of partition 2, in MiB.
    pub boot_end_mib: u64,
}

/// Best-effort description of one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub path: String,
    pub size: Option<String>,
    pub fstype: Option<String>,
    pub label: Option<String>,
}

impl PartitionInfo {
    fn path_only(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }
}

/// Parse `lsblk -n -o SIZE,FSTYPE,LABEL <part>` output.
pub fn parse_partition_info(path: &str, output: &str) -> PartitionInfo {
    let Some(line) = output.lines().find(|l| !l.trim().is_empty()) else {
        return PartitionInfo::path_only(path.to_string());
    };
    let mut fields = line.split_whitespace().map(str::to_string);
    PartitionInfo {
        path: path.to_string(),
        size: fields.next(),
        fstype: fields.next(),
        label: fields.next(),
    }
}

/// Operations on one validated block device.
pub struct PartitionManager<'a> {
    host: Host<'a>,
    device_path: String,
    state: ProvisionState,
    warnings: Vec<Warning>,
    settle_attempts: u32,
    settle_delay: Duration,
}

impl<'a> PartitionManager<'a> {
    /// Bind to `device_path`, which must be a block device.
    pub fn new(host: Host<'a>, device_path: &str) -> Result<Self> {
        let is_block = host
            .run_unchecked("test", ["-b", device_path])
            .map(|r| r.success())
            .unwrap_or(false);
        if !is_block {
            return Err(FlashError::InvalidDevice(device_path.to_string()));
        }

        Ok(Self {
            host,
            device_path: device_path.to_string(),
            state: ProvisionState::Validated,
            warnings: Vec::new(),
            settle_attempts: SETTLE_ATTEMPTS,
            settle_delay: SETTLE_DELAY,
        })
    }

    /// Override how long [`verify_partitions`](Self::verify_partitions)
    /// waits for partition nodes to appear.
    pub fn with_settle(mut self, attempts: u32, delay: Duration) -> Self {
        self.settle_attempts = attempts.max(1);
        self.settle_delay = delay;
        self
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    /// Failures swallowed by best-effort steps so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Query size/vendor/model. `None` if the query fails.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        let result = self.host.run_unchecked(
            "lsblk",
            ["-n", "-b", "-o", "SIZE,VENDOR,MODEL,RM", self.device_path.as_str()],
        );

        match result {
            Ok(r) if r.success() => {
                let info = parse_device_info(&self.device_path, &r.stdout);
                if info.is_none() {
                    self.host.sink.error(
                        "partition",
                        format!(
                            "Failed to get device info: unexpected lsblk output {:?}",
                            r.stdout_trimmed()
                        ),
                    );
                }
                info
            }
            Ok(r) => {
                self.host.sink.error(
                    "partition",
                    format!("Failed to get device info: lsblk exited with {}", r.code()),
                );
                None
            }
            Err(e) => {
                self.host
                    .sink
                    .error("partition", format!("Failed to get device info: {}", e));
                None
            }
        }
    }

    /// Current device size in bytes, read fresh every call.
    pub fn device_size(&self) -> Result<u64> {
        let result = self
            .host
            .run("blockdev", ["--getsize64", self.device_path.as_str()])?;
        let raw = result.stdout_trimmed();
        raw.parse().map_err(|_| FlashError::Parse {
            what: "device size",
            input: raw.to_string(),
        })
    }

    /// Unmount everything mounted from this device. Best-effort.
    pub fn unmount_all(&mut self) {
        let host = self.host;
        host.sink.info(
            "partition",
            format!("Unmounting all partitions on {}", self.device_path),
        );

        let warnings = unmount_device(host, &self.device_path);
        self.warnings.extend(warnings);
        self.state = ProvisionState::Unmounted;
    }

    /// Erase filesystem signatures and zero the first and last MiB.
    ///
    /// Best-effort throughout; a device that refuses to be wiped fails
    /// later at partitioning or format time.
    pub fn wipe_device(&mut self) {
        let host = self.host;
        let dev = self.device_path.clone();
        let dev = dev.as_str();
        host.sink.info("partition", format!("Wiping {}", dev));

        if let Err(w) = best_effort(host.sink, "wipefs", || host.run("wipefs", ["-a", dev])) {
            self.warnings.push(w);
        }

        let of = format!("of={}", dev);
        let head = best_effort(host.sink, "zero first MiB", || {
            host.run("dd", ["if=/dev/zero", of.as_str(), "bs=1M", "count=1", "conv=fsync"])
        });
        if let Err(w) = head {
            self.warnings.push(w);
        }

        let tail = best_effort(host.sink, "zero last MiB", || {
            let size = self.device_size()?;
            let seek = format!("seek={}", (size / MIB).saturating_sub(1));
            host.run(
                "dd",
                ["if=/dev/zero", of.as_str(), "bs=1M", seek.as_str(), "count=1", "conv=fsync"],
            )
        });
        if let Err(w) = tail {
            self.warnings.push(w);
        }

        self.state = ProvisionState::Wiped;
    }

    /// Write a GPT label with a bootable FAT32 partition and an ext4
    /// partition filling the rest of the device.
    pub fn create_partition_table(&mut self, scheme: &PartitionScheme) -> Result<PartitionLayout> {
        let host = self.host;
        let dev = self.device_path.clone();
        let dev = dev.as_str();
        host.sink.info("partition", "Creating partition table");

        let total_bytes = mandatory(host.sink, "read device size", || self.device_size())?;
        let (boot_bytes, persistence_bytes) = scheme.calculate_sizes(total_bytes)?;

        host.sink.info(
            "partition",
            format!("Boot partition: {}MB", boot_bytes / MIB),
        );
        host.sink.info(
            "partition",
            format!("Persistence partition: {}MB", persistence_bytes / MIB),
        );

        let boot_end_mib = FIRST_PARTITION_START_MIB + boot_bytes / MIB;
        let boot_start = format!("{}MiB", FIRST_PARTITION_START_MIB);
        let boot_end = format!("{}MiB", boot_end_mib);

        mandatory(host.sink, "partition table", || {
            host.run("parted", ["-s", dev, "mklabel", "gpt"])?;
            host.run(
                "parted",
                ["-s", dev, "mkpart", "primary", "fat32", boot_start.as_str(), boot_end.as_str()],
            )?;
            host.run("parted", ["-s", dev, "set", "1", "boot", "on"])?;
            host.run(
                "parted",
                ["-s", dev, "mkpart", "primary", "ext4", boot_end.as_str(), "100%"],
            )?;
            host.sync()
        })?;

        if let Err(w) = best_effort(host.sink, "partprobe", || host.run("partprobe", [dev])) {
            self.warnings.push(w);
        }

        self.state = ProvisionState::Tabled;
        host.sink.info("partition", "Partition table created successfully");

        Ok(PartitionLayout {
            total_bytes,
            boot_bytes,
            persistence_bytes,
            boot_end_mib,
        })
    }

    /// Wait for both partition device nodes to exist.
    pub fn verify_partitions(&mut self) -> Result<()> {
        let host = self.host;

        if let Err(w) = best_effort(host.sink, "udevadm settle", || {
            host.run("udevadm", ["settle"])
        }) {
            self.warnings.push(w);
        }

        for number in 1..=2 {
            let path = self.partition_path(number);
            let mut present = false;
            for attempt in 1..=self.settle_attempts {
                present = host
                    .run_unchecked("test", ["-b", path.as_str()])
                    .map(|r| r.success())
                    .unwrap_or(false);
                if present {
                    break;
                }
                if attempt < self.settle_attempts {
                    host.sink.debug(
                        "partition",
                        format!("{} not present yet (attempt {})", path, attempt),
                    );
                    thread::sleep(self.settle_delay);
                }
            }
            if !present {
                host.sink
                    .error("partition", format!("Partition {} missing at {}", number, path));
                return Err(FlashError::PartitionMissing { number, path });
            }
        }
        Ok(())
    }

    /// Format partition 1 as FAT32 and partition 2 as ext4.
    pub fn format_partitions(&mut self, boot_label: &str, persist_label: &str) -> Result<()> {
        let host = self.host;
        let boot_part = self.partition_path(1);
        let persist_part = self.partition_path(2);

        host.sink.info(
            "partition",
            format!("Formatting boot partition: {}", boot_part),
        );
        mandatory(host.sink, "format boot partition", || {
            host.run("mkfs.vfat", ["-F", "32", "-n", boot_label, boot_part.as_str()])
        })?;

        host.sink.info(
            "partition",
            format!("Formatting persistence partition: {}", persist_part),
        );
        mandatory(host.sink, "format persistence partition", || {
            host.run("mkfs.ext4", ["-F", "-L", persist_label, persist_part.as_str()])
        })?;

        host.sync()?;
        self.state = ProvisionState::Formatted;
        host.sink.info("partition", "Partitions formatted successfully");
        Ok(())
    }

    /// Device node for partition `number` on this device.
    pub fn partition_path(&self, number: u32) -> String {
        partition_path(&self.device_path, number)
    }

    /// Size, filesystem and label of partition `number`.
    ///
    /// Falls back to a record holding only the path if `lsblk` fails.
    pub fn partition_info(&self, number: u32) -> PartitionInfo {
        let path = self.partition_path(number);
        let cmd = Cmd::new("lsblk")
            .args(["-n", "-o", "SIZE,FSTYPE,LABEL"])
            .arg(&path)
            .allow_fail();

        match cmd.run(self.host) {
            Ok(r) if r.success() => parse_partition_info(&path, &r.stdout),
            Ok(r) => {
                self.host.sink.error(
                    "partition",
                    format!("Failed to get partition info: lsblk exited with {}", r.code()),
                );
                PartitionInfo::path_only(path)
            }
            Err(e) => {
                self.host
                    .sink
                    .error("partition", format!("Failed to get partition info: {}", e));
                PartitionInfo::path_only(path)
            }
        }
    }
}
