//! End-to-end provisioning of a USB stick.
//!
//! Two modes:
//! - simple: unmount, then `dd` the image onto the whole device
//! - persistence: wipe, partition (boot + persistence), format, `dd` the
//!   image onto partition 1, lay out the persistence tree on partition 2,
//!   verify
//!
//! Steps run strictly in order. A mandatory step failing aborts the run
//! with the device left however far it got.

pub mod platform;

pub use platform::Platform;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FlashError, Result};
use crate::image;
use crate::partition::{
    boot_size_for_image, PartitionInfo, PartitionLayout, PartitionManager, PartitionScheme,
    PersistenceSize, DEFAULT_BOOT_LABEL, DEFAULT_PERSISTENCE_LABEL,
};
use crate::persistence::PersistenceBuilder;
use crate::process::Host;
use crate::step::{mandatory, Warning};
use crate::timing::Timer;

/// Which provisioning sequence ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashMode {
    Simple,
    Persistence,
}

/// Options for a flash run.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// Create a persistence partition.
    pub persistence: bool,
    pub persistence_size: PersistenceSize,
    pub boot_label: String,
    pub persistence_label: String,
    /// Refuse to write unless the image hashes to this value.
    pub expected_sha256: Option<String>,
    pub platform: Platform,
    /// How many times to probe for new partition nodes.
    pub settle_attempts: u32,
    pub settle_delay: Duration,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            persistence: false,
            persistence_size: PersistenceSize::Remaining,
            boot_label: DEFAULT_BOOT_LABEL.to_string(),
            persistence_label: DEFAULT_PERSISTENCE_LABEL.to_string(),
            expected_sha256: None,
            platform: Platform::current(),
            settle_attempts: 5,
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct FlashReport {
    pub mode: FlashMode,
    pub device: String,
    pub image_bytes: u64,
    pub boot_size_mb: Option<u64>,
    pub layout: Option<PartitionLayout>,
    pub partitions: Vec<PartitionInfo>,
    /// Best-effort failures and advisory checks that did not pass.
    pub warnings: Vec<Warning>,
}

/// Writes one image onto one device.
pub struct Flasher<'a> {
    host: Host<'a>,
    image_path: PathBuf,
    device_path: String,
    options: FlashOptions,
}

impl<'a> Flasher<'a> {
    pub fn new(
        host: Host<'a>,
        image_path: &Path,
        device_path: &str,
        options: FlashOptions,
    ) -> Self {
        Self {
            host,
            image_path: image_path.to_path_buf(),
            device_path: device_path.to_string(),
            options,
        }
    }

    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Run the sequence selected by [`FlashOptions::persistence`].
    pub fn flash(&self) -> Result<FlashReport> {
        if self.options.persistence {
            self.flash_with_persistence()
        } else {
            self.flash_simple()
        }
    }

    fn image_str(&self) -> String {
        self.image_path.to_string_lossy().into_owned()
    }

    /// Size check plus optional checksum; nothing on the device is touched.
    fn validate_image(&self) -> Result<u64> {
        let image_bytes = image::image_size(&self.image_path)?;
        if let Some(ref expected) = self.options.expected_sha256 {
            image::verify_sha256(self.host.sink, &self.image_path, expected)?;
        }
        Ok(image_bytes)
    }

    fn warn_data_loss(&self) {
        self.host.sink.warn(
            "flash",
            format!("All data on {} will be overwritten.", self.device_path),
        );
    }

    /// Raw copy of the image onto `target`, followed by a sync where the
    /// platform needs one.
    fn write_image(&self, target: &str) -> Result<()> {
        let host = self.host;
        let platform = self.options.platform;
        host.sink.info(
            "flash",
            format!("Flashing {} to {}...", self.image_path.display(), target),
        );

        let timer = Timer::start("write image");
        mandatory(host.sink, "write image", || {
            platform.dd_cmd(&self.image_str(), target).run(host)?;
            if platform.sync_after_write() {
                host.sync()?;
            }
            Ok(())
        })?;
        timer.finish(host.sink);
        Ok(())
    }

    /// Unmount and `dd` the image onto the whole device.
    pub fn flash_simple(&self) -> Result<FlashReport> {
        let image_bytes = self.validate_image()?;
        if !Path::new(&self.device_path).exists() {
            return Err(FlashError::DeviceNotFound(self.device_path.clone()));
        }

        self.warn_data_loss();
        let warnings = self
            .options
            .platform
            .unmount_device(self.host, &self.device_path);

        self.write_image(&self.device_path)?;
        self.host.sink.info("flash", "Done.");

        Ok(FlashReport {
            mode: FlashMode::Simple,
            device: self.device_path.clone(),
            image_bytes,
            boot_size_mb: None,
            layout: None,
            partitions: Vec::new(),
            warnings,
        })
    }

    /// Full partition + format + flash + persistence sequence.
    pub fn flash_with_persistence(&self) -> Result<FlashReport> {
        let host = self.host;
        let sink = host.sink;

        let image_bytes = self.validate_image()?;
        sink.info(
            "flash",
            format!("Image size: {} MB", image_bytes / 1024 / 1024),
        );

        let mut pm = PartitionManager::new(host, &self.device_path)?
            .with_settle(self.options.settle_attempts, self.options.settle_delay);
        self.warn_data_loss();

        let timer = Timer::start("prepare device");
        pm.unmount_all();
        pm.wipe_device();
        timer.finish(sink);

        match pm.device_info() {
            Some(info) => sink.info("flash", format!("Target device: {}", info)),
            None => sink.warn("flash", "Device information unavailable"),
        }

        let boot_size_mb = boot_size_for_image(image_bytes);
        let scheme = PartitionScheme::new(boot_size_mb, self.options.persistence_size)?;
        sink.info(
            "flash",
            format!("Boot partition will be {} MB", boot_size_mb),
        );

        let timer = Timer::start("partition and format");
        let layout = pm.create_partition_table(&scheme)?;
        pm.verify_partitions()?;
        pm.format_partitions(&self.options.boot_label, &self.options.persistence_label)?;
        timer.finish(sink);

        let boot_part = pm.partition_path(1);
        let persist_part = pm.partition_path(2);

        self.write_image(&boot_part)?;

        let timer = Timer::start("persistence setup");
        let builder = PersistenceBuilder::new(host, &persist_part);
        if !builder.setup_persistence_structure() {
            return Err(FlashError::PersistenceSetupFailed(persist_part));
        }

        let mut warnings = Vec::new();
        if !builder.verify_persistence() {
            sink.warn(
                "flash",
                "Persistence verification failed; the partition may not persist data",
            );
            warnings.push(Warning::new(
                "verify persistence",
                format!("persistence layout incomplete on {}", persist_part),
            ));
        }
        timer.finish(sink);

        mandatory(sink, "final sync", || host.sync())?;

        let partitions = vec![pm.partition_info(1), pm.partition_info(2)];
        for part in &partitions {
            sink.info(
                "flash",
                format!(
                    "{}: {} {} {}",
                    part.path,
                    part.size.as_deref().unwrap_or("?"),
                    part.fstype.as_deref().unwrap_or("?"),
                    part.label.as_deref().unwrap_or("")
                ),
            );
        }

        let mut all_warnings = pm.take_warnings();
        all_warnings.extend(warnings);
        sink.info("flash", "Done.");

        Ok(FlashReport {
            mode: FlashMode::Persistence,
            device: self.device_path.clone(),
            image_bytes,
            boot_size_mb: Some(boot_size_mb),
            layout: Some(layout),
            partitions,
            warnings: all_warnings,
        })
    }
}
