//! Partition layout and destructive device provisioning.

pub mod manager;
pub mod scheme;

pub use manager::{
    PartitionInfo, PartitionLayout, PartitionManager, ProvisionState, DEFAULT_BOOT_LABEL,
    DEFAULT_PERSISTENCE_LABEL,
};
pub use scheme::{boot_size_for_image, PartitionScheme, PersistenceSize, MIB, SAFETY_BUFFER_MB};

/// Device node for partition `number` of `device`.
///
/// NVMe and MMC devices end in a digit, so their partitions take a `p`
/// separator (`/dev/nvme0n1p1`); everything else appends the number
/// directly (`/dev/sdb1`).
pub fn partition_path(device: &str, number: u32) -> String {
    if device.contains("nvme") || device.contains("mmcblk") {
        format!("{}p{}", device, number)
    } else {
        format!("{}{}", device, number)
    }
}
