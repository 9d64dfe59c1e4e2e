//! Boot/persistence partition sizing.

use serde::Serialize;

use crate::error::SizingError;

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Space left unallocated behind the persistence partition when it takes
/// the rest of the device.
pub const SAFETY_BUFFER_MB: u64 = 100;

/// How big the persistence partition should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PersistenceSize {
    /// Everything after the boot partition minus [`SAFETY_BUFFER_MB`].
    #[default]
    Remaining,
    /// Exactly this many MiB.
    Fixed(u64),
}

impl PersistenceSize {
    /// Accepts the command-line convention of `-1` (or `0`, an unset size)
    /// for "remaining space".
    pub fn from_mb(mb: i64) -> Result<Self, SizingError> {
        match mb {
            -1 | 0 => Ok(Self::Remaining),
            mb if mb > 0 => Ok(Self::Fixed(mb as u64)),
            mb => Err(SizingError::InvalidPersistenceSize(mb)),
        }
    }
}

/// Partition layout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionScheme {
    boot_size_mb: u64,
    persistence: PersistenceSize,
}

impl PartitionScheme {
    pub fn new(boot_size_mb: u64, persistence: PersistenceSize) -> Result<Self, SizingError> {
        if boot_size_mb == 0 {
            return Err(SizingError::ZeroBootSize);
        }
        Ok(Self {
            boot_size_mb,
            persistence,
        })
    }

    pub fn boot_size_mb(&self) -> u64 {
        self.boot_size_mb
    }

    pub fn persistence(&self) -> PersistenceSize {
        self.persistence
    }

    /// Byte sizes `(boot, persistence)` for a device of `total_size_bytes`.
    ///
    /// With [`PersistenceSize::Remaining`] a device too small to hold the
    /// boot partition plus the safety buffer is rejected rather than
    /// yielding a zero or negative persistence size.
    pub fn calculate_sizes(&self, total_size_bytes: u64) -> Result<(u64, u64), SizingError> {
        let boot_bytes = mb_to_bytes(self.boot_size_mb)?;

        let persistence_bytes = match self.persistence {
            PersistenceSize::Fixed(mb) => mb_to_bytes(mb)?,
            PersistenceSize::Remaining => {
                let required = boot_bytes
                    .checked_add(SAFETY_BUFFER_MB * MIB)
                    .ok_or(SizingError::Overflow(self.boot_size_mb))?;
                match total_size_bytes.checked_sub(required) {
                    Some(rest) if rest > 0 => rest,
                    _ => {
                        return Err(SizingError::InsufficientSpace {
                            total: total_size_bytes,
                            required,
                        })
                    }
                }
            }
        };

        Ok((boot_bytes, persistence_bytes))
    }
}

fn mb_to_bytes(mb: u64) -> Result<u64, SizingError> {
    mb.checked_mul(MIB).ok_or(SizingError::Overflow(mb))
}

/// Boot partition size for an image: 20% headroom plus a 100 MB margin.
pub fn boot_size_for_image(image_bytes: u64) -> u64 {
    let image_mb = image_bytes as f64 / MIB as f64;
    (image_mb * 1.2).ceil() as u64 + 100
}
