//! usbfreedom library.
//!
//! Provisions USB sticks with a bootable live image and, optionally, an
//! ext4 persistence partition. Every external tool runs through
//! [`process::CommandRunner`], and every diagnostic goes to an
//! [`events::EventSink`], so the whole pipeline can be driven by tests.

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod flash;
pub mod image;
pub mod mount;
pub mod partition;
pub mod persistence;
pub mod preflight;
pub mod process;
pub mod step;
pub mod timing;

pub use error::{FlashError, Result, SizingError};
