//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `devices` - List removable devices
//! - `info` - Describe one device
//! - `flash` - Write an image, optionally with persistence
//! - `preflight` - Check host tools
//! - `show` - Display configuration

mod devices;
pub mod flash;
mod info;
mod preflight;
mod show;

pub use devices::cmd_list_devices;
pub use flash::cmd_flash;
pub use info::cmd_info;
pub use preflight::cmd_preflight;
pub use show::cmd_show_config;
