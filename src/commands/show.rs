//! Show-config command.

use anyhow::Result;

use usbfreedom::config::Config;

/// Print the effective configuration.
pub fn cmd_show_config(config: &Config) -> Result<()> {
    config.print();
    Ok(())
}
