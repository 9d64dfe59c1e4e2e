//! Preflight command - runs preflight checks.

use anyhow::Result;

use usbfreedom::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(persistence: bool, strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(persistence)?;
    } else {
        let report = preflight::check_host_tools(persistence);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to exit non-zero.");
        }
    }
    Ok(())
}
