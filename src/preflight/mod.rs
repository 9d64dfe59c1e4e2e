//! Preflight checks for flashing.
//!
//! Verifies the external tools a flash run shells out to are installed.
//! Run with `usbfreedom preflight` to check everything is ready.

mod host_tools;
mod types;

use anyhow::{bail, Result};

pub use host_tools::{host_tool_checks, host_tool_checks_with};
pub use types::{Check, CheckStatus, PreflightReport, Tool};

/// Check every tool the selected flash mode needs.
pub fn check_host_tools(persistence: bool) -> PreflightReport {
    PreflightReport {
        checks: host_tool_checks(persistence),
    }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(persistence: bool) -> Result<()> {
    let report = check_host_tools(persistence);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before flashing.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
