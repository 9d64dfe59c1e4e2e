//! Preflight findings and the report printed by `usbfreedom preflight`.

use std::path::PathBuf;

/// An external program the flash pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    /// Distribution package that ships it.
    pub package: &'static str,
    /// Pipeline step that runs it.
    pub purpose: &'static str,
    /// Missing required tools fail preflight; optional ones only warn.
    pub required: bool,
}

impl Tool {
    pub const fn required(
        name: &'static str,
        package: &'static str,
        purpose: &'static str,
    ) -> Self {
        Self {
            name,
            package,
            purpose,
            required: true,
        }
    }

    pub const fn optional(
        name: &'static str,
        package: &'static str,
        purpose: &'static str,
    ) -> Self {
        Self {
            name,
            package,
            purpose,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Flashing will fail.
    Fail,
    Warn,
    /// Not applicable to the selected mode.
    Skip,
}

/// What one preflight check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Found { tool: Tool, path: PathBuf },
    Missing(Tool),
    /// Persistence was requested on a host without the Linux partitioning tools.
    PersistenceUnsupported,
    /// Simple mode: partitioning tools are not looked up.
    PersistenceNotRequested,
}

impl Check {
    pub fn name(&self) -> &str {
        match self {
            Check::Found { tool, .. } | Check::Missing(tool) => tool.name,
            Check::PersistenceUnsupported => "persistence",
            Check::PersistenceNotRequested => "persistence tools",
        }
    }

    pub fn status(&self) -> CheckStatus {
        match self {
            Check::Found { .. } => CheckStatus::Pass,
            Check::Missing(tool) if tool.required => CheckStatus::Fail,
            Check::Missing(_) => CheckStatus::Warn,
            Check::PersistenceUnsupported => CheckStatus::Fail,
            Check::PersistenceNotRequested => CheckStatus::Skip,
        }
    }

    pub fn details(&self) -> String {
        match self {
            Check::Found { path, .. } => path.display().to_string(),
            Check::Missing(tool) => format!(
                "not found, install the '{}' package ({})",
                tool.package, tool.purpose
            ),
            Check::PersistenceUnsupported => {
                "persistence mode needs Linux partitioning tools".to_string()
            }
            Check::PersistenceNotRequested => "not needed without --persistence".to_string(),
        }
    }
}

/// Results of all preflight checks.
pub struct PreflightReport {
    pub checks: Vec<Check>,
}

impl PreflightReport {
    /// True if no check failed.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status() == status).count()
    }

    /// Packages providing the missing required tools, each listed once.
    pub fn packages_to_install(&self) -> Vec<&'static str> {
        let mut packages = Vec::new();
        for check in &self.checks {
            if let Check::Missing(tool) = check {
                if tool.required && !packages.contains(&tool.package) {
                    packages.push(tool.package);
                }
            }
        }
        packages
    }

    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, label) = match check.status() {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
                CheckStatus::Warn => ("⚠", "WARN"),
                CheckStatus::Skip => ("○", "SKIP"),
            };
            println!("  {} [{}] {}: {}", icon, label, check.name(), check.details());
        }

        println!();
        let tools = self
            .checks
            .iter()
            .filter(|c| matches!(c, Check::Found { .. } | Check::Missing(_)))
            .count();
        let found = self.count(CheckStatus::Pass);
        println!("Tools: {}/{} found", found, tools);

        let packages = self.packages_to_install();
        if !packages.is_empty() {
            println!("Install: {}", packages.join(" "));
        }
        if self.fail_count() > 0 {
            println!("{} check(s) FAILED, flashing will not succeed", self.fail_count());
        }
        if self.warn_count() > 0 {
            println!("{} warning(s)", self.warn_count());
        }
    }
}
