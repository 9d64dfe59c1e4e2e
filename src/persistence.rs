//! Persistence partition layout for the live system.
//!
//! The live system unions `upper/` over its read-only root using `work/` as
//! the overlay work directory, and reads `persistence.conf` to learn which
//! trees to persist.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::mount::ScopedMount;
use crate::partition::DEFAULT_PERSISTENCE_LABEL;
use crate::process::Host;

/// Name of the manifest written at the partition root.
pub const MANIFEST_FILE: &str = "persistence.conf";

/// Directories created at the partition root.
pub const LAYOUT_DIRS: &[&str] = &["upper", "work", "home", "root", "etc", "var/log"];

/// Entries that must exist for the partition to be usable.
pub const REQUIRED_ITEMS: &[&str] = &["upper", "work", MANIFEST_FILE];

/// Trees the live system keeps across reboots.
pub const PERSISTED_PATHS: &[&str] = &["/home", "/var/log", "/etc", "/root", "/usr/local", "/opt"];

/// Trees listed as `union` in the manifest.
pub const UNION_PATHS: &[&str] = &["/home", "/var/log", "/etc", "/root", "/usr/local"];

/// Static persistence policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub partition_label: String,
    /// Where the live system mounts the partition.
    pub mount_point: PathBuf,
    pub upper_dir: PathBuf,
    pub work_dir: PathBuf,
    pub home_dir: PathBuf,
}

impl PersistenceConfig {
    pub fn new(partition_label: &str) -> Self {
        let mount_point = PathBuf::from("/persistence");
        Self {
            partition_label: partition_label.to_string(),
            upper_dir: mount_point.join("upper"),
            work_dir: mount_point.join("work"),
            home_dir: mount_point.join("home"),
            mount_point,
        }
    }

    pub fn persistence_paths(&self) -> &'static [&'static str] {
        PERSISTED_PATHS
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PERSISTENCE_LABEL)
    }
}

/// Contents of `persistence.conf`.
pub fn manifest_contents() -> String {
    let mut out = String::from(
        "# Persistence configuration for USBFREEDOM\n\
         # Each line specifies a directory to persist\n\n",
    );
    for path in UNION_PATHS {
        out.push_str(path);
        out.push_str(" union\n");
    }
    out
}

/// Create the layout directories and manifest under `root`.
pub fn write_layout(root: &Path) -> Result<()> {
    for dir in LAYOUT_DIRS {
        fs::create_dir_all(root.join(dir))?;
    }
    fs::write(root.join(MANIFEST_FILE), manifest_contents())?;
    Ok(())
}

/// Required entries absent from `root`.
pub fn missing_layout_items(root: &Path) -> Vec<&'static str> {
    REQUIRED_ITEMS
        .iter()
        .copied()
        .filter(|item| !root.join(item).exists())
        .collect()
}

/// Builds and checks the layout on one partition.
pub struct PersistenceBuilder<'a> {
    host: Host<'a>,
    partition_device: String,
}

impl<'a> PersistenceBuilder<'a> {
    pub fn new(host: Host<'a>, partition_device: &str) -> Self {
        Self {
            host,
            partition_device: partition_device.to_string(),
        }
    }

    pub fn partition_device(&self) -> &str {
        &self.partition_device
    }

    /// Mount the partition, lay out the persistence tree and unmount.
    ///
    /// Returns `false` on any failure; the reason is logged.
    pub fn setup_persistence_structure(&self) -> bool {
        self.host
            .sink
            .info("persistence", "Setting up persistence structure");

        match self.try_setup() {
            Ok(()) => {
                self.host
                    .sink
                    .info("persistence", "Persistence structure created successfully");
                true
            }
            Err(e) => {
                self.host.sink.error(
                    "persistence",
                    format!("Failed to create persistence structure: {}", e),
                );
                false
            }
        }
    }

    fn try_setup(&self) -> Result<()> {
        let mount = ScopedMount::new(self.host, &self.partition_device)?;
        let root = mount.path();

        for dir in LAYOUT_DIRS {
            self.host.sink.info(
                "persistence",
                format!("Creating directory: {}", root.join(dir).display()),
            );
        }
        self.host.sink.info(
            "persistence",
            format!("Creating {}", root.join(MANIFEST_FILE).display()),
        );
        write_layout(root)?;

        self.host.sync()
    }

    /// Mount the partition and check `upper`, `work` and the manifest exist.
    pub fn verify_persistence(&self) -> bool {
        self.host
            .sink
            .info("persistence", "Verifying persistence structure");

        let mount = match ScopedMount::new(self.host, &self.partition_device) {
            Ok(mount) => mount,
            Err(e) => {
                self.host
                    .sink
                    .error("persistence", format!("Verification failed: {}", e));
                return false;
            }
        };

        let missing = missing_layout_items(mount.path());
        if let Some(item) = missing.first() {
            self.host
                .sink
                .error("persistence", format!("Missing required item: {}", item));
            return false;
        }

        self.host
            .sink
            .info("persistence", "Persistence verification passed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PersistenceConfig::default();
        assert_eq!(config.partition_label, "persistence");
        assert_eq!(config.mount_point, PathBuf::from("/persistence"));
        assert_eq!(config.upper_dir, PathBuf::from("/persistence/upper"));
        assert_eq!(config.work_dir, PathBuf::from("/persistence/work"));
        assert_eq!(config.home_dir, PathBuf::from("/persistence/home"));
    }

    #[test]
    fn test_custom_label() {
        let config = PersistenceConfig::new("custom_persist");
        assert_eq!(config.partition_label, "custom_persist");
    }

    #[test]
    fn test_persistence_paths() {
        let paths = PersistenceConfig::default().persistence_paths();
        for expected in ["/home", "/var/log", "/etc", "/root", "/usr/local", "/opt"] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_manifest_lists_union_paths() {
        let manifest = manifest_contents();
        let entries: Vec<&str> = manifest
            .lines()
            .filter(|l| !l.starts_with('#') && !l.is_empty())
            .collect();
        assert_eq!(
            entries,
            vec![
                "/home union",
                "/var/log union",
                "/etc union",
                "/root union",
                "/usr/local union"
            ]
        );
        // /opt is persisted by path policy but not unioned
        assert!(!manifest.contains("/opt"));
    }

    #[test]
    fn test_write_layout_then_nothing_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(missing_layout_items(dir.path()), REQUIRED_ITEMS.to_vec());

        write_layout(dir.path()).unwrap();
        assert!(missing_layout_items(dir.path()).is_empty());
        assert!(dir.path().join("var/log").is_dir());
        assert!(dir.path().join("home").is_dir());
    }

    #[test]
    fn test_missing_single_item() {
        let dir = TempDir::new().unwrap();
        write_layout(dir.path()).unwrap();
        fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(missing_layout_items(dir.path()), vec![MANIFEST_FILE]);
    }
}
