//! Configuration management for usbfreedom.
//!
//! Reads configuration from `.env` files and environment variables.
//! Environment variables take precedence over either file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::partition::{PersistenceSize, DEFAULT_BOOT_LABEL, DEFAULT_PERSISTENCE_LABEL};

pub const ENV_BOOT_LABEL: &str = "USBFREEDOM_BOOT_LABEL";
pub const ENV_PERSISTENCE_LABEL: &str = "USBFREEDOM_PERSISTENCE_LABEL";
pub const ENV_PERSISTENCE_SIZE_MB: &str = "USBFREEDOM_PERSISTENCE_SIZE_MB";
pub const ENV_LOG: &str = "USBFREEDOM_LOG";

const KEYS: [&str; 4] = [
    ENV_BOOT_LABEL,
    ENV_PERSISTENCE_LABEL,
    ENV_PERSISTENCE_SIZE_MB,
    ENV_LOG,
];

/// usbfreedom configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// FAT32 label for the boot partition (default: USBBOOT)
    pub boot_label: String,
    /// ext4 label for the persistence partition (default: persistence)
    pub persistence_label: String,
    /// Persistence partition size in MB, -1 or 0 for all remaining space
    pub persistence_size_mb: i64,
    /// Log filter directive (default: info)
    pub log: String,
    /// Files that were found and read, in load order.
    pub sources: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            boot_label: DEFAULT_BOOT_LABEL.to_string(),
            persistence_label: DEFAULT_PERSISTENCE_LABEL.to_string(),
            persistence_size_mb: -1,
            log: "info".to_string(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from `.env` files and the environment.
    ///
    /// Searches, later entries winning:
    /// 1. `<config_dir>/usbfreedom/config.env`
    /// 2. `<base_dir>/.env`
    /// 3. The process environment
    pub fn load(base_dir: &Path) -> Self {
        let user_file = dirs::config_dir().map(|d| d.join("usbfreedom").join("config.env"));
        let mut files = Vec::new();
        files.extend(user_file);
        files.push(base_dir.join(".env"));
        Self::load_from(&files)
    }

    /// Load from an explicit list of env files.
    pub fn load_from(files: &[PathBuf]) -> Self {
        let mut env_vars = HashMap::new();
        let mut sources = Vec::new();

        for path in files {
            // Missing files are normal; unreadable ones are skipped.
            let Ok(iter) = dotenvy::from_path_iter(path) else {
                continue;
            };
            sources.push(path.clone());
            for (key, value) in iter.flatten() {
                env_vars.insert(key, value);
            }
        }

        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                env_vars.insert(key.to_string(), value);
            }
        }

        Self::from_vars(&env_vars, sources)
    }

    fn from_vars(env_vars: &HashMap<String, String>, sources: Vec<PathBuf>) -> Self {
        let defaults = Self::default();

        let non_empty = |key: &str| {
            env_vars
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let persistence_size_mb = non_empty(ENV_PERSISTENCE_SIZE_MB)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.persistence_size_mb);

        Self {
            boot_label: non_empty(ENV_BOOT_LABEL).unwrap_or(defaults.boot_label),
            persistence_label: non_empty(ENV_PERSISTENCE_LABEL)
                .unwrap_or(defaults.persistence_label),
            persistence_size_mb,
            log: non_empty(ENV_LOG).unwrap_or(defaults.log),
            sources,
        }
    }

    /// The configured persistence size, or `None` if the value is out of range.
    pub fn persistence_size(&self) -> Option<PersistenceSize> {
        PersistenceSize::from_mb(self.persistence_size_mb).ok()
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  {}: {}", ENV_BOOT_LABEL, self.boot_label);
        println!("  {}: {}", ENV_PERSISTENCE_LABEL, self.persistence_label);
        if self.persistence_size_mb <= 0 {
            println!(
                "  {}: {} (all remaining space)",
                ENV_PERSISTENCE_SIZE_MB, self.persistence_size_mb
            );
        } else {
            println!("  {}: {}", ENV_PERSISTENCE_SIZE_MB, self.persistence_size_mb);
        }
        println!("  {}: {}", ENV_LOG, self.log);
        if self.sources.is_empty() {
            println!("  Config files: none found");
        } else {
            for source in &self.sources {
                println!("  Config file: {}", source.display());
            }
        }
    }
}
