//! Host-OS differences in how a whole device is unmounted and written.

use serde::Serialize;

use crate::mount;
use crate::process::{Cmd, Host};
use crate::step::{best_effort, Warning};

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    /// The platform this binary was built for. Anything that is not macOS is
    /// treated as Linux.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// `dd` block size.
    pub fn dd_block_size(self) -> &'static str {
        match self {
            Platform::Linux => "4M",
            Platform::MacOs => "1m",
        }
    }

    /// `dd` conv flag.
    pub fn dd_conv(self) -> &'static str {
        match self {
            Platform::Linux => "fsync",
            Platform::MacOs => "sync",
        }
    }

    /// Unmount every volume on `device`. Best-effort.
    ///
    /// Linux walks the mount table and unmounts each partition; macOS hands
    /// the whole disk to `diskutil unmountDisk`.
    pub fn unmount_device(self, host: Host<'_>, device: &str) -> Vec<Warning> {
        match self {
            Platform::Linux => mount::unmount_device(host, device),
            Platform::MacOs => best_effort(host.sink, "diskutil unmountDisk", || {
                host.run("diskutil", ["unmountDisk", device])
            })
            .err()
            .into_iter()
            .collect(),
        }
    }

    /// Whether a separate `sync` is needed after `dd` returns.
    pub fn sync_after_write(self) -> bool {
        matches!(self, Platform::Linux)
    }

    /// Streaming raw copy of `image` onto `target` with progress output.
    pub fn dd_cmd(self, image: &str, target: &str) -> Cmd {
        Cmd::new("dd")
            .arg(format!("if={}", image))
            .arg(format!("of={}", target))
            .arg(format!("bs={}", self.dd_block_size()))
            .arg("status=progress")
            .arg(format!("conv={}", self.dd_conv()))
            .stream_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_dd() {
        let cmd = Platform::Linux.dd_cmd("/tmp/live.iso", "/dev/sdb");
        assert_eq!(
            cmd.argv(),
            vec![
                "dd",
                "if=/tmp/live.iso",
                "of=/dev/sdb",
                "bs=4M",
                "status=progress",
                "conv=fsync"
            ]
        );
        assert!(cmd.is_streaming());
        assert!(cmd.is_checked());
    }

    #[test]
    fn test_macos_dd() {
        let cmd = Platform::MacOs.dd_cmd("live.iso", "/dev/disk4");
        assert!(cmd.get_args().contains(&"bs=1m".to_string()));
        assert!(cmd.get_args().contains(&"conv=sync".to_string()));
        assert!(!Platform::MacOs.sync_after_write());
    }
}
