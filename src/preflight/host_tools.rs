//! Host tool availability checks.

use std::path::PathBuf;

use crate::flash::Platform;

use super::types::{Check, Tool};

const SIMPLE_LINUX: &[Tool] = &[
    Tool::required("dd", "coreutils", "writes the image"),
    Tool::required("sync", "coreutils", "flushes writes"),
    Tool::required("mount", "util-linux", "lists mounted partitions"),
    Tool::required("umount", "util-linux", "unmounts the target"),
];

const SIMPLE_MACOS: &[Tool] = &[
    Tool::required("dd", "system", "writes the image"),
    Tool::required("diskutil", "system", "unmounts the target"),
];

const PERSISTENCE: &[Tool] = &[
    Tool::required("lsblk", "util-linux", "inspects the device"),
    Tool::required("blockdev", "util-linux", "reads the device size"),
    Tool::required("wipefs", "util-linux", "clears old signatures"),
    Tool::required("parted", "parted", "creates the partition table"),
    Tool::required("partprobe", "parted", "reloads the partition table"),
    Tool::required("mkfs.vfat", "dosfstools", "formats the boot partition"),
    Tool::required("mkfs.ext4", "e2fsprogs", "formats the persistence partition"),
    Tool::required("mount", "util-linux", "lays out the persistence partition"),
    Tool::optional("udevadm", "systemd-udev", "waits for partition nodes"),
];

/// Check host tools are installed.
pub fn host_tool_checks(persistence: bool) -> Vec<Check> {
    host_tool_checks_with(Platform::current(), persistence, |tool| which::which(tool).ok())
}

/// Like [`host_tool_checks`] with an explicit platform and lookup.
pub fn host_tool_checks_with(
    platform: Platform,
    persistence: bool,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Vec<Check> {
    let mut tools: Vec<Tool> = match platform {
        Platform::Linux => SIMPLE_LINUX.to_vec(),
        Platform::MacOs => SIMPLE_MACOS.to_vec(),
    };
    if persistence {
        for tool in PERSISTENCE {
            if !tools.iter().any(|t| t.name == tool.name) {
                tools.push(*tool);
            }
        }
    }

    let mut checks: Vec<Check> = tools
        .into_iter()
        .map(|tool| match lookup(tool.name) {
            Some(path) => Check::Found { tool, path },
            None => Check::Missing(tool),
        })
        .collect();

    if !persistence {
        checks.push(Check::PersistenceNotRequested);
    } else if platform == Platform::MacOs {
        checks.push(Check::PersistenceUnsupported);
    }
    checks
}
