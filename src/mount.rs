//! Scoped temporary mounts and mount-table parsing.

use std::path::Path;
use tempfile::TempDir;

use crate::error::Result;
use crate::process::{Cmd, Host};
use crate::step::{best_effort, Warning};

/// A partition mounted on a fresh temporary directory.
///
/// Dropping the guard runs `umount` on the directory and then removes the
/// directory, whichever way the owning scope exits. If `umount` fails the
/// directory is left in place and logged as a stale mount point.
pub struct ScopedMount<'a> {
    host: Host<'a>,
    device: String,
    dir: Option<TempDir>,
}

impl<'a> ScopedMount<'a> {
    /// Mount `device` on a new temporary directory.
    ///
    /// If `mount` fails the directory is removed before the error returns.
    pub fn new(host: Host<'a>, device: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("usbfreedom-mnt-").tempdir()?;

        host.sink.info(
            "mount",
            format!("Mounting {} to {}", device, dir.path().display()),
        );
        Cmd::new("mount")
            .arg(device)
            .arg_path(dir.path())
            .run(host)?;

        Ok(Self {
            host,
            device: device.to_string(),
            dir: Some(dir),
        })
    }

    /// Where the partition is mounted.
    pub fn path(&self) -> &Path {
        match self.dir {
            Some(ref dir) => dir.path(),
            None => Path::new(""),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for ScopedMount<'_> {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let unmounted = Cmd::new("umount")
            .arg_path(dir.path())
            .allow_fail()
            .run(self.host);
        let failure = match unmounted {
            Ok(result) if result.success() => None,
            Ok(result) => Some(format!(
                "umount {} exited with {}: {}",
                dir.path().display(),
                result.code(),
                result.stderr_trimmed()
            )),
            Err(e) => Some(format!("umount {} failed: {}", dir.path().display(), e)),
        };

        if let Some(msg) = failure {
            // Still mounted: removing the directory would recurse into the partition.
            self.host.sink.warn("mount", msg);
            let stale = dir.keep();
            self.host.sink.warn(
                "mount",
                format!("Leaving {} in place, it may still be mounted", stale.display()),
            );
            return;
        }

        if let Err(e) = dir.close() {
            self.host
                .sink
                .warn("mount", format!("Failed to remove mount directory: {}", e));
        }
    }
}

/// Unmount every mounted source that belongs to `device`.
///
/// Best-effort: each failure comes back as a [`Warning`].
pub fn unmount_device(host: Host<'_>, device: &str) -> Vec<Warning> {
    let mut warnings = Vec::new();

    let listed = best_effort(host.sink, "list mounts", || host.run("mount", [] as [&str; 0]));
    let mount_output = match listed {
        Ok(r) => r.stdout,
        Err(w) => {
            warnings.push(w);
            return warnings;
        }
    };

    for source in mounted_sources(&mount_output, device) {
        host.sink.info("mount", format!("Unmounting {}", source));
        let step = format!("umount {}", source);
        if let Err(w) = best_effort(host.sink, &step, || host.run("umount", [source.as_str()])) {
            warnings.push(w);
        }
    }

    warnings
}

/// Mount sources from `mount` output whose line references `device`.
///
/// Matches are substring matches on the whole line, so `/dev/sdb` also
/// picks up `/dev/sdb1` and `/dev/sdb2`.
pub fn mounted_sources(mount_output: &str, device: &str) -> Vec<String> {
    mount_output
        .lines()
        .filter(|line| line.contains(device))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
