//! Error types for the provisioning pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Partition sizing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizingError {
    #[error("boot partition size must be greater than zero")]
    ZeroBootSize,

    #[error("invalid persistence size {0} MB (use -1 for all remaining space)")]
    InvalidPersistenceSize(i64),

    #[error("partition size {0} MB overflows a 64-bit byte count")]
    Overflow(u64),

    #[error(
        "device too small: {total} bytes available, {required} bytes needed for boot partition and safety buffer"
    )]
    InsufficientSpace { total: u64, required: u64 },
}

/// Errors surfaced by the provisioning pipeline.
#[derive(Error, Debug)]
pub enum FlashError {
    #[error("not a block device: {0}")]
    InvalidDevice(String),

    #[error("image file not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("target device not found: {0}")]
    DeviceNotFound(String),

    #[error("{}", command_failed_message(.program, .args, .code, .stderr))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: i32,
        stderr: String,
    },

    #[error("failed to execute '{program}'. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {what}: {input:?}")]
    Parse { what: &'static str, input: String },

    #[error(transparent)]
    Sizing(#[from] SizingError),

    #[error("partition {number} did not appear at {path}")]
    PartitionMissing { number: u32, path: String },

    #[error("checksum mismatch for {}\n  Expected: {expected}\n  Actual:   {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to set up persistence structure on {0}")]
    PersistenceSetupFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn command_failed_message(program: &str, args: &[String], code: &i32, stderr: &str) -> String {
    let stderr = stderr.trim();
    let cmdline = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };
    if stderr.is_empty() {
        format!("'{}' failed (exit code {})", cmdline, code)
    } else {
        format!("'{}' failed (exit code {}):\n{}", cmdline, code, stderr)
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, FlashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_includes_stderr() {
        let err = FlashError::CommandFailed {
            program: "parted".into(),
            args: vec!["-s".into(), "/dev/sdb".into(), "mklabel".into(), "gpt".into()],
            code: 1,
            stderr: "Error: Partition(s) on /dev/sdb are being used.\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("parted -s /dev/sdb mklabel gpt"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("being used"));
    }

    #[test]
    fn test_command_failed_without_stderr() {
        let err = FlashError::CommandFailed {
            program: "sync".into(),
            args: vec![],
            code: 2,
            stderr: "   ".into(),
        };
        assert_eq!(err.to_string(), "'sync' failed (exit code 2)");
    }

    #[test]
    fn test_sizing_converts() {
        let err: FlashError = SizingError::ZeroBootSize.into();
        assert!(matches!(err, FlashError::Sizing(SizingError::ZeroBootSize)));
    }
}
