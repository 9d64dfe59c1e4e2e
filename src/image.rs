//! Source image checks done before anything destructive.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{FlashError, Result};
use crate::events::EventSink;

/// Size of the image in bytes. Missing images are [`FlashError::ImageNotFound`].
pub fn image_size(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(FlashError::ImageNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FlashError::ImageNotFound(path.to_path_buf()))
        }
        Err(e) => Err(FlashError::Io(e)),
    }
}

/// Lowercase form of a user-supplied SHA256 digest.
///
/// Anything other than 64 hex digits (surrounding whitespace ignored) is a
/// [`FlashError::Parse`], so a typo is reported before the image is read.
pub fn parse_sha256(digest: &str) -> Result<String> {
    let hex = digest.trim().to_ascii_lowercase();
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FlashError::Parse {
            what: "SHA256 digest",
            input: digest.to_string(),
        });
    }
    Ok(hex)
}

/// Lowercase hex SHA256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlashError::ImageNotFound(path.to_path_buf()),
        _ => FlashError::Io(e),
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check the image against `expected` (hex, any case).
pub fn verify_sha256(sink: &dyn EventSink, path: &Path, expected: &str) -> Result<()> {
    let expected = parse_sha256(expected)?;
    let size_mb = image_size(path)? / 1024 / 1024;
    sink.info(
        "image",
        format!("Verifying SHA256 of {} ({} MB)", path.display(), size_mb),
    );

    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(FlashError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    sink.info("image", "Checksum OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_image_size() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 4096]).unwrap();
        file.flush().unwrap();
        assert_eq!(image_size(file.path()).unwrap(), 4096);
    }

    #[test]
    fn test_image_size_missing() {
        let err = image_size(Path::new("/nonexistent/usbfreedom.iso")).unwrap_err();
        assert!(matches!(err, FlashError::ImageNotFound(_)));
    }

    #[test]
    fn test_image_size_directory_is_not_an_image() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            image_size(dir.path()),
            Err(FlashError::ImageNotFound(_))
        ));
    }

    #[test]
    fn test_verify_sha256_valid() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        // SHA256 of "hello world"
        let expected = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(verify_sha256(&NullSink, file.path(), expected).is_ok());
    }

    #[test]
    fn test_verify_sha256_case_insensitive() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test").unwrap();
        file.flush().unwrap();

        let expected = "9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08";
        assert!(verify_sha256(&NullSink, file.path(), expected).is_ok());
    }

    #[test]
    fn test_verify_sha256_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let wrong = "0000000000000000000000000000000000000000000000000000000000000000";
        let err = verify_sha256(&NullSink, file.path(), wrong).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("Expected"));
        assert!(msg.contains("Actual"));
    }

    #[test]
    fn test_truncated_digest_is_rejected_before_hashing() {
        let err = verify_sha256(&NullSink, Path::new("/nonexistent/usbfreedom.iso"), "b94d27b9")
            .unwrap_err();
        assert!(matches!(err, FlashError::Parse { what: "SHA256 digest", .. }));
    }

    #[test]
    fn test_parse_sha256_trims_and_lowercases() {
        let upper = format!("  {}\n", "AB".repeat(32));
        assert_eq!(parse_sha256(&upper).unwrap(), "ab".repeat(32));
        assert!(parse_sha256(&"zz".repeat(32)).is_err());
        assert!(parse_sha256("").is_err());
    }

    #[test]
    fn test_sha256_file_of_empty_image() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(
            sha256_file(file.path()).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
