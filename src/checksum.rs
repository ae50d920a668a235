//! SHA-256 integrity gate for the downloaded payload.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::fetch;

/// Compute the SHA-256 of a file as lowercase hex, reading in 1MB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that `path` hashes to `expected` (hex, any case).
///
/// On mismatch the file is deleted before the error is returned, so a
/// tampered payload never survives to be built from. Returns the actual
/// digest on success.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<String> {
    let expected = expected.trim().to_ascii_lowercase();
    let actual = sha256_file(path)?;

    if actual != expected {
        fetch::discard_artifact(path);
        return Err(PipelineError::Integrity {
            path: path.display().to_string(),
            expected,
            actual,
        });
    }

    tracing::info!(path = %path.display(), sha256 = %actual, "checksum verified");
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        fs::write(&path, "hello world").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), HELLO_WORLD);
    }

    #[test]
    fn test_sha256_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, "").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_accepts_uppercase_expected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        fs::write(&path, "hello world").unwrap();

        let actual = verify_sha256(&path, &HELLO_WORLD.to_uppercase()).unwrap();
        assert_eq!(actual, HELLO_WORLD);
        assert!(path.exists());
    }

    #[test]
    fn test_verify_mismatch_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        // One byte off from "hello world"
        fs::write(&path, "hello worle").unwrap();

        let err = verify_sha256(&path, HELLO_WORLD).unwrap_err();
        match err {
            PipelineError::Integrity {
                expected, actual, ..
            } => {
                assert_eq!(expected, HELLO_WORLD);
                assert_ne!(actual, HELLO_WORLD);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_verify_missing_file_is_io_error() {
        let err = verify_sha256(Path::new("/nonexistent/payload"), HELLO_WORLD).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
