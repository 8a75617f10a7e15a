//! Integrity Verification
//!
//! MD5 digest of the staged package, matching the manifest format. This only
//! guards against transfer corruption, not tampering.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::error::{Result, UpdateError};

/// Calculate the lowercase hex MD5 of a file
pub fn calculate_md5(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut context = md5::Context::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(hex::encode(context.compute().0))
}

/// Whether the file at `path` hashes to `expected`
pub fn verify(path: &Path, expected: &str) -> io::Result<bool> {
    Ok(calculate_md5(path)?.eq_ignore_ascii_case(expected.trim()))
}

/// Like [`verify`], but reports both digests on mismatch
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = calculate_md5(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(UpdateError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[test]
    fn test_md5_calculation() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        assert_eq!(calculate_md5(file.path()).unwrap(), HELLO_MD5);
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        assert!(verify(file.path(), &HELLO_MD5.to_uppercase()).unwrap());
        assert!(!verify(file.path(), "d41d8cd98f00b204e9800998ecf8427e").unwrap());
    }

    #[test]
    fn test_checksum_verification_failure_keeps_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let result = verify_checksum(file.path(), "wrongchecksum");
        assert!(matches!(result, Err(UpdateError::ChecksumMismatch { .. })));
        assert!(file.path().exists());
    }
}
