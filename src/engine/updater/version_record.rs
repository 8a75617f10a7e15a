//! Local Version Record
//!
//! The `ver.ini` file beside the installed binary, mirroring the manifest of
//! the last successful install.

use std::fs;
use std::io;
use std::path::Path;

use super::manifest::{key_values, VersionManifest};

/// Version reported when no record exists yet
pub const UNSET_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalVersionRecord {
    pub version: String,
    pub filename: String,
    pub digest: String,
    pub full_package_url: String,
}

impl LocalVersionRecord {
    /// Record used before the first install
    pub fn unset() -> Self {
        Self {
            version: UNSET_VERSION.to_string(),
            ..Self::default()
        }
    }

    /// Parse record text. Older records only carried `ver=`.
    pub fn parse(text: &str) -> Self {
        let mut record = Self::default();
        let mut legacy_version = None;

        for (key, value) in key_values(text) {
            match key {
                "version" => record.version = value.to_string(),
                "ver" => legacy_version = Some(value.to_string()),
                "filename" => record.filename = value.to_string(),
                "md5" => record.digest = value.to_string(),
                "fullpackage" => record.full_package_url = value.to_string(),
                _ => {}
            }
        }

        if record.version.is_empty() {
            record.version = legacy_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| UNSET_VERSION.to_string());
        }
        record
    }

    /// Load the record, treating a missing or unreadable file as unset
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => Self::parse(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no version record, treating as {}", UNSET_VERSION);
                Self::unset()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read version record");
                Self::unset()
            }
        }
    }

    /// Persist the manifest body as the new record, atomically
    pub fn save(manifest: &VersionManifest, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temp file first, then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &manifest.raw)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_record_is_unset() {
        let dir = tempdir().unwrap();
        let record = LocalVersionRecord::load(&dir.path().join("ver.ini"));
        assert_eq!(record.version, UNSET_VERSION);
    }

    #[test]
    fn test_legacy_record() {
        let record = LocalVersionRecord::parse("ver = 1.0.3\n");
        assert_eq!(record.version, "1.0.3");
    }

    #[test]
    fn test_record_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ver.ini");
        let manifest = VersionManifest::parse(
            b"version=1.2.0\nfilename=app.zip\nmd5=abc\nfullpackage=https://x/app.zip\n",
        )
        .unwrap();

        LocalVersionRecord::save(&manifest, &path).unwrap();

        let record = LocalVersionRecord::load(&path);
        assert_eq!(record.version, "1.2.0");
        assert_eq!(record.filename, "app.zip");
        assert_eq!(record.digest, "abc");
        assert_eq!(fs::read(&path).unwrap(), manifest.raw);
        assert!(!path.with_extension("tmp").exists());
    }
}
