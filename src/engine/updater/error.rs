//! Update Error Types

use std::io;
use thiserror::Error;

use super::state::ExitStatus;
use crate::engine::config::ConfigError;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Invalid version manifest: {0}")]
    ManifestInvalid(String),

    #[error("Version manifest unreachable after {attempts} attempts: {source}")]
    ManifestUnreachable {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected server response: HTTP {0}")]
    UnexpectedServerResponse(u16),

    #[error("Server did not report a download size")]
    SizeUnknown,

    #[error("Download cancelled by user")]
    DownloadCancelled,

    #[error("Transfer error: {0}")]
    Transfer(#[from] reqwest::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Failed to extract {entry}: {reason}")]
    Extraction { entry: String, reason: String },

    #[error("Failed to replace executable: {0}")]
    Replacement(String),

    #[error("Failed to write version record: {0}")]
    Persistence(#[source] io::Error),

    #[error("Scratch directory is locked by running updater (PID {pid})")]
    Locked { pid: u32 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl UpdateError {
    /// Map the error onto the process exit contract
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::DownloadCancelled => ExitStatus::Cancelled,
            _ => ExitStatus::Error,
        }
    }

    /// Short machine-friendly name, used for the `Failed` phase
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ManifestInvalid(_) => "manifest_invalid",
            Self::ManifestUnreachable { .. } => "manifest_unreachable",
            Self::UnexpectedServerResponse(_) => "unexpected_server_response",
            Self::SizeUnknown => "size_unknown",
            Self::DownloadCancelled => "download_cancelled",
            Self::Transfer(_) => "transfer",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::Extraction { .. } => "extraction",
            Self::Replacement(_) => "replacement",
            Self::Persistence(_) => "persistence",
            Self::Locked { .. } => "locked",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether this failure happened while putting files in place
    pub fn is_install_failure(&self) -> bool {
        matches!(self, Self::Extraction { .. } | Self::Replacement(_))
    }

    pub(crate) fn extraction(entry: impl Into<String>, reason: impl ToString) -> Self {
        Self::Extraction {
            entry: entry.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_classification() {
        assert_eq!(UpdateError::DownloadCancelled.exit_status(), ExitStatus::Cancelled);
        assert_eq!(UpdateError::SizeUnknown.exit_status(), ExitStatus::Error);
        assert_eq!(
            UpdateError::ManifestInvalid("missing md5".into()).exit_status(),
            ExitStatus::Error
        );
    }

    #[test]
    fn test_extraction_message_names_entry() {
        let err = UpdateError::extraction("bin/app", "disk full");
        assert_eq!(err.to_string(), "Failed to extract bin/app: disk full");
        assert!(err.is_install_failure());
        assert_eq!(err.kind(), "extraction");
    }
}
