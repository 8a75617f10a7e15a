//! Version Manifest
//!
//! Fetches and parses the remote `key=value` version descriptor.

use std::time::Duration;

use super::error::{Result, UpdateError};

/// Remote version descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct VersionManifest {
    pub version: String,
    pub filename: String,
    /// Lowercase hex MD5 of the package
    pub digest: String,
    /// Human-facing full installer URL
    pub full_package_url: String,
    /// Body exactly as served, persisted as the local record on success
    pub raw: Vec<u8>,
}

impl VersionManifest {
    /// Parse a manifest body.
    ///
    /// Keys are order-insensitive; unknown keys and lines without `=` are
    /// ignored. All four recognised fields must be present and non-empty.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw);
        let mut version = String::new();
        let mut filename = String::new();
        let mut digest = String::new();
        let mut full_package_url = String::new();

        for (key, value) in key_values(&text) {
            match key {
                "version" => version = value.to_string(),
                "filename" => filename = value.to_string(),
                "md5" => digest = value.to_lowercase(),
                "fullpackage" => full_package_url = value.to_string(),
                _ => {}
            }
        }

        let missing: Vec<&str> = [
            ("version", &version),
            ("filename", &filename),
            ("md5", &digest),
            ("fullpackage", &full_package_url),
        ]
        .iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| *k)
        .collect();

        if !missing.is_empty() {
            return Err(UpdateError::ManifestInvalid(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            version,
            filename,
            digest,
            full_package_url,
            raw: raw.to_vec(),
        })
    }
}

/// Split flat `key=value` text into trimmed pairs
pub(crate) fn key_values(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let (key, value) = line.split_once('=')?;
        Some((key.trim(), value.trim()))
    })
}

/// Fetches the manifest, retrying transport failures
pub struct ManifestFetcher {
    client: reqwest::Client,
    attempts: u32,
    retry_delay: Duration,
    timeout: Option<Duration>,
}

impl ManifestFetcher {
    pub fn new(client: reqwest::Client, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client,
            attempts: attempts.max(1),
            retry_delay,
            timeout: None,
        }
    }

    /// Per-attempt request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fetch and parse the manifest at `url`.
    ///
    /// Only network-level failures (including non-success HTTP statuses) are
    /// retried. A body that parses but misses fields fails immediately.
    pub async fn fetch(&self, url: &str) -> Result<VersionManifest> {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            tracing::debug!(url, attempt, "fetching version manifest");
            match self.get_body(url).await {
                Ok(body) => return VersionManifest::parse(&body),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "manifest fetch failed");
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        match last_error {
            Some(source) => Err(UpdateError::ManifestUnreachable {
                attempts: self.attempts,
                source,
            }),
            None => Err(UpdateError::Unknown("manifest fetch made no attempts".into())),
        }
    }

    async fn get_body(&self, url: &str) -> std::result::Result<Vec<u8>, reqwest::Error> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
