//! HTTP Download Manager
//!
//! Resumable, cancellable transfer of the update package into a staging file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::error::{Result, UpdateError};

/// Share of the overall progress bar the transfer may fill
pub const TRANSFER_CEILING: f64 = 0.9;

/// Bookkeeping for one download, owned by the transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferState {
    pub url: String,
    pub staging_path: PathBuf,
    pub bytes_on_disk: u64,
    pub total_bytes: u64,
}

/// Download result with metadata
#[derive(Debug)]
pub struct DownloadResult {
    pub path: PathBuf,
    /// Bytes received during this call
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub resumed: bool,
}

/// Map transferred bytes onto the 0..=0.9 transfer band
pub fn transfer_progress(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 / total as f64).clamp(0.0, TRANSFER_CEILING)
}

/// Download manager for update packages
pub struct Downloader {
    client: reqwest::Client,
    chunk_size: usize,
    chunk_delay: Option<Duration>,
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            chunk_size: 32 * 1024,
            chunk_delay: None,
        }
    }

    /// Size of each write and cancellation-check step
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pause after every chunk (debug throttling)
    pub fn with_chunk_delay(mut self, delay: Option<Duration>) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Download `url` into `staging_path`, resuming from whatever is on disk.
    ///
    /// Bytes already written stay on disk on every failure, including
    /// cancellation, so calling this again with the same staging path resumes.
    pub async fn download<F>(
        &self,
        url: &str,
        staging_path: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<DownloadResult>
    where
        F: FnMut(f64),
    {
        if let Some(parent) = staging_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(staging_path)
            .await?;

        let mut state = TransferState {
            url: url.to_string(),
            staging_path: staging_path.to_path_buf(),
            bytes_on_disk: file.metadata().await?.len(),
            total_bytes: 0,
        };

        let mut request = self.client.get(url);
        if state.bytes_on_disk > 0 {
            request = request.header(RANGE, format!("bytes={}-", state.bytes_on_disk));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdateError::DownloadCancelled),
            response = request.send() => response?,
        };
        let declared = response.content_length();
        let resumed;

        match response.status() {
            StatusCode::OK => {
                // Range ignored, start over
                file.set_len(0).await?;
                file.seek(SeekFrom::Start(0)).await?;
                state.bytes_on_disk = 0;
                state.total_bytes = declared.unwrap_or(0);
                resumed = false;
            }
            StatusCode::PARTIAL_CONTENT => {
                let Some(remaining) = declared else {
                    return Err(UpdateError::SizeUnknown);
                };
                state.total_bytes = remaining + state.bytes_on_disk;
                file.seek(SeekFrom::Start(state.bytes_on_disk)).await?;
                resumed = state.bytes_on_disk > 0;

                if resumed && state.total_bytes == state.bytes_on_disk {
                    tracing::info!(path = %staging_path.display(), "staging file already complete");
                    on_progress(TRANSFER_CEILING);
                    return Ok(DownloadResult {
                        path: state.staging_path,
                        bytes_downloaded: 0,
                        total_bytes: state.total_bytes,
                        resumed,
                    });
                }
            }
            other => return Err(UpdateError::UnexpectedServerResponse(other.as_u16())),
        }

        if state.total_bytes == 0 {
            return Err(UpdateError::SizeUnknown);
        }

        tracing::info!(
            url,
            offset = state.bytes_on_disk,
            total = state.total_bytes,
            resumed,
            "downloading package"
        );

        let start = state.bytes_on_disk;
        let streamed = self
            .stream_body(response, &mut file, &mut state, cancel, &mut on_progress)
            .await;
        let flushed = file.flush().await;
        streamed?;
        flushed?;

        Ok(DownloadResult {
            path: state.staging_path,
            bytes_downloaded: state.bytes_on_disk - start,
            total_bytes: state.total_bytes,
            resumed,
        })
    }

    async fn stream_body<F>(
        &self,
        response: reqwest::Response,
        file: &mut File,
        state: &mut TransferState,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(f64),
    {
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let chunk = match next {
                None => {
                    tracing::info!(written = state.bytes_on_disk, "download cancelled while waiting for data");
                    return Err(UpdateError::DownloadCancelled);
                }
                Some(None) => break,
                Some(Some(chunk)) => chunk?,
            };
            for piece in chunk.chunks(self.chunk_size) {
                file.write_all(piece).await?;
                state.bytes_on_disk += piece.len() as u64;
                on_progress(transfer_progress(state.bytes_on_disk, state.total_bytes));

                if let Some(delay) = self.chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                if cancel.is_cancelled() {
                    tracing::info!(written = state.bytes_on_disk, "download cancelled");
                    return Err(UpdateError::DownloadCancelled);
                }
            }
            file.flush().await?;
        }

        Ok(())
    }
}
