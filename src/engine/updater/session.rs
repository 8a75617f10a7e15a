//! Update Session
//!
//! Orchestrates one update attempt: check the manifest, confirm, then run
//! download, verify and install on a background task while the foreground
//! forwards progress and watches for cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::download::Downloader;
use super::error::{Result, UpdateError};
use super::install::{ArchiveInstaller, ExecutableReplacer, PackageInstaller};
use super::manifest::{ManifestFetcher, VersionManifest};
use super::state::{ExitStatus, SessionOutcome, SessionPhase, SessionState};
use super::verify;
use super::version_record::LocalVersionRecord;
use crate::engine::config::{InstallMode, UpdaterConfig};
use crate::engine::locks::{LockError, StagingLock};
use crate::engine::ui::UpdateUi;

/// How often the foreground asks the UI whether the user cancelled
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Messages from the background pipeline to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(f64),
    Verifying,
    Installing,
}

pub struct UpdateSession {
    config: UpdaterConfig,
    ui: Arc<dyn UpdateUi>,
    installer: Arc<dyn PackageInstaller>,
    client: reqwest::Client,
    install_dir: PathBuf,
    scratch_dir: PathBuf,
    version_file: PathBuf,
    current: LocalVersionRecord,
    target: Option<VersionManifest>,
    state: SessionState,
}

impl UpdateSession {
    /// Resolve paths, pick the installer for the configured mode and read
    /// the local version record
    pub fn new(config: UpdaterConfig, ui: Arc<dyn UpdateUi>) -> Result<Self> {
        let install_dir = config.install_dir()?;
        let scratch_dir = config.scratch_dir()?;
        let version_file = config.version_file_path()?;

        let installer: Arc<dyn PackageInstaller> = match config.install_mode {
            InstallMode::Archive => Arc::new(ArchiveInstaller),
            InstallMode::Executable => Arc::new(ExecutableReplacer::new(config.executable_path()?)),
        };

        let client = reqwest::Client::builder()
            .user_agent(format!("{}-Updater", config.app_name))
            .connect_timeout(config.request_timeout())
            .build()?;

        let current = LocalVersionRecord::load(&version_file);
        tracing::info!(version = %current.version, "current version");
        let state = SessionState::new(current.version.clone());

        Ok(Self {
            config,
            ui,
            installer,
            client,
            install_dir,
            scratch_dir,
            version_file,
            current,
            target: None,
            state,
        })
    }

    /// Replace the installer chosen from the config
    pub fn with_installer(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_version(&self) -> &LocalVersionRecord {
        &self.current
    }

    /// Manifest fetched by this attempt, once known
    pub fn target(&self) -> Option<&VersionManifest> {
        self.target.as_ref()
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.state
            .result
            .as_ref()
            .map(SessionOutcome::exit_status)
            .unwrap_or(ExitStatus::Error)
    }

    /// Run the attempt to completion
    pub async fn run(&mut self) -> SessionOutcome {
        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err(UpdateError::DownloadCancelled) => {
                self.state.mark_cancel_requested();
                SessionOutcome::Cancelled
            }
            Err(e) => self.fail(e),
        };
        tracing::info!(outcome = ?outcome, "update session finished");
        self.state.finish(outcome.clone());
        outcome
    }

    async fn drive(&mut self) -> Result<SessionOutcome> {
        self.state.start_checking();
        let manifest = ManifestFetcher::new(
            self.client.clone(),
            self.config.manifest_retries,
            self.config.retry_delay(),
        )
        .with_timeout(self.config.request_timeout())
        .fetch(&self.config.manifest_url())
        .await?;
        self.state.set_target(&manifest.version);
        self.target = Some(manifest.clone());

        if manifest.version == self.current.version {
            tracing::info!(version = %manifest.version, "already up to date");
            return Ok(SessionOutcome::UpToDate);
        }
        if self.config.skip_version.as_deref() == Some(manifest.version.as_str()) {
            tracing::info!(version = %manifest.version, "version skipped by configuration");
            return Ok(SessionOutcome::Skipped {
                version: manifest.version,
            });
        }

        if !self.config.silent {
            self.state.await_confirmation();
            let message = format!(
                "New version found: {}\nCurrent version: {}\nUpdate now?",
                manifest.version, self.current.version
            );
            if !self.confirm(message).await? {
                tracing::info!("update declined");
                return Ok(SessionOutcome::Declined);
            }
        }

        let _lock = StagingLock::acquire(&self.scratch_dir, Some(&manifest.version)).map_err(
            |e| match e {
                LockError::AlreadyLocked { pid } => UpdateError::Locked { pid },
                LockError::IoError(e) => UpdateError::Io(e),
            },
        )?;

        let staging_path = staging_path(&self.scratch_dir, &manifest.filename)?;
        self.install_package(&manifest, &staging_path).await?;

        let persistence_error = match LocalVersionRecord::save(&manifest, &self.version_file) {
            Ok(()) => None,
            Err(e) => {
                let err = UpdateError::Persistence(e);
                tracing::warn!(error = %err, "installed, but version record was not updated");
                Some(err.to_string())
            }
        };

        if let Err(e) = std::fs::remove_file(&staging_path) {
            tracing::debug!(error = %e, "could not remove staging file");
        }
        self.ui.notify_complete();

        Ok(SessionOutcome::Installed {
            version: manifest.version,
            persistence_error,
        })
    }

    /// Ask the UI on a blocking thread. An interrupt raised before or while
    /// the prompt is open counts as a decline.
    async fn confirm(&self, message: String) -> Result<bool> {
        if self.ui.is_cancelled() {
            tracing::info!("interrupted before confirmation");
            return Ok(false);
        }

        let ui = self.ui.clone();
        let mut answer = tokio::task::spawn_blocking(move || ui.confirm(&message));
        let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
        loop {
            tokio::select! {
                joined = &mut answer => {
                    let accepted = joined.map_err(|e| {
                        UpdateError::Unknown(format!("confirmation task failed: {}", e))
                    })?;
                    return Ok(accepted && !self.ui.is_cancelled());
                }
                _ = ticker.tick() => {
                    if self.ui.is_cancelled() {
                        tracing::info!("interrupted at confirmation prompt");
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Spawn the pipeline and pump its events until it finishes
    async fn install_package(&mut self, manifest: &VersionManifest, staging_path: &Path) -> Result<()> {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let pipeline = Pipeline {
            downloader: Downloader::new(self.client.clone())
                .with_chunk_size(self.config.chunk_size())
                .with_chunk_delay(self.config.chunk_delay()),
            installer: self.installer.clone(),
            ui: self.ui.clone(),
            url: self
                .config
                .package_url(&manifest.version, &manifest.filename),
            staging_path: staging_path.to_path_buf(),
            install_dir: self.install_dir.clone(),
            digest: manifest.digest.clone(),
            cancel: cancel.clone(),
            events,
        };

        self.state.start_downloading();
        let handle = tokio::spawn(pipeline.run());

        let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(PipelineEvent::Progress(fraction)) => {
                        self.state.update_progress(fraction);
                        self.ui.report_progress(fraction);
                        self.poll_cancel(&cancel);
                    }
                    Some(PipelineEvent::Verifying) => self.state.start_verifying(),
                    Some(PipelineEvent::Installing) => self.state.start_installing(),
                    None => break,
                },
                _ = ticker.tick() => self.poll_cancel(&cancel),
            }
        }

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(UpdateError::Unknown(format!("update task failed: {}", e))),
        }
    }

    /// Verification and install are never interrupted
    fn poll_cancel(&mut self, cancel: &CancellationToken) {
        if self.state.cancelled || !matches!(self.state.phase, SessionPhase::Downloading { .. }) {
            return;
        }
        if cancel.is_cancelled() || self.ui.is_cancelled() {
            tracing::info!("cancellation requested");
            self.state.mark_cancel_requested();
            cancel.cancel();
        }
    }

    fn fail(&self, error: UpdateError) -> SessionOutcome {
        tracing::error!(error = %error, "update failed");
        let mut message = error.to_string();
        if let (true, Some(target)) = (error.is_install_failure(), &self.target) {
            message.push_str(&format!(
                "\nThe full installer is available at {}",
                target.full_package_url
            ));
        }
        self.ui.report_error(&message);
        SessionOutcome::Failed {
            kind: error.kind().to_string(),
            message,
        }
    }
}

/// Staging file for `filename` inside the scratch directory
fn staging_path(scratch_dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .filter(|n| n.len() == filename.len())
        .ok_or_else(|| {
            UpdateError::ManifestInvalid(format!("filename {:?} is not a plain file name", filename))
        })?;
    Ok(scratch_dir.join(name))
}

/// Download, verify and install, owned by the background task
struct Pipeline {
    downloader: Downloader,
    installer: Arc<dyn PackageInstaller>,
    ui: Arc<dyn UpdateUi>,
    url: String,
    staging_path: PathBuf,
    install_dir: PathBuf,
    digest: String,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl Pipeline {
    async fn run(self) -> Result<()> {
        let events = self.events.clone();
        let ui = self.ui.clone();
        let cancel = self.cancel.clone();
        // The UI flag is read after every chunk, so the transfer stops on
        // the chunk that observes it
        self.downloader
            .download(&self.url, &self.staging_path, &self.cancel, |fraction| {
                let _ = events.send(PipelineEvent::Progress(fraction));
                if !cancel.is_cancelled() && ui.is_cancelled() {
                    cancel.cancel();
                }
            })
            .await?;

        let _ = self.events.send(PipelineEvent::Verifying);
        let staging = self.staging_path.clone();
        let digest = self.digest.clone();
        let verified = tokio::task::spawn_blocking(move || verify::verify_checksum(&staging, &digest))
            .await
            .map_err(|e| UpdateError::Unknown(format!("verification task failed: {}", e)))?;
        if let Err(e) = verified {
            if matches!(e, UpdateError::ChecksumMismatch { .. }) {
                tracing::warn!(path = %self.staging_path.display(), "checksum mismatch, discarding staging file");
                let _ = std::fs::remove_file(&self.staging_path);
            }
            return Err(e);
        }

        let _ = self.events.send(PipelineEvent::Installing);
        tracing::info!(installer = self.installer.name(), root = %self.install_dir.display(), "installing package");
        let installer = self.installer.clone();
        let staging = self.staging_path.clone();
        let root = self.install_dir.clone();
        tokio::task::spawn_blocking(move || installer.install(&staging, &root))
            .await
            .map_err(|e| UpdateError::Unknown(format!("install task failed: {}", e)))??;

        let _ = self.events.send(PipelineEvent::Progress(1.0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_rejects_traversal() {
        let scratch = Path::new("/opt/app/tmp");
        assert_eq!(
            staging_path(scratch, "app.zip").unwrap(),
            PathBuf::from("/opt/app/tmp/app.zip")
        );
        assert!(staging_path(scratch, "../app.zip").is_err());
        assert!(staging_path(scratch, "sub/app.zip").is_err());
        assert!(staging_path(scratch, "..").is_err());
    }
}
