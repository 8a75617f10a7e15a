//! Shared fixtures for session tests

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use autoupdate_lib::engine::config::UpdaterConfig;
use autoupdate_lib::engine::ui::UpdateUi;
use autoupdate_lib::engine::updater::install::{ArchiveInstaller, PackageInstaller};
use autoupdate_lib::engine::updater::UpdateError;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};
use zip::write::SimpleFileOptions;

/// Serves `bytes=N-` ranges the way the debug server does
pub struct RangeResponder(pub Vec<u8>);

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let start = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.trim_end_matches('-').parse::<usize>().ok());
        match start {
            Some(start) => ResponseTemplate::new(206)
                .set_body_bytes(self.0[start.min(self.0.len())..].to_vec()),
            None => ResponseTemplate::new(200).set_body_bytes(self.0.clone()),
        }
    }
}

/// Records every collaborator call
#[derive(Default)]
pub struct RecordingUi {
    pub answer: bool,
    pub cancelled: AtomicBool,
    pub confirmations: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<f64>>,
    pub errors: Mutex<Vec<String>>,
    pub completed: AtomicBool,
    /// Raise the cancel flag on the first progress report
    pub cancel_on_progress: bool,
    /// Raise the cancel flag while the prompt is open
    pub interrupt_prompt: bool,
    /// Progress reports seen before the cancel flag went up
    pub progress_before_cancel: AtomicUsize,
    pub logs: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            answer: true,
            ..Self::default()
        })
    }

    pub fn declining() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Accepts, then cancels once the download is under way
    pub fn cancelling() -> Arc<Self> {
        Arc::new(Self {
            answer: true,
            cancel_on_progress: true,
            ..Self::default()
        })
    }

    /// Cancel flag already raised before anything runs
    pub fn interrupted() -> Arc<Self> {
        Arc::new(Self {
            answer: true,
            cancelled: AtomicBool::new(true),
            ..Self::default()
        })
    }

    /// Accepts, but the user hits Ctrl-C while the prompt is still open
    pub fn interrupting_prompt() -> Arc<Self> {
        Arc::new(Self {
            answer: true,
            interrupt_prompt: true,
            ..Self::default()
        })
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl UpdateUi for RecordingUi {
    fn confirm(&self, message: &str) -> bool {
        self.confirmations.lock().unwrap().push(message.to_string());
        if self.interrupt_prompt {
            self.cancelled.store(true, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(300));
        }
        self.answer
    }

    fn report_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn report_progress(&self, fraction: f64) {
        let mut progress = self.progress.lock().unwrap();
        progress.push(fraction);
        if self.cancel_on_progress && !self.cancelled.swap(true, Ordering::SeqCst) {
            self.progress_before_cancel
                .store(progress.len(), Ordering::SeqCst);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn report_log(&self, line: &str) {
        self.logs.lock().unwrap().push(line.to_string());
    }

    fn notify_complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }
}

/// Archive installer that counts invocations
#[derive(Default)]
pub struct CountingInstaller {
    pub calls: AtomicUsize,
}

impl PackageInstaller for CountingInstaller {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn install(&self, package: &Path, destination_root: &Path) -> Result<(), UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ArchiveInstaller.install(package, destination_root)
    }
}

/// A small package with a binary and a nested asset
pub fn package_bytes() -> Vec<u8> {
    package_with_app(8192)
}

/// Same layout, with an `app` binary of `app_len` bytes
pub fn package_with_app(app_len: usize) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o755);
    writer.start_file("app", options).unwrap();
    writer.write_all(&vec![b'x'; app_len]).unwrap();
    writer.add_directory("assets/", options).unwrap();
    writer
        .start_file("assets/readme.txt", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"release 1.2.0").unwrap();
    writer.finish().unwrap().into_inner()
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

pub fn manifest_body(version: &str, digest: &str) -> String {
    format!(
        "version={}\nfilename=app.zip\nmd5={}\nfullpackage=https://downloads.example.com/app-setup.zip\n",
        version, digest
    )
}

pub fn test_config(server: &MockServer, install_dir: &Path) -> UpdaterConfig {
    UpdaterConfig {
        app_name: "Widget".to_string(),
        manifest_url: format!("{}/ver.ini", server.uri()),
        package_url: format!("{}/releases/{{version}}/{{filename}}", server.uri()),
        install_dir: Some(install_dir.to_path_buf()),
        chunk_size: 1024,
        retry_delay_ms: 10,
        ..UpdaterConfig::default()
    }
}
