//! Autoupdate Configuration Module
//! Handles loading and validating updater.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/{owner}/{repo}/main/ver.ini";
pub const DEFAULT_PACKAGE_URL: &str =
    "https://github.com/{owner}/{repo}/releases/download/{version}/{filename}";

/// Local endpoint every request is routed to in debug mode
pub const DEBUG_SERVER: (&str, u16) = ("127.0.0.1", 9808);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Could not determine install directory: {0}")]
    NoInstallDir(String),
}

/// How the verified package is put in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Extract every archive entry over the install directory
    #[default]
    Archive,
    /// Swap only the running executable
    Executable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
    #[serde(default = "default_package_url")]
    pub package_url: String,
    /// Defaults to the running binary's directory
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    /// Defaults to `<install_dir>/tmp`
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default = "default_version_file")]
    pub version_file: String,
    #[serde(default)]
    pub install_mode: InstallMode,
    /// Executable to replace in `executable` mode, defaults to the running one
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub skip_version: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_manifest_retries")]
    pub manifest_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_app_name() -> String {
    "Updater".to_string()
}

fn default_manifest_url() -> String {
    DEFAULT_MANIFEST_URL.to_string()
}

fn default_package_url() -> String {
    DEFAULT_PACKAGE_URL.to_string()
}

fn default_version_file() -> String {
    "ver.ini".to_string()
}

fn default_chunk_size() -> usize {
    32 * 1024
}

fn default_request_timeout() -> u64 {
    30
}

fn default_manifest_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            owner: String::new(),
            repo: String::new(),
            manifest_url: default_manifest_url(),
            package_url: default_package_url(),
            install_dir: None,
            scratch_dir: None,
            version_file: default_version_file(),
            install_mode: InstallMode::default(),
            executable: None,
            silent: false,
            debug: false,
            skip_version: None,
            chunk_size: default_chunk_size(),
            request_timeout_secs: default_request_timeout(),
            manifest_retries: default_manifest_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl UpdaterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: UpdaterConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Manifest URL with addressing parameters filled in
    pub fn manifest_url(&self) -> String {
        self.resolve_url(&self.render(&self.manifest_url, "", ""))
    }

    /// Package URL for a target version
    pub fn package_url(&self, version: &str, filename: &str) -> String {
        self.resolve_url(&self.render(&self.package_url, version, filename))
    }

    fn render(&self, template: &str, version: &str, filename: &str) -> String {
        template
            .replace("{owner}", &self.owner)
            .replace("{repo}", &self.repo)
            .replace("{app}", &self.app_name)
            .replace("{version}", version)
            .replace("{filename}", filename)
    }

    /// In debug mode, point the URL at the local debug server
    pub fn resolve_url(&self, url: &str) -> String {
        if !self.debug {
            return url.to_string();
        }
        match reqwest::Url::parse(url) {
            Ok(mut parsed) => {
                let (host, port) = DEBUG_SERVER;
                let rewritten = parsed.set_scheme("http").is_ok()
                    && parsed.set_host(Some(host)).is_ok()
                    && parsed.set_port(Some(port)).is_ok();
                if rewritten {
                    parsed.to_string()
                } else {
                    url.to_string()
                }
            }
            Err(_) => url.to_string(),
        }
    }

    pub fn install_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.install_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().map_err(|e| ConfigError::NoInstallDir(e.to_string()))?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::NoInstallDir(exe.display().to_string()))
    }

    pub fn scratch_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.scratch_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.install_dir()?.join("tmp")),
        }
    }

    pub fn version_file_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.install_dir()?.join(&self.version_file))
    }

    pub fn executable_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(|e| ConfigError::NoInstallDir(e.to_string())),
        }
    }

    /// Debug mode streams one byte at a time
    pub fn chunk_size(&self) -> usize {
        if self.debug {
            1
        } else {
            self.chunk_size.max(1)
        }
    }

    pub fn chunk_delay(&self) -> Option<Duration> {
        self.debug.then(|| Duration::from_millis(100))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> UpdaterConfig {
        UpdaterConfig {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            ..UpdaterConfig::default()
        }
    }

    #[test]
    fn test_url_templates() {
        let config = sample();
        assert_eq!(
            config.manifest_url(),
            "https://raw.githubusercontent.com/acme/widget/main/ver.ini"
        );
        assert_eq!(
            config.package_url("1.2.0", "app.zip"),
            "https://github.com/acme/widget/releases/download/1.2.0/app.zip"
        );
    }

    #[test]
    fn test_debug_mode_routes_to_local_server() {
        let config = UpdaterConfig {
            debug: true,
            ..sample()
        };
        assert_eq!(
            config.package_url("1.2.0", "app.zip"),
            "http://127.0.0.1:9808/acme/widget/releases/download/1.2.0/app.zip"
        );
        assert_eq!(config.chunk_size(), 1);
        assert_eq!(config.chunk_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_config_round_trip_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("updater.config.json");
        std::fs::write(&path, r#"{"app_name":"Widget","install_mode":"executable"}"#).unwrap();

        let config = UpdaterConfig::load(&path).unwrap();
        assert_eq!(config.app_name, "Widget");
        assert_eq!(config.install_mode, InstallMode::Executable);
        assert_eq!(config.manifest_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.version_file, "ver.ini");

        config.save(&path).unwrap();
        assert_eq!(UpdaterConfig::load(&path).unwrap().app_name, "Widget");
    }

    #[test]
    fn test_missing_config() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            UpdaterConfig::load(&dir.path().join("nope.json")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_scratch_dir_defaults_under_install_dir() {
        let config = UpdaterConfig {
            install_dir: Some(PathBuf::from("/opt/widget")),
            ..sample()
        };
        assert_eq!(config.scratch_dir().unwrap(), PathBuf::from("/opt/widget/tmp"));
        assert_eq!(
            config.version_file_path().unwrap(),
            PathBuf::from("/opt/widget/ver.ini")
        );
    }
}
