//! Autoupdate CLI Module
//! Command-line flags for the updater binary

use clap::Parser;
use std::path::PathBuf;

use super::config::{InstallMode, UpdaterConfig};

#[derive(Parser, Debug, Default)]
#[command(name = "autoupdate")]
#[command(author = "Autoupdate Team")]
#[command(version)]
#[command(about = "Check for, download and install application updates", long_about = None)]
pub struct Cli {
    /// Config file (updater.config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Application name
    #[arg(long)]
    pub app: Option<String>,

    /// Repository owner used in URL templates
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name used in URL templates
    #[arg(long)]
    pub repo: Option<String>,

    /// Manifest URL template
    #[arg(long)]
    pub manifest_url: Option<String>,

    /// Directory the package is installed into
    #[arg(long)]
    pub install_dir: Option<PathBuf>,

    /// Install strategy
    #[arg(long, value_enum)]
    pub mode: Option<InstallMode>,

    /// Unattended: no prompt, no progress bar
    #[arg(long)]
    pub silent: bool,

    /// Route requests to the local debug server and throttle the download
    #[arg(long)]
    pub debug: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply flags on top of a loaded (or default) config
    pub fn apply(&self, mut config: UpdaterConfig) -> UpdaterConfig {
        if let Some(app) = &self.app {
            config.app_name = app.clone();
        }
        if let Some(owner) = &self.owner {
            config.owner = owner.clone();
        }
        if let Some(repo) = &self.repo {
            config.repo = repo.clone();
        }
        if let Some(url) = &self.manifest_url {
            config.manifest_url = url.clone();
        }
        if let Some(dir) = &self.install_dir {
            config.install_dir = Some(dir.clone());
        }
        if let Some(mode) = self.mode {
            config.install_mode = mode;
        }
        config.silent |= self.silent;
        config.debug |= self.debug;
        config
    }
}
