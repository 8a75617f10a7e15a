// Autoupdate Engine - Core module structure
pub mod config;
pub mod cli;
pub mod logging;
pub mod locks;
pub mod ui;
pub mod updater;

pub use config::UpdaterConfig;
pub use updater::UpdateSession;
