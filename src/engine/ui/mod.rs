//! Update UI Collaborators
//!
//! The engine talks to whatever presents the update through [`UpdateUi`].
//! One variant per presentation mode, chosen once at startup.

use std::sync::Arc;

pub mod console;
pub mod headless;

pub use console::ConsoleUi;
pub use headless::HeadlessUi;

/// Calls the update engine makes on its presenter
pub trait UpdateUi: Send + Sync {
    /// Ask the user whether to proceed
    fn confirm(&self, message: &str) -> bool;

    fn report_error(&self, message: &str);

    /// Overall progress in `0.0..=1.0`
    fn report_progress(&self, fraction: f64);

    /// Polled while the download runs
    fn is_cancelled(&self) -> bool;

    fn report_log(&self, line: &str);

    fn notify_complete(&self);
}

/// Pick the presenter for this run. Call from within the tokio runtime.
pub fn select(silent: bool) -> Arc<dyn UpdateUi> {
    if silent {
        Arc::new(HeadlessUi::new())
    } else {
        let console = ConsoleUi::new();
        console.watch_ctrl_c();
        Arc::new(console)
    }
}
