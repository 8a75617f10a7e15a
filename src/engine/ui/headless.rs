//! Silent mode: no prompts, no visible UI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::UpdateUi;

#[derive(Debug, Default, Clone)]
pub struct HeadlessUi {
    cancelled: Arc<AtomicBool>,
}

impl HeadlessUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag an embedding host can raise to stop the download
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

impl UpdateUi for HeadlessUi {
    fn confirm(&self, message: &str) -> bool {
        tracing::info!("{} (auto-accepted in silent mode)", message.replace('\n', " "));
        true
    }

    fn report_error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn report_progress(&self, fraction: f64) {
        tracing::trace!(fraction, "progress");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn report_log(&self, _line: &str) {}

    fn notify_complete(&self) {
        tracing::info!("update complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_confirms_and_cancels_by_handle() {
        let ui = HeadlessUi::new();
        assert!(ui.confirm("Update?"));
        assert!(!ui.is_cancelled());
        ui.cancel_handle().store(true, Ordering::SeqCst);
        assert!(ui.is_cancelled());
    }
}
