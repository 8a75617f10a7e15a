//! Terminal presenter: stdin prompt, indicatif progress bar, Ctrl-C cancels.
//! Ctrl-C while the prompt is open declines the update.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::UpdateUi;

const BAR_SCALE: u64 = 1000;

pub struct ConsoleUi {
    bar: ProgressBar,
    cancelled: Arc<AtomicBool>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(BAR_SCALE);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {wide_msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self {
            bar,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raise the cancel flag on Ctrl-C. Requires a running tokio runtime.
    pub fn watch_ctrl_c(&self) {
        let cancelled = self.cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    }

    fn show_bar(&self) {
        if self.bar.is_hidden() {
            self.bar
                .set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
    }
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateUi for ConsoleUi {
    fn confirm(&self, message: &str) -> bool {
        print!("{} [y/N] ", message.bold());
        let _ = io::stdout().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn report_error(&self, message: &str) {
        self.bar.abandon();
        eprintln!("{} {}", "Update failed:".red().bold(), message);
    }

    fn report_progress(&self, fraction: f64) {
        self.show_bar();
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * BAR_SCALE as f64) as u64);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn report_log(&self, line: &str) {
        self.bar.set_message(line.to_string());
    }

    fn notify_complete(&self) {
        self.bar.finish_and_clear();
        println!("{}", "Update installed.".green().bold());
    }
}
