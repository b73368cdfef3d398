//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a long external operation runs
#[derive(Debug)]
pub struct ProgressReporter {
    pub spinner: Option<ProgressBar>,
    start_time: std::time::Instant,
}

impl ProgressReporter {
    /// Create a reporter with a running spinner
    pub fn new_for_store(message: &str) -> Self {
        Self {
            spinner: Some(create_spinner(message)),
            start_time: std::time::Instant::now(),
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self {
            spinner: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop the spinner leaving a final message
    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_with_message(format!("{} ({:.1}s)", message, self.elapsed().as_secs_f64()));
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Failed operations leave no stale spinner behind
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
