//! Progress indicators for ytconverge.

use indicatif::{ProgressBar, ProgressStyle};
use reconcile::PollObserver;
use std::time::Duration;

/// A spinner with a message, ticking on its own.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Shows convergence waits on the spinner of the running operation.
pub struct SpinnerObserver {
    bar: ProgressBar,
    label: String,
}

impl SpinnerObserver {
    pub fn new(bar: ProgressBar, label: impl Into<String>) -> Self {
        Self {
            bar,
            label: label.into(),
        }
    }
}

impl PollObserver for SpinnerObserver {
    fn on_pending(&self, target: &str, condition: &str, attempt: u32, elapsed: Duration) {
        log::debug!("{target}: waiting for {condition} (attempt {attempt})");
        self.bar.set_message(format!(
            "{}: waiting for {target} {condition} ({}s)",
            self.label,
            elapsed.as_secs()
        ));
    }

    fn on_converged(&self, target: &str, attempts: u32, elapsed: Duration) {
        log::debug!("{target}: converged after {attempts} read(s) in {elapsed:?}");
        self.bar.set_message(self.label.clone());
    }
}
