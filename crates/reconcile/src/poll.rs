//! Convergence polling.
//!
//! Counts and existence flags change asynchronously after the mutating call
//! returns. [`poll_until`] re-reads at a fixed interval until the awaited
//! condition holds. A value mismatch just means "not yet"; a failed read
//! aborts at once. Polls are bounded by [`PollPolicy::timeout`] unless the
//! policy is explicitly [`unbounded`](PollPolicy::unbounded).

use crate::error::{Error, Result};
use std::thread;
use std::time::{Duration, Instant};

/// Interval and deadline for convergence polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between reads.
    pub interval: Duration,
    /// Give up after this long; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PollPolicy {
    /// Create a policy.
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Poll every second with no deadline.
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }
}

/// Receives poll progress.
pub trait PollObserver {
    /// Called after every read that did not satisfy the condition.
    fn on_pending(&self, target: &str, condition: &str, attempt: u32, elapsed: Duration);

    /// Called once the condition holds.
    fn on_converged(&self, _target: &str, _attempts: u32, _elapsed: Duration) {}
}

/// Observer that ignores everything.
pub struct NoObserver;

impl PollObserver for NoObserver {
    fn on_pending(&self, _target: &str, _condition: &str, _attempt: u32, _elapsed: Duration) {}
}

/// Observer that logs through the `log` facade.
pub struct LogObserver;

impl PollObserver for LogObserver {
    fn on_pending(&self, target: &str, condition: &str, attempt: u32, elapsed: Duration) {
        log::debug!("{target}: waiting for {condition} (attempt {attempt}, {elapsed:?})");
    }

    fn on_converged(&self, target: &str, attempts: u32, elapsed: Duration) {
        log::debug!("{target}: converged after {attempts} read(s) in {elapsed:?}");
    }
}

/// Call `probe` until it returns `true`.
///
/// Returns the number of reads it took.
pub fn poll_until<F>(
    policy: &PollPolicy,
    observer: &dyn PollObserver,
    target: &str,
    condition: &str,
    mut probe: F,
) -> Result<u32>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        if probe()? {
            observer.on_converged(target, attempt, start.elapsed());
            return Ok(attempt);
        }

        let elapsed = start.elapsed();
        if let Some(timeout) = policy.timeout
            && elapsed >= timeout
        {
            return Err(Error::ConvergenceTimeout {
                target: target.to_string(),
                condition: condition.to_string(),
                waited: elapsed,
            });
        }

        observer.on_pending(target, condition, attempt, elapsed);
        thread::sleep(policy.interval);
    }
}
