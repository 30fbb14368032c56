//! Paced execution of host calls.
//!
//! The host's automation channel is timing-sensitive: issuing calls back to
//! back while it is still processing the previous one makes later calls fail.
//! Every mutating call therefore goes through [`Executor::run`], which makes a
//! single attempt and then waits a fixed settle delay, whether or not the
//! attempt succeeded.

use std::thread;
use std::time::Duration;

use crate::cad::error::CadResult;

/// Default settle delay after each host mutation.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Issues host calls one at a time with a settle delay after each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executor {
    settle: Duration,
}

impl Executor {
    /// Creates an executor with the given settle delay.
    #[must_use]
    pub const fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Creates an executor that never pauses (for tests and dry runs).
    #[must_use]
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns the settle delay.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        self.settle
    }

    /// Runs `op` once, then waits for the settle delay.
    ///
    /// Failures are logged and returned to the caller, who decides whether
    /// they matter.
    ///
    /// # Errors
    ///
    /// Returns whatever error `op` returned.
    pub fn run<T>(&self, label: &str, op: impl FnOnce() -> CadResult<T>) -> CadResult<T> {
        let result = op();

        if let Err(ref e) = result {
            tracing::warn!(
                operation = label,
                retryable = e.is_retryable(),
                error = %e,
                "Host call failed"
            );
        } else {
            tracing::trace!(operation = label, "Host call succeeded");
        }

        self.pause(self.settle);
        result
    }

    /// Sleeps for `duration`, letting the host's event loop catch up.
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}
