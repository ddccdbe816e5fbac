//! Blocking primitives with uniform timeout semantics.
//!
//! Every blocking call takes an explicit [`Timeout`] and reports expiry as a
//! [`WaitStatus`], never as an error. Errors are reserved for contract
//! violations (over-releasing a semaphore) and OS refusals (thread spawn).

mod mutex;
mod semaphore;
mod signal;
mod thread;

use std::time::{Duration, Instant};
use thiserror::Error;

pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
pub use signal::{ConditionSignal, ResetMode};
pub use thread::{join_all, sleep, StopFlag, ThreadBuilder, ThreadExit, ThreadHandle, ThreadState};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Semaphore released above its maximum count of {max}")]
    SemaphoreOverflow { max: u32 },
    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a blocking wait returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

impl WaitStatus {
    pub fn is_signaled(self) -> bool {
        self == WaitStatus::Signaled
    }

    pub fn timed_out(self) -> bool {
        self == WaitStatus::TimedOut
    }
}

/// Upper bound on a blocking wait. `None` inside means wait forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeout(Option<Duration>);

impl Timeout {
    pub const INFINITE: Timeout = Timeout(None);
    /// Poll: check once and return immediately.
    pub const NONE: Timeout = Timeout(Some(Duration::ZERO));

    /// `u32::MAX` milliseconds means infinite, matching the native APIs.
    pub fn millis(ms: u32) -> Self {
        if ms == u32::MAX {
            Self::INFINITE
        } else {
            Timeout(Some(Duration::from_millis(ms as u64)))
        }
    }

    pub fn duration(self) -> Option<Duration> {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self.0.is_none()
    }

    /// Absolute deadline measured from now, if bounded. A duration too long
    /// to represent as an `Instant` is treated as infinite.
    pub fn deadline(self) -> Option<Instant> {
        self.0.and_then(|d| Instant::now().checked_add(d))
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout(Some(d))
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::INFINITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrepresentable_deadline_is_infinite() {
        assert!(Timeout::from(Duration::MAX).deadline().is_none());
        assert!(Timeout::INFINITE.deadline().is_none());
        assert!(Timeout::millis(10).deadline().is_some());
        assert!(Timeout::millis(u32::MAX).is_infinite());
    }
}
