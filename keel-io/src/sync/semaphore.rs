use super::{SyncError, Timeout, WaitStatus};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded counting semaphore.
///
/// The count never exceeds the maximum given at construction; releasing past
/// it is reported as [`SyncError::SemaphoreOverflow`] rather than silently
/// clamped.
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<u32>,
    max: u32,
    available: Condvar,
    waiters: AtomicUsize,
}

impl Semaphore {
    /// Count and maximum both start at `n`.
    pub fn new(n: u32) -> Self {
        Self::with_max(n, n)
    }

    pub fn with_max(initial: u32, max: u32) -> Self {
        assert!(initial <= max, "Semaphore initial count {} exceeds maximum {}", initial, max);
        Self {
            count: Mutex::new(initial),
            max,
            available: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Blocks while the count is zero, then decrements it.
    pub fn acquire(&self) {
        let status = self.acquire_timeout(Timeout::INFINITE);
        debug_assert!(status.is_signaled());
    }

    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    pub fn acquire_timeout(&self, timeout: Timeout) -> WaitStatus {
        let deadline = timeout.deadline();
        let mut count = self.count.lock();
        if *count == 0 {
            self.waiters.fetch_add(1, Ordering::Relaxed);
            while *count == 0 {
                match deadline {
                    None => self.available.wait(&mut count),
                    Some(at) => {
                        if self.available.wait_until(&mut count, at).timed_out() && *count == 0 {
                            self.waiters.fetch_sub(1, Ordering::Relaxed);
                            return WaitStatus::TimedOut;
                        }
                    }
                }
            }
            self.waiters.fetch_sub(1, Ordering::Relaxed);
        }
        *count -= 1;
        WaitStatus::Signaled
    }

    /// Increments the count and wakes one waiter.
    ///
    /// The lock is only held for the increment, so this is short enough to
    /// call from a device callback.
    pub fn release(&self) -> Result<(), SyncError> {
        let mut count = self.count.lock();
        if *count >= self.max {
            return Err(SyncError::SemaphoreOverflow { max: self.max });
        }
        *count += 1;
        drop(count);
        self.available.notify_one();
        Ok(())
    }

    pub fn count(&self) -> u32 {
        *self.count.lock()
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.waiters.load(Ordering::Relaxed),
            0,
            "Semaphore dropped while threads are blocked on it"
        );
    }
}
