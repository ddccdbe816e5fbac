use super::{Timeout, WaitStatus};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Whether a wake-up consumes the signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    /// The first waiter to observe the signal clears it.
    Auto,
    /// The signal stays set until [`ConditionSignal::reset`].
    Manual,
}

/// Event-style condition signal.
///
/// The signalled state lives under the signal's own lock, so a `set` that
/// races with a waiter releasing its paired mutex is never lost.
#[derive(Debug)]
pub struct ConditionSignal {
    state: Mutex<bool>,
    cond: Condvar,
    mode: ResetMode,
    waiters: AtomicUsize,
}

impl ConditionSignal {
    pub fn new(mode: ResetMode) -> Self {
        Self {
            state: Mutex::new(false),
            cond: Condvar::new(),
            mode,
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> ResetMode {
        self.mode
    }

    /// Signals the event. Auto-reset wakes one waiter, manual-reset wakes all.
    pub fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        drop(state);
        match self.mode {
            ResetMode::Auto => {
                self.cond.notify_one();
            }
            ResetMode::Manual => {
                self.cond.notify_all();
            }
        }
    }

    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// Releases `guard`'s mutex, blocks until signalled or the timeout
    /// elapses, then re-acquires the mutex before returning.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Timeout) -> WaitStatus {
        let deadline = timeout.deadline();
        MutexGuard::unlocked(guard, || self.wait_until(deadline))
    }

    /// Waits on the signal without a paired mutex.
    pub fn wait_timeout(&self, timeout: Timeout) -> WaitStatus {
        self.wait_until(timeout.deadline())
    }

    fn wait_until(&self, deadline: Option<std::time::Instant>) -> WaitStatus {
        let mut state = self.state.lock();
        if !*state {
            self.waiters.fetch_add(1, Ordering::Relaxed);
            while !*state {
                match deadline {
                    None => self.cond.wait(&mut state),
                    Some(at) => {
                        if self.cond.wait_until(&mut state, at).timed_out() && !*state {
                            self.waiters.fetch_sub(1, Ordering::Relaxed);
                            return WaitStatus::TimedOut;
                        }
                    }
                }
            }
            self.waiters.fetch_sub(1, Ordering::Relaxed);
        }
        if self.mode == ResetMode::Auto {
            *state = false;
        }
        WaitStatus::Signaled
    }
}

impl Drop for ConditionSignal {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.waiters.load(Ordering::Relaxed),
            0,
            "ConditionSignal dropped while threads are blocked on it"
        );
    }
}
