use super::Timeout;

pub use parking_lot::MutexGuard;

/// Non-recursive mutual exclusion lock around `T`.
///
/// Unlocking happens when the guard drops, so only the owning thread can
/// release the lock. Locking again from the owning thread deadlocks; the
/// lock is deliberately not recursive.
#[derive(Debug, Default)]
pub struct Mutex<T> {
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: parking_lot::const_mutex(value) }
    }

    /// Blocks until ownership is acquired.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Returns immediately; `None` if another thread holds the lock.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Blocks for at most `timeout`; `None` means the deadline passed.
    pub fn lock_timeout(&self, timeout: Timeout) -> Option<MutexGuard<'_, T>> {
        match timeout.duration() {
            None => Some(self.inner.lock()),
            Some(d) if d.is_zero() => self.inner.try_lock(),
            Some(d) => self.inner.try_lock_for(d),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
