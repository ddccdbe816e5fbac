use keel_io::{StopFlag, SyncError, ThreadBuilder, ThreadHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Thread accounting owned by the synchronization subsystem.
///
/// Every platform-owned thread is spawned through the tracker, so shutdown
/// can verify that nothing outlived its owner.
#[derive(Clone, Debug, Default)]
pub struct ThreadTracker {
    live: Arc<AtomicUsize>,
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, R>(&self, name: &str, entry: F) -> Result<ThreadHandle<R>, SyncError>
    where
        F: FnOnce(StopFlag) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.spawn_with(ThreadBuilder::new(name), entry)
    }

    pub fn spawn_with<F, R>(&self, builder: ThreadBuilder, entry: F) -> Result<ThreadHandle<R>, SyncError>
    where
        F: FnOnce(StopFlag) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard(self.live.clone());
        builder.spawn(move |stop| {
            // Released before the handle reports the thread finished.
            let _guard = guard;
            entry(stop)
        })
    }

    /// Tracked threads whose entry function has not yet returned.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_io::Timeout;

    #[test]
    fn test_live_count_follows_threads() {
        let tracker = ThreadTracker::new();
        let mut handle = tracker
            .spawn("tracked", |stop| {
                while !stop.is_stop_requested() {
                    std::thread::yield_now();
                }
                7
            })
            .unwrap();
        assert_eq!(tracker.live(), 1);
        handle.request_stop();
        assert!(handle.join(Timeout::INFINITE).is_signaled());
        assert_eq!(tracker.live(), 0);
    }
}
