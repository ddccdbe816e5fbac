use super::{ConditionSignal, ResetMode, SyncError, Timeout, WaitStatus};
use crate::platform::affinity::pin_thread_to_core;
use log::{debug, warn};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cooperative stop request shared between a thread and its owner.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a thread's entry function ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ThreadExit<R> {
    Returned(R),
    Panicked(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    StopRequested,
    /// Entry function returned; not yet joined.
    Finished,
    Joined,
}

/// Configures a thread before it is spawned.
#[derive(Debug)]
pub struct ThreadBuilder {
    name: String,
    core: Option<usize>,
    stack_size: Option<usize>,
}

impl ThreadBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), core: None, stack_size: None }
    }

    /// Pins the thread to a physical core as its first action.
    pub fn pin_to_core(mut self, core_id: usize) -> Self {
        self.core = Some(core_id);
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Spawns the OS thread immediately.
    ///
    /// `entry` receives the thread's [`StopFlag`] and is expected to poll it;
    /// there is no forced cancellation.
    pub fn spawn<F, R>(self, entry: F) -> Result<ThreadHandle<R>, SyncError>
    where
        F: FnOnce(StopFlag) -> R + Send + 'static,
        R: Send + 'static,
    {
        let stop = StopFlag::new();
        let finished = Arc::new(ConditionSignal::new(ResetMode::Manual));

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let thread_stop = stop.clone();
        let thread_finished = finished.clone();
        let core = self.core;
        let handle = builder
            .spawn(move || {
                // Signals completion on every exit path, unwinding included.
                let _finished = FinishGuard(thread_finished);
                if let Some(core_id) = core {
                    pin_thread_to_core(core_id);
                }
                entry(thread_stop)
            })
            .map_err(|source| SyncError::Spawn { name: self.name.clone(), source })?;

        debug!("Thread '{}' spawned", self.name);
        Ok(ThreadHandle {
            name: self.name,
            stop,
            finished,
            handle: Some(handle),
            exit: None,
        })
    }
}

struct FinishGuard(Arc<ConditionSignal>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Owning handle to a spawned OS thread.
///
/// Joining is idempotent: once the thread has been joined its exit is cached
/// and later joins return immediately. Dropping an unjoined handle requests
/// a stop and waits for the thread.
pub struct ThreadHandle<R: Send + 'static = ()> {
    name: String,
    stop: StopFlag,
    finished: Arc<ConditionSignal>,
    handle: Option<JoinHandle<R>>,
    exit: Option<ThreadExit<R>>,
}

impl<R: Send + 'static> ThreadHandle<R> {
    /// Spawns with the default stack size and no core pinning.
    pub fn spawn<F>(name: impl Into<String>, entry: F) -> Result<Self, SyncError>
    where
        F: FnOnce(StopFlag) -> R + Send + 'static,
    {
        ThreadBuilder::new(name).spawn(entry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn state(&self) -> ThreadState {
        if self.handle.is_none() {
            ThreadState::Joined
        } else if self.finished.is_set() {
            ThreadState::Finished
        } else if self.stop.is_stop_requested() {
            ThreadState::StopRequested
        } else {
            ThreadState::Running
        }
    }

    /// Waits for the entry function to return, for at most `timeout`.
    pub fn join(&mut self, timeout: Timeout) -> WaitStatus {
        let Some(handle) = self.handle.take() else {
            return WaitStatus::Signaled;
        };
        if self.finished.wait_timeout(timeout).timed_out() {
            self.handle = Some(handle);
            return WaitStatus::TimedOut;
        }
        self.exit = Some(match handle.join() {
            Ok(value) => ThreadExit::Returned(value),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Thread '{}' panicked: {}", self.name, message);
                ThreadExit::Panicked(message)
            }
        });
        debug!("Thread '{}' joined", self.name);
        WaitStatus::Signaled
    }

    /// Cached exit of a joined thread.
    pub fn exit(&self) -> Option<&ThreadExit<R>> {
        self.exit.as_ref()
    }

    pub fn take_result(&mut self) -> Option<ThreadExit<R>> {
        self.exit.take()
    }
}

impl<R: Send + 'static> Drop for ThreadHandle<R> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if !self.finished.is_set() {
                warn!("Thread '{}' dropped while running; requesting stop and joining", self.name);
            }
            self.stop.request_stop();
            self.join(Timeout::INFINITE);
        }
    }
}

impl<R: Send + 'static> std::fmt::Debug for ThreadHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Joins every handle under one shared deadline.
pub fn join_all<R: Send + 'static>(handles: &mut [ThreadHandle<R>], timeout: Timeout) -> WaitStatus {
    let deadline = timeout.deadline();
    for handle in handles.iter_mut() {
        let remaining = match deadline {
            None => Timeout::INFINITE,
            Some(at) => Timeout::from(at.saturating_duration_since(Instant::now())),
        };
        if handle.join(remaining).timed_out() {
            return WaitStatus::TimedOut;
        }
    }
    WaitStatus::Signaled
}

pub fn sleep(ms: u32) {
    thread::sleep(Duration::from_millis(ms as u64));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_join_is_idempotent_and_caches_result() {
        let mut t = ThreadHandle::spawn("worker", |_| 21 * 2).unwrap();
        assert_eq!(t.join(Timeout::millis(5_000)), WaitStatus::Signaled);
        assert_eq!(t.state(), ThreadState::Joined);
        assert_eq!(t.exit(), Some(&ThreadExit::Returned(42)));

        // Second join returns immediately with the cached exit.
        assert_eq!(t.join(Timeout::NONE), WaitStatus::Signaled);
        assert_eq!(t.take_result(), Some(ThreadExit::Returned(42)));
    }

    #[test]
    fn test_join_times_out_until_stop_is_observed() {
        let ticks = Arc::new(AtomicU32::new(0));
        let worker_ticks = ticks.clone();
        let mut t = ThreadHandle::spawn("poller", move |stop| {
            while !stop.is_stop_requested() {
                worker_ticks.fetch_add(1, Ordering::Relaxed);
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert_eq!(t.join(Timeout::millis(20)), WaitStatus::TimedOut);
        assert_eq!(t.state(), ThreadState::Running);

        t.request_stop();
        assert_eq!(t.join(Timeout::millis(5_000)), WaitStatus::Signaled);
        assert!(ticks.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_panic_is_captured_as_exit() {
        let mut t = ThreadHandle::<()>::spawn("crasher", |_| panic!("boom")).unwrap();
        assert!(t.join(Timeout::millis(5_000)).is_signaled());
        assert_eq!(t.exit(), Some(&ThreadExit::Panicked("boom".to_string())));
    }

    #[test]
    fn test_join_all_shares_deadline() {
        let mut handles: Vec<ThreadHandle<u32>> = (0..4)
            .map(|i| ThreadHandle::spawn(format!("batch-{}", i), move |_| i).unwrap())
            .collect();
        assert!(join_all(&mut handles, Timeout::millis(5_000)).is_signaled());
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(h.exit(), Some(&ThreadExit::Returned(i as u32)));
        }
    }

    #[test]
    fn test_drop_requests_stop() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let t = ThreadHandle::spawn("dropped", move |stop| {
            while !stop.is_stop_requested() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        drop(t);
        assert!(exited.load(Ordering::SeqCst));
    }
}
