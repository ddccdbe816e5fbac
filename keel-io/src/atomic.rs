//! Atomic load/store/add/compare-and-swap with the memory ordering chosen at
//! every call site.
//!
//! The standard atomics already do the work; this module pins down the
//! contract the rest of the layer builds on: no implicit orderings, and a
//! compare-and-swap that reports both the previous value and whether it won
//! instead of panicking on an invalid failure ordering.

use std::sync::atomic::{self, AtomicI32, AtomicI64, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Memory ordering requested by a call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemOrder {
    Relaxed,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

impl MemOrder {
    fn for_load(self) -> Ordering {
        match self {
            MemOrder::Relaxed => Ordering::Relaxed,
            MemOrder::Acquire | MemOrder::AcqRel => Ordering::Acquire,
            // A load cannot be Release; the strongest legal ordering wins.
            MemOrder::Release | MemOrder::SeqCst => Ordering::SeqCst,
        }
    }

    fn for_store(self) -> Ordering {
        match self {
            MemOrder::Relaxed => Ordering::Relaxed,
            MemOrder::Release | MemOrder::AcqRel => Ordering::Release,
            MemOrder::Acquire | MemOrder::SeqCst => Ordering::SeqCst,
        }
    }

    fn for_rmw(self) -> Ordering {
        match self {
            MemOrder::Relaxed => Ordering::Relaxed,
            MemOrder::Acquire => Ordering::Acquire,
            MemOrder::Release => Ordering::Release,
            MemOrder::AcqRel => Ordering::AcqRel,
            MemOrder::SeqCst => Ordering::SeqCst,
        }
    }

    /// Failure ordering of a CAS may not contain a release component.
    fn for_cas_failure(self) -> Ordering {
        match self {
            MemOrder::Relaxed | MemOrder::Release => Ordering::Relaxed,
            MemOrder::Acquire | MemOrder::AcqRel => Ordering::Acquire,
            MemOrder::SeqCst => Ordering::SeqCst,
        }
    }
}

/// Outcome of a compare-and-swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CasResult<T> {
    /// Value held by the cell right before the operation.
    pub previous: T,
    pub succeeded: bool,
}

/// Word-sized atomic cell with explicit ordering on every access.
pub trait AtomicCell {
    type Value: Copy;

    fn load(&self, order: MemOrder) -> Self::Value;
    fn store(&self, value: Self::Value, order: MemOrder);
    /// Swaps in `value` and returns the previous one.
    fn exchange(&self, value: Self::Value, order: MemOrder) -> Self::Value;
    /// Replaces the value with `new` only if it currently equals `current`.
    fn compare_and_swap(&self, current: Self::Value, new: Self::Value, order: MemOrder) -> CasResult<Self::Value>;
}

/// Integer atomic cells additionally support fetch-add.
pub trait AtomicArith: AtomicCell {
    /// Wrapping add; returns the value before the addition.
    fn add(&self, addend: Self::Value, order: MemOrder) -> Self::Value;
}

macro_rules! impl_atomic_int {
    ($($atomic:ty => $value:ty),* $(,)?) => {$(
        impl AtomicCell for $atomic {
            type Value = $value;

            #[inline]
            fn load(&self, order: MemOrder) -> $value {
                <$atomic>::load(self, order.for_load())
            }

            #[inline]
            fn store(&self, value: $value, order: MemOrder) {
                <$atomic>::store(self, value, order.for_store())
            }

            #[inline]
            fn exchange(&self, value: $value, order: MemOrder) -> $value {
                self.swap(value, order.for_rmw())
            }

            #[inline]
            fn compare_and_swap(&self, current: $value, new: $value, order: MemOrder) -> CasResult<$value> {
                match self.compare_exchange(current, new, order.for_rmw(), order.for_cas_failure()) {
                    Ok(previous) => CasResult { previous, succeeded: true },
                    Err(previous) => CasResult { previous, succeeded: false },
                }
            }
        }

        impl AtomicArith for $atomic {
            #[inline]
            fn add(&self, addend: $value, order: MemOrder) -> $value {
                self.fetch_add(addend, order.for_rmw())
            }
        }
    )*};
}

impl_atomic_int! {
    AtomicU32 => u32,
    AtomicI32 => i32,
    AtomicU64 => u64,
    AtomicI64 => i64,
    AtomicUsize => usize,
}

impl<T> AtomicCell for AtomicPtr<T> {
    type Value = *mut T;

    #[inline]
    fn load(&self, order: MemOrder) -> *mut T {
        AtomicPtr::load(self, order.for_load())
    }

    #[inline]
    fn store(&self, value: *mut T, order: MemOrder) {
        AtomicPtr::store(self, value, order.for_store())
    }

    #[inline]
    fn exchange(&self, value: *mut T, order: MemOrder) -> *mut T {
        self.swap(value, order.for_rmw())
    }

    #[inline]
    fn compare_and_swap(&self, current: *mut T, new: *mut T, order: MemOrder) -> CasResult<*mut T> {
        match self.compare_exchange(current, new, order.for_rmw(), order.for_cas_failure()) {
            Ok(previous) => CasResult { previous, succeeded: true },
            Err(previous) => CasResult { previous, succeeded: false },
        }
    }
}

/// Memory fence. A `Relaxed` fence is a no-op.
#[inline]
pub fn fence(order: MemOrder) {
    if order != MemOrder::Relaxed {
        atomic::fence(order.for_rmw());
    }
}

/// Prevents loads from being reordered across this point.
#[inline]
pub fn read_fence() {
    atomic::fence(Ordering::Acquire);
}

/// Prevents stores from being reordered across this point.
#[inline]
pub fn write_fence() {
    atomic::fence(Ordering::Release);
}

#[inline]
pub fn read_write_fence() {
    atomic::fence(Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_cas_reports_previous_value() {
        let cell = AtomicU32::new(7);
        let won = AtomicCell::compare_and_swap(&cell, 7, 9, MemOrder::AcqRel);
        assert_eq!(won, CasResult { previous: 7, succeeded: true });

        let lost = AtomicCell::compare_and_swap(&cell, 7, 11, MemOrder::Release);
        assert_eq!(lost, CasResult { previous: 9, succeeded: false });
        assert_eq!(AtomicCell::load(&cell, MemOrder::Acquire), 9);
    }

    #[test]
    fn test_signed_add_wraps_and_returns_previous() {
        let cell = AtomicI64::new(-3);
        assert_eq!(AtomicArith::add(&cell, 5, MemOrder::SeqCst), -3);
        assert_eq!(AtomicCell::load(&cell, MemOrder::SeqCst), 2);

        let wrap = AtomicU32::new(u32::MAX);
        AtomicArith::add(&wrap, 1, MemOrder::Relaxed);
        assert_eq!(AtomicCell::load(&wrap, MemOrder::Relaxed), 0);
    }

    #[test]
    fn test_pointer_exchange() {
        let mut a = 1u8;
        let mut b = 2u8;
        let cell = AtomicPtr::new(&mut a as *mut u8);
        let old = AtomicCell::exchange(&cell, &mut b as *mut u8, MemOrder::AcqRel);
        assert_eq!(old, &mut a as *mut u8);
        let cas = AtomicCell::compare_and_swap(&cell, &mut a as *mut u8, std::ptr::null_mut(), MemOrder::SeqCst);
        assert!(!cas.succeeded);
        assert_eq!(cas.previous, &mut b as *mut u8);
    }

    #[test]
    fn test_concurrent_add_loses_nothing() {
        let cell = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        AtomicArith::add(&*cell, 1, MemOrder::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        fence(MemOrder::SeqCst);
        assert_eq!(AtomicCell::load(&*cell, MemOrder::Acquire), 40_000);
    }
}
