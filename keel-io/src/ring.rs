//! Lock-free single-producer/single-consumer byte ring.
//!
//! The producer and consumer halves each own one cursor and only read the
//! other's. Cursors grow monotonically (wrapping on overflow) and are reduced
//! modulo the capacity on access, so `tail - head` is always the fill level
//! and a full ring is distinguishable from an empty one without a spare slot.
//!
//! Neither half ever blocks, allocates, or logs, which is what makes the
//! consumer safe to drive from a real-time device callback.

use crate::memory::{AlignedBuffer, MemoryError};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const RING_ALIGN: usize = 64;

struct Shared {
    /// Total bytes ever consumed.
    head: CachePadded<AtomicUsize>,
    /// Total bytes ever produced.
    tail: CachePadded<AtomicUsize>,
    capacity: usize,
    base: *mut u8,
    // Keeps `base` alive.
    _storage: AlignedBuffer,
}

// SAFETY: the producer writes only the region between tail and head+capacity,
// the consumer reads only the region between head and tail. The Release/Acquire
// pairs on the cursors order those accesses.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// Creates a ring of `capacity` bytes and splits it into its two halves.
///
/// The backing memory is cache-line aligned and, if the OS allows, locked in
/// RAM.
pub fn byte_ring(capacity: usize) -> Result<(RingProducer, RingConsumer), MemoryError> {
    let mut storage = AlignedBuffer::new(capacity, RING_ALIGN)?;
    if let Err(err) = storage.lock() {
        log::debug!("Ring storage stays pageable: {}", err);
    }
    let base = storage.as_mut_ptr();
    let shared = Arc::new(Shared {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        capacity,
        base,
        _storage: storage,
    });
    Ok((RingProducer { shared: shared.clone() }, RingConsumer { shared }))
}

impl Shared {
    /// Copies `len` bytes between `buf` and the ring starting at logical
    /// position `pos`, splitting at the wrap point.
    ///
    /// # Safety
    /// The caller must own `pos..pos + len` according to the cursor protocol.
    unsafe fn copy_in(&self, pos: usize, src: &[u8]) {
        let start = pos % self.capacity;
        let first = src.len().min(self.capacity - start);
        std::ptr::copy_nonoverlapping(src.as_ptr(), self.base.add(start), first);
        std::ptr::copy_nonoverlapping(src.as_ptr().add(first), self.base, src.len() - first);
    }

    /// # Safety
    /// Same contract as [`Shared::copy_in`].
    unsafe fn copy_out(&self, pos: usize, dst: &mut [u8]) {
        let start = pos % self.capacity;
        let first = dst.len().min(self.capacity - start);
        std::ptr::copy_nonoverlapping(self.base.add(start), dst.as_mut_ptr(), first);
        std::ptr::copy_nonoverlapping(self.base, dst.as_mut_ptr().add(first), dst.len() - first);
    }
}

/// Writing half of a byte ring.
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Writes as much of `data` as fits and returns the number of bytes
    /// written. Never overwrites unread data.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        let free = self.shared.capacity - tail.wrapping_sub(head);
        let n = data.len().min(free);
        if n == 0 {
            return 0;
        }
        // SAFETY: tail..tail+n is free space owned by the producer.
        unsafe { self.shared.copy_in(tail, &data[..n]) };
        self.shared.tail.store(tail.wrapping_add(n), Ordering::Release);
        n
    }

    /// Bytes that can be written right now.
    pub fn free_len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        self.shared.capacity - tail.wrapping_sub(head)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Reading half of a byte ring.
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Reads up to `out.len()` bytes and returns how many were read.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        let n = out.len().min(tail.wrapping_sub(head));
        if n == 0 {
            return 0;
        }
        // SAFETY: head..head+n has been published by the producer.
        unsafe { self.shared.copy_out(head, &mut out[..n]) };
        self.shared.head.store(head.wrapping_add(n), Ordering::Release);
        n
    }

    /// Bytes ready to be read.
    pub fn available(&self) -> usize {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
