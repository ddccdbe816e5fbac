//! Address-space reservation, on-demand commit, and aligned allocation.
//!
//! A [`Reservation`] claims a page-rounded range of virtual addresses
//! without backing it. [`Reservation::commit`] backs pages as they are needed,
//! and dropping the reservation hands the whole range back to the OS. The
//! [`Arena`] carves aligned sub-page allocations out of one reservation,
//! committing as it goes. Nothing here retries: when the OS says no, the
//! caller gets [`MemoryError::OutOfMemory`] and decides.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::OnceLock;
use thiserror::Error;
use log::{debug, info};

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Out of memory: the OS refused {requested} bytes")]
    OutOfMemory { requested: usize },
    #[error("Invalid memory alignment: {0} is not a power of two")]
    InvalidAlignment(usize),
    #[error("Range {offset}..{end} lies outside the {len}-byte reservation")]
    OutOfRange { offset: usize, end: usize, len: usize },
    #[error("Zero-sized memory request")]
    ZeroSize,
    #[error("Failed to lock memory via mlock: {0}")]
    LockFailed(std::io::Error),
    #[error("OS memory call failed: {0}")]
    Os(std::io::Error),
}

/// Size of a virtual memory page on this machine.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(os::query_page_size)
}

#[inline]
fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

#[inline]
fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// A reserved, initially uncommitted range of address space.
#[derive(Debug)]
pub struct Reservation {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the reservation exclusively owns its mapping; no thread-affine
// state is attached to it.
unsafe impl Send for Reservation {}

impl Reservation {
    /// Reserves at least `size` bytes (rounded up to whole pages).
    pub fn reserve(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let len = align_up(size, page_size()).ok_or(MemoryError::OutOfMemory { requested: size })?;
        let base = os::reserve(len)?;
        debug!("Reserved {} bytes of address space at {:p}", len, base.as_ptr());
        Ok(Self { base, len })
    }

    /// Makes `offset..offset + len` readable and writable.
    ///
    /// The range is widened to page boundaries. Committing an already
    /// committed page is harmless.
    pub fn commit(&mut self, offset: usize, len: usize) -> Result<NonNull<u8>, MemoryError> {
        let (start, end) = self.page_range(offset, len)?;
        // SAFETY: start..end lies inside our mapping (checked by page_range).
        unsafe { os::commit(self.base.as_ptr().add(start), end - start)? };
        // SAFETY: offset < self.len, so the result stays inside the mapping.
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
    }

    /// Returns the physical pages of a range to the OS; the addresses stay
    /// reserved and can be committed again (zero-filled).
    pub fn decommit(&mut self, offset: usize, len: usize) -> Result<(), MemoryError> {
        let (start, end) = self.page_range(offset, len)?;
        // SAFETY: start..end lies inside our mapping.
        unsafe { os::decommit(self.base.as_ptr().add(start), end - start) }
    }

    /// Returns the entire reservation to the OS.
    pub fn release(self) {
        drop(self)
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn page_range(&self, offset: usize, len: usize) -> Result<(usize, usize), MemoryError> {
        if len == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let page = page_size();
        let out_of_range = || MemoryError::OutOfRange { offset, end: offset.saturating_add(len), len: self.len };
        let end = offset.checked_add(len).ok_or_else(out_of_range)?;
        let end = align_up(end, page).ok_or_else(out_of_range)?;
        if end > self.len {
            return Err(out_of_range());
        }
        Ok((align_down(offset, page), end))
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        // SAFETY: base/len are exactly what os::reserve handed out.
        unsafe { os::release(self.base.as_ptr(), self.len) };
        debug!("Released {} bytes of address space", self.len);
    }
}

/// Bump allocator over a single reservation.
///
/// Pages are committed lazily as the cursor crosses them. Allocations live
/// until [`Arena::reset`] or until the arena is dropped; the returned
/// pointers must not be used after either.
#[derive(Debug)]
pub struct Arena {
    region: Reservation,
    cursor: usize,
    committed: usize,
}

impl Arena {
    pub fn new(capacity: usize) -> Result<Self, MemoryError> {
        let region = Reservation::reserve(capacity)?;
        info!("Arena initialized: {} bytes reserved", region.len());
        Ok(Self { region, cursor: 0, committed: 0 })
    }

    /// Allocates `size` bytes aligned to `align` (a power of two).
    pub fn alloc_aligned(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, MemoryError> {
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(align));
        }
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }

        let base = self.region.as_ptr() as usize;
        let oom = || MemoryError::OutOfMemory { requested: size };
        let start = align_up(base + self.cursor, align).ok_or_else(oom)? - base;
        let end = start.checked_add(size).ok_or_else(oom)?;
        if end > self.region.len() {
            return Err(oom());
        }

        if end > self.committed {
            let target = align_up(end, page_size()).unwrap_or(end).min(self.region.len());
            self.region.commit(self.committed, target - self.committed)?;
            self.committed = target;
        }

        self.cursor = end;
        // SAFETY: start < region.len(), so the pointer is inside the mapping.
        Ok(unsafe { NonNull::new_unchecked(self.region.as_ptr().add(start)) })
    }

    /// Allocates a zeroed byte slice borrowed from the arena.
    pub fn alloc_bytes(&mut self, len: usize, align: usize) -> Result<&mut [u8], MemoryError> {
        let ptr = self.alloc_aligned(len, align)?;
        // SAFETY: ptr..ptr+len is committed and exclusively ours for the
        // lifetime of &mut self.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, len);
            Ok(std::slice::from_raw_parts_mut(ptr.as_ptr(), len))
        }
    }

    /// Forgets every allocation. Committed pages stay committed.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Decommits the pages above the cursor.
    pub fn trim(&mut self) -> Result<(), MemoryError> {
        let keep = align_up(self.cursor, page_size()).unwrap_or(self.committed);
        if keep < self.committed {
            self.region.decommit(keep, self.committed - keep)?;
            self.committed = keep;
        }
        Ok(())
    }

    pub fn used(&self) -> usize {
        self.cursor
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn capacity(&self) -> usize {
        self.region.len()
    }
}

/// Zeroed heap allocation with a caller-chosen alignment.
///
/// Can optionally be pinned in physical RAM via mlock, which is what the
/// audio ring wants so the device callback never takes a page fault.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    locked: bool,
}

// SAFETY: AlignedBuffer owns its allocation exclusively; shared access only
// ever yields &[u8].
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    pub fn new(size: usize, align: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(align));
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| MemoryError::OutOfMemory { requested: size })?;

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(MemoryError::OutOfMemory { requested: size })?;
        Ok(Self { ptr, layout, locked: false })
    }

    /// Pins the buffer in physical RAM.
    #[cfg(unix)]
    pub fn lock(&mut self) -> Result<(), MemoryError> {
        if self.locked {
            return Ok(());
        }
        // SAFETY: ptr is valid for layout.size() bytes.
        let ret = unsafe { libc::mlock(self.ptr.as_ptr() as *const libc::c_void, self.layout.size()) };
        if ret != 0 {
            return Err(MemoryError::LockFailed(std::io::Error::last_os_error()));
        }
        self.locked = true;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn lock(&mut self) -> Result<(), MemoryError> {
        Err(MemoryError::LockFailed(std::io::Error::from(std::io::ErrorKind::Unsupported)))
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: valid, initialized (zeroed) allocation of layout.size().
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: munlock matches the successful mlock in lock(); dealloc uses
        // the layout we allocated with.
        unsafe {
            #[cfg(unix)]
            if self.locked {
                libc::munlock(self.ptr.as_ptr() as *const libc::c_void, self.layout.size());
            }
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.layout.size())
            .field("align", &self.layout.align())
            .field("locked", &self.locked)
            .finish()
    }
}

#[cfg(unix)]
mod os {
    use super::MemoryError;
    use nix::errno::Errno;
    use nix::unistd::{sysconf, SysconfVar};
    use std::ptr::NonNull;

    pub fn query_page_size() -> usize {
        match sysconf(SysconfVar::PAGE_SIZE) {
            Ok(Some(size)) if size > 0 => size as usize,
            _ => crate::platform::topology::fallback_page_size(),
        }
    }

    fn last_error(requested: usize) -> MemoryError {
        match Errno::last() {
            Errno::ENOMEM => MemoryError::OutOfMemory { requested },
            errno => MemoryError::Os(std::io::Error::from_raw_os_error(errno as i32)),
        }
    }

    pub fn reserve(len: usize) -> Result<NonNull<u8>, MemoryError> {
        // SAFETY: anonymous private mapping with no fixed address.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(last_error(len));
        }
        NonNull::new(ptr as *mut u8).ok_or(MemoryError::OutOfMemory { requested: len })
    }

    /// # Safety
    /// `ptr..ptr+len` must be page-aligned and inside a live reservation.
    pub unsafe fn commit(ptr: *mut u8, len: usize) -> Result<(), MemoryError> {
        if libc::mprotect(ptr as *mut libc::c_void, len, libc::PROT_READ | libc::PROT_WRITE) != 0 {
            return Err(last_error(len));
        }
        Ok(())
    }

    /// # Safety
    /// Same as [`commit`]; the range's contents are discarded.
    pub unsafe fn decommit(ptr: *mut u8, len: usize) -> Result<(), MemoryError> {
        if libc::madvise(ptr as *mut libc::c_void, len, libc::MADV_DONTNEED) != 0 {
            return Err(last_error(len));
        }
        if libc::mprotect(ptr as *mut libc::c_void, len, libc::PROT_NONE) != 0 {
            return Err(last_error(len));
        }
        Ok(())
    }

    /// # Safety
    /// `ptr`/`len` must be exactly a mapping returned by [`reserve`].
    pub unsafe fn release(ptr: *mut u8, len: usize) {
        if libc::munmap(ptr as *mut libc::c_void, len) != 0 {
            log::error!("munmap of {} bytes failed: {}", len, std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(unix))]
mod os {
    //! Targets without an mmap-style API back a reservation with one eager,
    //! zeroed heap block; commit and decommit only clear memory.
    use super::MemoryError;
    use std::alloc::{alloc_zeroed, dealloc, Layout};
    use std::ptr::NonNull;

    pub fn query_page_size() -> usize {
        crate::platform::topology::fallback_page_size()
    }

    fn layout(len: usize) -> Result<Layout, MemoryError> {
        Layout::from_size_align(len, query_page_size()).map_err(|_| MemoryError::OutOfMemory { requested: len })
    }

    pub fn reserve(len: usize) -> Result<NonNull<u8>, MemoryError> {
        let layout = layout(len)?;
        // SAFETY: non-zero, page-aligned layout.
        NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(MemoryError::OutOfMemory { requested: len })
    }

    pub unsafe fn commit(_ptr: *mut u8, _len: usize) -> Result<(), MemoryError> {
        Ok(())
    }

    pub unsafe fn decommit(ptr: *mut u8, len: usize) -> Result<(), MemoryError> {
        std::ptr::write_bytes(ptr, 0, len);
        Ok(())
    }

    pub unsafe fn release(ptr: *mut u8, len: usize) {
        if let Ok(layout) = layout(len) {
            dealloc(ptr, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_rounds_to_pages_and_commits() {
        let page = page_size();
        let mut region = Reservation::reserve(page + 1).unwrap();
        assert_eq!(region.len(), 2 * page);

        let ptr = region.commit(page, 16).unwrap();
        // SAFETY: the second page was just committed.
        unsafe {
            ptr.as_ptr().write(0xAB);
            assert_eq!(ptr.as_ptr().read(), 0xAB);
        }
        region.decommit(page, page).unwrap();
        region.commit(page, page).unwrap();
        // Recommitted pages come back zeroed.
        assert_eq!(unsafe { ptr.as_ptr().read() }, 0);
    }

    #[test]
    fn test_commit_outside_reservation_is_rejected() {
        let mut region = Reservation::reserve(page_size()).unwrap();
        match region.commit(page_size(), 1) {
            Err(MemoryError::OutOfRange { .. }) => {}
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_arena_alignment_and_lazy_commit() {
        let mut arena = Arena::new(4 * page_size()).unwrap();
        assert_eq!(arena.committed(), 0);

        for align in [1usize, 8, 64, 256, 4096] {
            let ptr = arena.alloc_aligned(24, align).unwrap();
            assert_eq!(ptr.as_ptr() as usize % align, 0, "alignment {} violated", align);
        }
        assert!(arena.committed() >= arena.used());
        assert!(arena.committed() <= arena.capacity());

        let bytes = arena.alloc_bytes(100, 16).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
        bytes[99] = 7;
    }

    #[test]
    fn test_arena_exhaustion_and_reset() {
        let mut arena = Arena::new(page_size()).unwrap();
        arena.alloc_aligned(page_size(), 8).unwrap();
        match arena.alloc_aligned(1, 1) {
            Err(MemoryError::OutOfMemory { requested }) => assert_eq!(requested, 1),
            other => panic!("expected OutOfMemory, got {:?}", other),
        }
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert!(arena.alloc_aligned(1, 1).is_ok());
        arena.trim().unwrap();
    }

    #[test]
    fn test_invalid_alignment() {
        let mut arena = Arena::new(page_size()).unwrap();
        assert!(matches!(arena.alloc_aligned(8, 3), Err(MemoryError::InvalidAlignment(3))));
        assert!(matches!(AlignedBuffer::new(8, 12), Err(MemoryError::InvalidAlignment(12))));
    }

    #[test]
    fn test_aligned_buffer_is_zeroed_and_aligned() {
        let mut buf = AlignedBuffer::new(1000, 128).unwrap();
        assert_eq!(buf.as_ptr() as usize % 128, 0);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
        buf.as_mut_slice()[999] = 1;
        // Locking may be refused by ulimit; either outcome is acceptable.
        let _ = buf.lock();
    }
}
