//! Reference-counted storage regions backing buffer values.
//!
//! A [`Storage`] owns one heap region obtained through its
//! [`ByteBufferAllocator`] and is shared between buffer values via `Arc`.
//! Mutation is only ever performed by a buffer that holds the sole strong
//! reference; every shared buffer copies its window into fresh storage
//! before writing. The region is freed through the owning allocator exactly
//! once, when the last reference drops.

use std::fmt;
use std::sync::Arc;

use crate::alloc::ByteBufferAllocator;
use crate::tracing_compat::trace;

/// Half-open window `[lo, hi)` into a storage region.
///
/// A buffer exposes the window as its entire capacity; indices are relative
/// to `lo`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct SliceWindow {
    pub(crate) lo: u32,
    pub(crate) hi: u32,
}

impl SliceWindow {
    pub(crate) fn new(lo: u32, hi: u32) -> Self {
        debug_assert!(lo <= hi, "window bounds inverted: [{lo}, {hi})");
        Self { lo, hi }
    }

    /// Number of bytes visible through the window.
    pub(crate) fn len(self) -> u32 {
        self.hi - self.lo
    }
}

/// Smallest power of two greater than or equal to `n`, saturating at
/// `u32::MAX`. Zero stays zero.
pub(crate) fn next_pow2_clamped(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    n.checked_next_power_of_two().unwrap_or(u32::MAX)
}

/// An owned heap region plus its capacity and owning allocator.
///
/// All byte access goes through the checked helpers below; callers are
/// responsible for staying inside `capacity` and for the uniqueness
/// discipline that makes mutable access sound.
pub(crate) struct Storage {
    base: *mut u8,
    capacity: u32,
    allocator: ByteBufferAllocator,
}

// SAFETY: `Storage` exclusively owns the region behind `base`; no other
// owner of the pointer exists. Shared (`&Storage`) access only reads the
// region, and writes are confined to holders of the unique `Arc` reference
// (or to copy-on-write targets no other thread can observe yet), so moving
// or sharing a `Storage` across threads cannot race on the bytes.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    /// Allocates fresh storage of at least `min_capacity` bytes.
    ///
    /// The capacity is rounded up to the next power of two (zero stays
    /// zero), for amortized-linear growth cost.
    ///
    /// # Panics
    ///
    /// Panics when the allocate hook fails for a non-zero request.
    pub(crate) fn allocate(allocator: ByteBufferAllocator, min_capacity: u32) -> Arc<Storage> {
        let capacity = next_pow2_clamped(min_capacity);
        let base = unsafe { allocator.raw_allocate(capacity as usize) };
        assert!(
            capacity == 0 || !base.is_null(),
            "storage allocation of {capacity} bytes failed"
        );
        trace!(capacity, "allocated fresh storage");
        Arc::new(Storage {
            base,
            capacity,
            allocator,
        })
    }

    /// Allocates fresh storage of at least `new_capacity` bytes seeded with
    /// the bytes visible through `window`.
    ///
    /// Copies `min(window.len(), rounded_capacity)` bytes to offset zero of
    /// the new region using the allocator's bulk-copy hook; the caller
    /// rebases its window onto the result.
    pub(crate) fn reallocate_slice(
        &self,
        window: SliceWindow,
        new_capacity: u32,
    ) -> Arc<Storage> {
        debug_assert!(
            window.hi <= self.capacity,
            "window [{}, {}) outside storage capacity {}",
            window.lo,
            window.hi,
            self.capacity
        );
        let new = Self::allocate(self.allocator, new_capacity);
        let copy_len = window.len().min(new.capacity);
        if copy_len > 0 {
            unsafe {
                self.allocator.raw_copy(
                    new.base,
                    self.base.add(window.lo as usize),
                    copy_len as usize,
                );
            }
        }
        trace!(
            old_capacity = self.capacity,
            new_capacity = new.capacity,
            copied = copy_len,
            "copied storage window into fresh region"
        );
        new
    }

    /// Grows the region in place through the reallocate hook.
    ///
    /// Requires the caller to hold the only reference (enforced by reaching
    /// this via `Arc::get_mut`); the first `capacity` bytes are preserved.
    ///
    /// # Panics
    ///
    /// Panics when the reallocate hook fails for a non-zero request.
    pub(crate) fn grow_in_place(&mut self, new_capacity: u32) {
        debug_assert!(
            new_capacity >= self.capacity,
            "in-place growth cannot shrink: {} -> {new_capacity}",
            self.capacity
        );
        let base = unsafe { self.allocator.raw_reallocate(self.base, new_capacity as usize) };
        assert!(
            new_capacity == 0 || !base.is_null(),
            "storage reallocation to {new_capacity} bytes failed"
        );
        trace!(
            old_capacity = self.capacity,
            new_capacity,
            "grew storage in place"
        );
        self.base = base;
        self.capacity = new_capacity;
    }

    /// Total bytes of the owned region.
    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The window covering the whole region.
    pub(crate) fn full_slice(&self) -> SliceWindow {
        SliceWindow::new(0, self.capacity)
    }

    /// The allocator this region came from (and will be freed through).
    pub(crate) fn allocator(&self) -> ByteBufferAllocator {
        self.allocator
    }

    /// Address of the region start, for diagnostics.
    pub(crate) fn base_address(&self) -> usize {
        self.base as usize
    }

    /// Pointer to the byte at `offset`.
    ///
    /// `offset` must not exceed `capacity`. For a zero-capacity region the
    /// base pointer (possibly the null sentinel) is returned as-is and must
    /// not be dereferenced.
    pub(crate) fn ptr_at(&self, offset: u32) -> *mut u8 {
        debug_assert!(
            offset <= self.capacity,
            "offset {offset} outside storage capacity {}",
            self.capacity
        );
        if self.base.is_null() {
            self.base
        } else {
            unsafe { self.base.add(offset as usize) }
        }
    }

    /// Shared view of `len` bytes starting at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + len` must not exceed `capacity`, and no mutable view of the
    /// same range may be live for the duration of the borrow.
    pub(crate) unsafe fn bytes(&self, offset: u32, len: u32) -> &[u8] {
        if len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr_at(offset), len as usize) }
    }

    /// Exclusive view of `len` bytes starting at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + len` must not exceed `capacity`, and the caller must hold
    /// the unique reference to this storage (no other view of the region,
    /// shared or mutable, may be live).
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: u32, len: u32) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr_at(offset), len as usize) }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        trace!(capacity = self.capacity, "freeing storage");
        // Freed exactly once: Arc guarantees a single drop, and `base` is
        // never handed out as an owning pointer.
        unsafe { self.allocator.raw_free(self.base) };
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("base", &format_args!("{:#x}", self.base as usize))
            .field("capacity", &self.capacity)
            .finish()
    }
}
