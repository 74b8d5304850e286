//! Allocator handles: pluggable allocation hooks for buffer storage.
//!
//! Every [`ByteBuffer`] is backed by a heap region obtained through a
//! [`ByteBufferAllocator`] - an immutable, trivially copyable record of four
//! C-convention callbacks (allocate, reallocate, free, bulk copy). The
//! default handle binds the system allocator; embedders that pool or
//! instrument memory provide their own hooks via
//! [`ByteBufferAllocator::with_hooks`].
//!
//! The handle performs no allocation itself and is safe to copy into every
//! storage region it ever produced: a region is always released through the
//! same hooks that created it.

use std::ffi::c_void;
use std::fmt;

use crate::buffer::ByteBuffer;

/// Returns a region of at least the requested size, or null on failure.
///
/// The contents of the region are indeterminate. A zero-byte request is
/// allowed and may return null; that sentinel must survive a later pass
/// through [`FreeFn`].
pub type AllocateFn = unsafe extern "C" fn(usize) -> *mut c_void;

/// Grows or shrinks a region, preserving the first `min(old, new)` bytes.
///
/// The region may move; the returned pointer supersedes the argument.
/// Passing null behaves like [`AllocateFn`].
pub type ReallocateFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

/// Releases a region previously returned by [`AllocateFn`] or
/// [`ReallocateFn`]. Must tolerate the null sentinel from a zero-byte
/// allocation.
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Bulk copy between non-overlapping regions (`memcpy` semantics).
pub type CopyFn = unsafe extern "C" fn(*mut c_void, *const c_void, usize) -> *mut c_void;

/// An immutable bundle of allocation hooks shared by buffers and their
/// storage.
///
/// Cloning the handle copies four function pointers; handles never own
/// memory and may be used concurrently from any number of buffers.
///
/// # Examples
///
/// ```
/// use wirebuf::ByteBufferAllocator;
///
/// let allocator = ByteBufferAllocator::new();
/// let mut buffer = allocator.buffer(256);
/// buffer.write_bytes(b"hello");
/// assert_eq!(buffer.readable_bytes(), 5);
/// ```
#[derive(Clone, Copy)]
pub struct ByteBufferAllocator {
    allocate: AllocateFn,
    reallocate: ReallocateFn,
    free: FreeFn,
    copy: CopyFn,
}

impl ByteBufferAllocator {
    /// Creates a handle bound to the system allocator
    /// (`malloc`/`realloc`/`free`/`memcpy`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocate: libc::malloc,
            reallocate: libc::realloc,
            free: libc::free,
            copy: libc::memcpy,
        }
    }

    /// Creates a handle from explicit hooks.
    ///
    /// The hooks must uphold the contracts documented on the type aliases:
    /// in particular, `reallocate` preserves the byte prefix and `free`
    /// accepts the null sentinel a zero-byte `allocate` may produce.
    #[must_use]
    pub fn with_hooks(
        allocate: AllocateFn,
        reallocate: ReallocateFn,
        free: FreeFn,
        copy: CopyFn,
    ) -> Self {
        Self {
            allocate,
            reallocate,
            free,
            copy,
        }
    }

    /// Allocates a new buffer able to hold at least `capacity` bytes without
    /// growing.
    ///
    /// The actual capacity is rounded up to the next power of two; a zero
    /// request yields a zero-capacity buffer whose first write allocates.
    /// Reader and writer indices start at zero.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds `u32::MAX` or the allocation hook fails.
    #[must_use]
    pub fn buffer(&self, capacity: usize) -> ByteBuffer {
        ByteBuffer::allocate(*self, capacity)
    }

    /// Calls the allocate hook.
    ///
    /// # Safety
    ///
    /// The caller takes ownership of the returned region and must release it
    /// through [`Self::raw_free`] on the same handle.
    pub(crate) unsafe fn raw_allocate(&self, nbytes: usize) -> *mut u8 {
        unsafe { (self.allocate)(nbytes).cast::<u8>() }
    }

    /// Calls the reallocate hook.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this handle's allocate or reallocate hook
    /// and must not be used again; the returned pointer supersedes it.
    pub(crate) unsafe fn raw_reallocate(&self, ptr: *mut u8, nbytes: usize) -> *mut u8 {
        unsafe { (self.reallocate)(ptr.cast::<c_void>(), nbytes).cast::<u8>() }
    }

    /// Calls the free hook.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this handle's allocate or reallocate hook
    /// (the null sentinel from a zero-byte allocation is accepted) and must
    /// not be used afterwards.
    pub(crate) unsafe fn raw_free(&self, ptr: *mut u8) {
        unsafe { (self.free)(ptr.cast::<c_void>()) }
    }

    /// Calls the bulk-copy hook.
    ///
    /// # Safety
    ///
    /// `dst` and `src` must be valid for `nbytes` bytes and must not
    /// overlap.
    pub(crate) unsafe fn raw_copy(&self, dst: *mut u8, src: *const u8, nbytes: usize) {
        unsafe {
            (self.copy)(dst.cast::<c_void>(), src.cast::<c_void>(), nbytes);
        }
    }
}

impl Default for ByteBufferAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ByteBufferAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBufferAllocator")
            .field("allocate", &format_args!("{:#x}", self.allocate as usize))
            .field("reallocate", &format_args!("{:#x}", self.reallocate as usize))
            .field("free", &format_args!("{:#x}", self.free as usize))
            .field("copy", &format_args!("{:#x}", self.copy as usize))
            .finish()
    }
}
