//! Scoped raw views for direct I/O into buffer memory.
//!
//! Socket and codec code wants to hand a contiguous memory region straight
//! to a syscall or a parser without intermediate copies. The view methods
//! here yield that region to a caller-supplied closure:
//!
//! - [`ByteBuffer::with_readable_bytes`] - read-only readable window
//! - [`ByteBuffer::with_readable_bytes_mut`] - mutable readable window
//! - [`ByteBuffer::with_writable_bytes_mut`] - mutable writable window
//! - [`ByteBuffer::write_with`] - writable window that advances the writer
//!   index by however many bytes the closure reports written
//!
//! Views cannot outlive their closure: the borrow checker pins each slice to
//! the buffer borrow, which is exactly the "must not escape the dynamic
//! extent" rule the storage engine needs. When a caller genuinely has to
//! keep the bytes alive past the call - a completion-based I/O submission,
//! say - [`ByteBuffer::with_readable_bytes_and_storage`] additionally hands
//! over a [`StorageHandle`] that pins the storage region for as long as the
//! handle (or any clone of it) is held.
//!
//! Mutable views diverge shared storage first, like every other mutation.
//! The writable window's contents are indeterminate: closures may read it,
//! but the values are unspecified until written.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::buffer::{to_u32, ByteBuffer};
use crate::storage::Storage;

/// An opaque guard that keeps a buffer's storage region alive.
///
/// Obtained from [`ByteBuffer::with_readable_bytes_and_storage`]. Cloning
/// retains the region again; dropping releases it. While any handle is
/// live the storage counts as shared, so the owning buffer's next mutation
/// copies instead of writing in place - the pinned bytes never change
/// underneath the holder.
#[derive(Clone)]
pub struct StorageHandle {
    storage: Arc<Storage>,
}

impl StorageHandle {
    /// Address of the pinned region, for correlation with diagnostics.
    #[must_use]
    pub fn region_address(&self) -> usize {
        self.storage.base_address()
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("region", &format_args!("{:#x}", self.storage.base_address()))
            .field("capacity", &self.storage.capacity())
            .finish()
    }
}

impl ByteBuffer {
    /// Yields the readable window to `body` and returns its result.
    pub fn with_readable_bytes<R>(&self, body: impl FnOnce(&[u8]) -> R) -> R {
        body(self.readable_slice())
    }

    /// Yields the readable window mutably to `body` and returns its result.
    ///
    /// Diverges shared storage first, so the mutation is invisible to any
    /// other buffer.
    pub fn with_readable_bytes_mut<R>(&mut self, body: impl FnOnce(&mut [u8]) -> R) -> R {
        self.ensure_unique();
        let offset = self.window().lo + self.reader_index32();
        let len = self.writer_index32() - self.reader_index32();
        // SAFETY: the range is the readable window, storage was just made
        // unique, and `self` stays mutably borrowed for the whole call.
        let slice = unsafe { self.storage_ref().bytes_mut(offset, len) };
        body(slice)
    }

    /// Yields the writable window mutably to `body` and returns its result.
    ///
    /// The window's contents are indeterminate until written. The writer
    /// index does not move; pair with
    /// [`move_writer_index_forward_by`](ByteBuffer::move_writer_index_forward_by)
    /// or use [`write_with`](ByteBuffer::write_with) instead.
    pub fn with_writable_bytes_mut<R>(&mut self, body: impl FnOnce(&mut [u8]) -> R) -> R {
        self.ensure_unique();
        let offset = self.window().lo + self.writer_index32();
        let len = self.capacity32() - self.writer_index32();
        // SAFETY: the range is the writable window, storage was just made
        // unique, and `self` stays mutably borrowed for the whole call.
        let slice = unsafe { self.storage_ref().bytes_mut(offset, len) };
        body(slice)
    }

    /// Yields the writable window to `body`; the closure returns how many
    /// bytes it wrote, and the writer index advances by that much.
    ///
    /// This is the direct-I/O write path: hand the region to a `read(2)`-style
    /// call and report the byte count back.
    ///
    /// # Panics
    ///
    /// Panics when `body` claims to have written more bytes than the window
    /// held.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebuf::ByteBufferAllocator;
    ///
    /// let mut buf = ByteBufferAllocator::new().buffer(64);
    /// let written = buf.write_with(|region| {
    ///     region[..4].copy_from_slice(b"ping");
    ///     4
    /// });
    /// assert_eq!(written, 4);
    /// assert_eq!(buf.read_bytes(4).unwrap(), b"ping");
    /// ```
    pub fn write_with(&mut self, body: impl FnOnce(&mut [u8]) -> usize) -> usize {
        let written = self.with_writable_bytes_mut(|region| {
            let available = region.len();
            let written = body(region);
            assert!(
                written <= available,
                "writer claimed {written} bytes but only {available} were writable"
            );
            written
        });
        self.advance_writer_index32(to_u32(written, "written length"));
        written
    }

    /// Yields the readable window together with a [`StorageHandle`] pinning
    /// the underlying region.
    ///
    /// The slice itself still cannot escape `body`, but the handle can: the
    /// region stays allocated (and the bytes stay stable) until every clone
    /// of the handle is dropped.
    pub fn with_readable_bytes_and_storage<R>(
        &self,
        body: impl FnOnce(&[u8], StorageHandle) -> R,
    ) -> R {
        let handle = StorageHandle {
            storage: Arc::clone(self.storage_ref()),
        };
        body(self.readable_slice(), handle)
    }
}

/// Appends at the writer index, growing as needed; never fails.
impl io::Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumes from the reader index; returns `Ok(0)` once nothing is
/// readable.
impl io::Read for ByteBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.readable_bytes());
        if len > 0 {
            buf[..len].copy_from_slice(&self.readable_slice()[..len]);
            self.advance_reader_index32(to_u32(len, "read length"));
        }
        Ok(len)
    }
}
