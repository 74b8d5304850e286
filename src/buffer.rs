//! The copy-on-write buffer value.
//!
//! [`ByteBuffer`] is the universal byte carrier for pipeline stages: frames
//! read from sockets, partially parsed protocol units, outbound payloads.
//! It is a value type - three 32-bit indices and a storage reference - that
//! can be passed, cloned, and sliced without copying bytes. The first write
//! through any sharer diverges its storage (copy-on-write), so no write
//! through one buffer is ever observed through another.
//!
//! # Index discipline
//!
//! The buffer keeps a *reader index* and a *writer index*, both relative to
//! its window origin:
//!
//! ```text
//! +-------------------+------------------+------------------+
//! | discardable bytes |  readable bytes  |  writable bytes  |
//! +-------------------+------------------+------------------+
//! 0            readerIndex        writerIndex          capacity
//! ```
//!
//! `read_*` operations consult and advance the reader index; `write_*`
//! operations fill at the writer index and advance it. `get_*`/`set_*` are
//! index-agnostic random access and inherently trust the caller: reading a
//! range that was never written is allowed and yields unspecified (but
//! non-trapping) values.
//!
//! # Fatal misuse
//!
//! Structural contract violations - indices out of range, capacity
//! arithmetic past `u32::MAX` - are programming errors and panic. The only
//! recoverable sentinels are the `Option` returns of [`ByteBuffer::get_slice`],
//! [`ByteBuffer::read_bytes`], and [`ByteBuffer::read_slice`].

use std::fmt;
use std::hash;
use std::sync::Arc;

use crate::alloc::ByteBufferAllocator;
use crate::storage::{next_pow2_clamped, SliceWindow, Storage};
use crate::tracing_compat::trace;

/// Narrows a value arriving at the public API edge into the 32-bit index
/// space the buffer operates in. Anything larger is a caller bug.
#[inline]
pub(crate) fn to_u32(n: usize, what: &str) -> u32 {
    u32::try_from(n).unwrap_or_else(|_| panic!("{what} {n} exceeds the 32-bit index space"))
}

/// A windowed, copy-on-write view over reference-counted byte storage.
///
/// Cloning shares storage and is O(1); the clone's indices and window move
/// independently. Mutation through any sharer copies first, so clones are
/// byte-isolated from the moment either side writes.
///
/// # Examples
///
/// ```
/// use wirebuf::ByteBufferAllocator;
///
/// let mut buf = ByteBufferAllocator::new().buffer(16);
/// buf.write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]);
///
/// let snapshot = buf.clone();
/// buf.set_bytes(&[0x00], 0);
///
/// assert_eq!(buf.get_bytes(0, 1), &[0x00]);
/// assert_eq!(snapshot.get_bytes(0, 1), &[0xDE]);
/// ```
#[derive(Clone)]
pub struct ByteBuffer {
    storage: Arc<Storage>,
    slice: SliceWindow,
    reader_index: u32,
    writer_index: u32,
}

impl ByteBuffer {
    /// Allocates a buffer through `allocator`; see
    /// [`ByteBufferAllocator::buffer`].
    pub(crate) fn allocate(allocator: ByteBufferAllocator, capacity: usize) -> ByteBuffer {
        let storage = Storage::allocate(allocator, to_u32(capacity, "requested capacity"));
        let slice = storage.full_slice();
        ByteBuffer {
            storage,
            slice,
            reader_index: 0,
            writer_index: 0,
        }
    }

    // === Accessors ===

    /// Offset of the next byte a sequential read consumes.
    #[inline]
    #[must_use]
    pub fn reader_index(&self) -> usize {
        self.reader_index as usize
    }

    /// Offset of the next byte a sequential write produces.
    #[inline]
    #[must_use]
    pub fn writer_index(&self) -> usize {
        self.writer_index as usize
    }

    /// Bytes between the reader and writer indices; these are the bytes a
    /// sequential read may consume, and they are guaranteed initialized.
    #[inline]
    #[must_use]
    pub fn readable_bytes(&self) -> usize {
        (self.writer_index - self.reader_index) as usize
    }

    /// Bytes between the writer index and capacity; contents indeterminate.
    #[inline]
    #[must_use]
    pub fn writable_bytes(&self) -> usize {
        (self.capacity32() - self.writer_index) as usize
    }

    /// Total bytes visible through this buffer's window.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slice.len() as usize
    }

    #[inline]
    pub(crate) fn capacity32(&self) -> u32 {
        self.slice.len()
    }

    // === Index motion ===

    /// Moves the reader index to an absolute offset.
    ///
    /// # Panics
    ///
    /// Panics when `offset` is past the writer index.
    pub fn move_reader_index_to(&mut self, offset: usize) {
        let offset = to_u32(offset, "reader index");
        assert!(
            offset <= self.writer_index,
            "reader index {offset} would pass the writer index {}",
            self.writer_index
        );
        self.reader_index = offset;
    }

    /// Moves the reader index forward by `delta` bytes.
    ///
    /// # Panics
    ///
    /// Panics when the target is past the writer index.
    pub fn move_reader_index_forward_by(&mut self, delta: usize) {
        let target = self
            .reader_index()
            .checked_add(delta)
            .expect("reader index overflows");
        self.move_reader_index_to(target);
    }

    /// Moves the writer index to an absolute offset.
    ///
    /// # Panics
    ///
    /// Panics when `offset` is past the capacity or below the reader index.
    pub fn move_writer_index_to(&mut self, offset: usize) {
        let offset = to_u32(offset, "writer index");
        assert!(
            offset <= self.capacity32(),
            "writer index {offset} would pass the capacity {}",
            self.capacity32()
        );
        assert!(
            offset >= self.reader_index,
            "writer index {offset} would fall behind the reader index {}",
            self.reader_index
        );
        self.writer_index = offset;
    }

    /// Moves the writer index forward by `delta` bytes.
    ///
    /// # Panics
    ///
    /// Panics when the target is past the capacity.
    pub fn move_writer_index_forward_by(&mut self, delta: usize) {
        let target = self
            .writer_index()
            .checked_add(delta)
            .expect("writer index overflows");
        self.move_writer_index_to(target);
    }

    // === Copy-on-write machinery ===

    /// True when this buffer holds the only reference to its storage.
    ///
    /// This is an atomic strong-count probe; a concurrent clone taken from
    /// another thread before the probe is already counted, so a `true`
    /// answer is stable for the duration of the `&mut self` borrow.
    fn storage_is_unique(&mut self) -> bool {
        Arc::get_mut(&mut self.storage).is_some()
    }

    /// Diverges from shared storage if necessary, without growing.
    pub(crate) fn ensure_unique(&mut self) {
        if !self.storage_is_unique() {
            self.copy_storage_and_rebase(0, false);
        }
    }

    /// Replaces the storage with a fresh region seeded from this buffer's
    /// window, rebased to offset zero, with `extra_capacity` bytes of
    /// headroom. With `reset_indices`, only the bytes from the reader index
    /// up survive and both cursors shift down by the old reader index.
    fn copy_storage_and_rebase(&mut self, extra_capacity: u32, reset_indices: bool) {
        let index_shift = if reset_indices { self.reader_index } else { 0 };
        let window = SliceWindow::new(self.slice.lo + index_shift, self.slice.hi);
        let target = u64::from(self.capacity32()) + u64::from(extra_capacity);
        assert!(
            target <= u64::from(u32::MAX),
            "buffer capacity {target} exceeds the 32-bit index space"
        );
        trace!(
            capacity = self.capacity32(),
            extra_capacity,
            reset_indices,
            "copy-on-write divergence"
        );
        self.storage = self.storage.reallocate_slice(window, target as u32);
        self.slice = self.storage.full_slice();
        self.reader_index -= index_shift;
        self.writer_index -= index_shift;
    }

    /// Grows this buffer so `need` bytes fit at `at_index`, doubling the
    /// window capacity until the request fits. Storage must already be
    /// uniquely owned.
    ///
    /// A window can be narrower than its region (a slice whose parent was
    /// dropped, or a shared `clear` that trimmed the window below the
    /// rounded allocation), so the window first extends into whatever
    /// headroom the region already has; the region is reallocated in place
    /// only when the rounded target passes its real capacity.
    fn ensure_available_capacity(&mut self, need: u32, at_index: u32) {
        debug_assert!(
            self.storage_is_unique(),
            "growth requires uniquely owned storage"
        );
        let fits = u64::from(self.slice.lo) + u64::from(at_index) + u64::from(need)
            <= u64::from(self.slice.hi);
        if fits {
            return;
        }
        let mut new_capacity = self.capacity32().max(1);
        while new_capacity < at_index || new_capacity - at_index < need {
            new_capacity = match new_capacity.checked_mul(2) {
                Some(doubled) => doubled,
                None => {
                    assert!(
                        u64::from(at_index) + u64::from(need) <= u64::from(u32::MAX),
                        "buffer cannot grow past u32::MAX bytes \
                         (index {at_index}, need {need})"
                    );
                    u32::MAX
                }
            };
        }
        let storage_target = u64::from(self.slice.lo) + u64::from(new_capacity);
        assert!(
            storage_target <= u64::from(u32::MAX),
            "buffer cannot grow past u32::MAX bytes (index {at_index}, need {need})"
        );
        let storage_target = storage_target as u32;
        if storage_target > self.storage.capacity() {
            let storage =
                Arc::get_mut(&mut self.storage).expect("storage uniqueness checked above");
            storage.grow_in_place(next_pow2_clamped(storage_target));
        }
        self.slice = SliceWindow::new(self.slice.lo, self.slice.lo + new_capacity);
    }

    /// Makes the buffer uniquely owned and large enough for `need` bytes at
    /// `index`, copying and growing as required.
    fn ensure_unique_and_capacity(&mut self, index: u32, need: u32) {
        let end = u64::from(index) + u64::from(need);
        assert!(
            end <= u64::from(u32::MAX),
            "write of {need} bytes at {index} exceeds the 32-bit index space"
        );
        if !self.storage_is_unique() {
            let extra = (end as u32).saturating_sub(self.capacity32());
            self.copy_storage_and_rebase(extra, false);
        }
        self.ensure_available_capacity(need, index);
    }

    // === Random access ===

    /// Read-only view of `length` bytes starting at absolute offset `at`.
    ///
    /// The range is index-agnostic: it may cover bytes outside the readable
    /// window. Bytes that were never written hold unspecified (but
    /// non-trapping) values - callers must ensure they have written the
    /// range before interpreting it.
    ///
    /// # Panics
    ///
    /// Panics when `at + length` exceeds the capacity.
    #[must_use]
    pub fn get_bytes(&self, at: usize, length: usize) -> &[u8] {
        let at = to_u32(at, "get index");
        let length = to_u32(length, "get length");
        let end = u64::from(at) + u64::from(length);
        assert!(
            end <= u64::from(self.capacity32()),
            "get of {length} bytes at {at} is outside capacity {}",
            self.capacity32()
        );
        // SAFETY: bounds checked against the window just above; writes to
        // this storage require `&mut` on the sole owning buffer, which the
        // shared borrow of `self` excludes.
        unsafe { self.storage.bytes(self.slice.lo + at, length) }
    }

    /// Copies `bytes` into the buffer starting at absolute offset `at`,
    /// growing the buffer when the range extends past the capacity.
    ///
    /// The writer index does not move. Returns the number of bytes copied.
    ///
    /// # Panics
    ///
    /// Panics when `at + bytes.len()` exceeds `u32::MAX`.
    pub fn set_bytes(&mut self, bytes: &[u8], at: usize) -> usize {
        let at = to_u32(at, "set index");
        let length = to_u32(bytes.len(), "source length");
        self.ensure_unique_and_capacity(at, length);
        if length > 0 {
            // SAFETY: capacity for `length` bytes at `at` was just ensured,
            // the storage is uniquely owned, and a `&[u8]` argument cannot
            // alias our region while `self` is mutably borrowed.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    self.storage.ptr_at(self.slice.lo + at),
                    length as usize,
                );
            }
        }
        length as usize
    }

    /// Copies an arbitrary byte sequence into the buffer starting at
    /// absolute offset `at`, growing as the sequence unfolds.
    ///
    /// The sequence's `size_hint` lower bound seeds the initial capacity;
    /// longer sequences grow the buffer element by element. The writer index
    /// does not move. Returns the number of bytes copied.
    ///
    /// Prefer [`ByteBuffer::set_bytes`] for contiguous sources - it copies
    /// in one bulk operation. The post-state of both variants is identical.
    ///
    /// # Panics
    ///
    /// Panics when the written range would extend past `u32::MAX`.
    pub fn set_bytes_iter<I>(&mut self, bytes: I, at: usize) -> usize
    where
        I: IntoIterator<Item = u8>,
    {
        let at = to_u32(at, "set index");
        let iter = bytes.into_iter();
        let hint = to_u32(iter.size_hint().0, "source length hint");
        self.ensure_unique_and_capacity(at, hint);
        let mut index = at;
        for byte in iter {
            if index >= self.capacity32() {
                self.ensure_unique_and_capacity(index, 1);
            }
            // SAFETY: `index < capacity` after the growth check, and the
            // storage is uniquely owned throughout the loop.
            unsafe {
                self.storage.ptr_at(self.slice.lo + index).write(byte);
            }
            index = index
                .checked_add(1)
                .expect("set index overflows the 32-bit index space");
        }
        (index - at) as usize
    }

    // === Sequential access ===

    /// Reads `length` bytes from the reader index, advancing it.
    ///
    /// Returns `None` when fewer than `length` bytes are readable.
    #[must_use]
    pub fn read_bytes(&mut self, length: usize) -> Option<Vec<u8>> {
        if length > self.readable_bytes() {
            return None;
        }
        let bytes = self.get_bytes(self.reader_index(), length).to_vec();
        self.reader_index += length as u32;
        Some(bytes)
    }

    /// Reads `length` bytes from the reader index as a zero-copy slice,
    /// advancing the reader index.
    ///
    /// Returns `None` when fewer than `length` bytes are readable.
    #[must_use]
    pub fn read_slice(&mut self, length: usize) -> Option<ByteBuffer> {
        if length > self.readable_bytes() {
            return None;
        }
        let slice = self.get_slice(self.reader_index(), length);
        debug_assert!(slice.is_some(), "readable range is always in capacity");
        self.reader_index += length as u32;
        slice
    }

    /// Writes `bytes` at the writer index and advances it.
    ///
    /// Grows the buffer as needed. Returns the number of bytes written.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        let written = self.set_bytes(bytes, self.writer_index());
        self.writer_index += written as u32;
        written
    }

    /// Writes `count` copies of `byte` at the writer index and advances it.
    ///
    /// Grows the buffer as needed. Returns the number of bytes written.
    pub fn write_repeating_byte(&mut self, byte: u8, count: usize) -> usize {
        let count = to_u32(count, "write length");
        let index = self.writer_index;
        self.ensure_unique_and_capacity(index, count);
        if count > 0 {
            // SAFETY: capacity for `count` bytes at the writer index was
            // just ensured and the storage is uniquely owned.
            unsafe {
                self.storage
                    .ptr_at(self.slice.lo + index)
                    .write_bytes(byte, count as usize);
            }
        }
        self.writer_index += count;
        count as usize
    }

    // === Capacity management ===

    /// Changes the capacity to at least `new_capacity` bytes (subject to
    /// power-of-two rounding), copying the window into fresh storage.
    ///
    /// A no-op when the buffer already spans its whole storage at exactly
    /// the requested capacity. Shrinking is allowed down to the writer
    /// index; indices are unchanged.
    ///
    /// # Panics
    ///
    /// Panics when `new_capacity` is below the writer index.
    pub fn change_capacity(&mut self, new_capacity: usize) {
        let new_capacity = to_u32(new_capacity, "target capacity");
        assert!(
            new_capacity >= self.writer_index,
            "target capacity {new_capacity} is below the writer index {}",
            self.writer_index
        );
        if new_capacity == self.storage.capacity() && self.slice == self.storage.full_slice() {
            return;
        }
        self.storage = self.storage.reallocate_slice(self.slice, new_capacity);
        self.slice = self.storage.full_slice();
    }

    /// Ensures at least `minimum_writable` bytes can be written without
    /// another allocation, copying and growing as required.
    pub fn reserve_capacity(&mut self, minimum_writable: usize) {
        let need = to_u32(minimum_writable, "writable reservation");
        if u64::from(self.writer_index) + u64::from(need) <= u64::from(self.capacity32()) {
            return;
        }
        self.ensure_unique_and_capacity(self.writer_index, need);
    }

    // === Structural operations ===

    /// Returns a zero-copy slice of `length` bytes starting at absolute
    /// offset `at`, sharing storage with this buffer.
    ///
    /// The slice sees exactly that range as its whole capacity, with
    /// `reader_index == 0` and `writer_index == length`. It moves its
    /// indices independently, and mutation through either side diverges the
    /// storage first.
    ///
    /// Returns `None` when `at + length` exceeds the capacity.
    #[must_use]
    pub fn get_slice(&self, at: usize, length: usize) -> Option<ByteBuffer> {
        if (at as u64) + (length as u64) > u64::from(self.capacity32()) {
            return None;
        }
        let at = at as u32;
        let length = length as u32;
        Some(ByteBuffer {
            storage: Arc::clone(&self.storage),
            slice: SliceWindow::new(self.slice.lo + at, self.slice.lo + at + length),
            reader_index: 0,
            writer_index: length,
        })
    }

    /// Shifts the readable bytes down to the window origin, reclaiming the
    /// space before the reader index for future writes.
    ///
    /// Returns `false` (and does nothing) when the reader index is already
    /// zero. On shared storage the readable bytes move into a fresh region
    /// instead of shifting in place.
    pub fn discard_read_bytes(&mut self) -> bool {
        if self.reader_index == 0 {
            return false;
        }
        if self.storage_is_unique() {
            let readable = self.writer_index - self.reader_index;
            if readable > 0 {
                // SAFETY: both ranges are inside the window and the storage
                // is uniquely owned; `ptr::copy` tolerates the overlap
                // between the readable window and its destination.
                unsafe {
                    std::ptr::copy(
                        self.storage.ptr_at(self.slice.lo + self.reader_index),
                        self.storage.ptr_at(self.slice.lo),
                        readable as usize,
                    );
                }
            }
            self.writer_index = readable;
            self.reader_index = 0;
        } else {
            self.copy_storage_and_rebase(0, true);
        }
        true
    }

    /// Resets both indices to zero, making the whole capacity writable.
    ///
    /// No bytes are copied. On uniquely owned storage nothing is allocated
    /// either - the old bytes simply become indeterminate. On shared
    /// storage a fresh region of the same capacity replaces the shared one,
    /// leaving the other sharers untouched.
    pub fn clear(&mut self) {
        if !self.storage_is_unique() {
            let capacity = self.capacity32();
            trace!(capacity, "clear on shared storage allocates fresh region");
            self.storage = Storage::allocate(self.storage.allocator(), capacity);
            self.slice = SliceWindow::new(0, capacity);
        }
        self.reader_index = 0;
        self.writer_index = 0;
    }

    /// The readable window as a slice.
    pub(crate) fn readable_slice(&self) -> &[u8] {
        // SAFETY: `[reader_index, writer_index)` is inside the window by the
        // index invariant, and those bytes are initialized by contract.
        unsafe {
            self.storage.bytes(
                self.slice.lo + self.reader_index,
                self.writer_index - self.reader_index,
            )
        }
    }

    pub(crate) fn storage_ref(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub(crate) fn window(&self) -> SliceWindow {
        self.slice
    }

    pub(crate) fn reader_index32(&self) -> u32 {
        self.reader_index
    }

    pub(crate) fn writer_index32(&self) -> u32 {
        self.writer_index
    }

    pub(crate) fn advance_writer_index32(&mut self, delta: u32) {
        debug_assert!(self.writer_index + delta <= self.capacity32());
        self.writer_index += delta;
    }

    pub(crate) fn advance_reader_index32(&mut self, delta: u32) {
        debug_assert!(self.reader_index + delta <= self.writer_index);
        self.reader_index += delta;
    }
}

/// Buffers compare equal iff their readable windows hold the same bytes.
///
/// Capacity, index positions, and storage identity do not participate
/// beyond a same-storage fast path. (Whether equality should instead span
/// `0..writer_index` is deliberately left as a documented alternative; the
/// readable-window rule is what ships.)
impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        if self.readable_bytes() != other.readable_bytes() {
            return false;
        }
        if Arc::ptr_eq(&self.storage, &other.storage)
            && self.slice == other.slice
            && self.reader_index == other.reader_index
        {
            return true;
        }
        self.readable_slice() == other.readable_slice()
    }
}

impl Eq for ByteBuffer {}

impl hash::Hash for ByteBuffer {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.readable_slice().hash(state);
    }
}

impl fmt::Display for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ByteBuffer {{ reader: {}, writer: {}, capacity: {}, slice: [{}, {}), \
             storage: {:#x} ({} bytes) }}",
            self.reader_index,
            self.writer_index,
            self.capacity32(),
            self.slice.lo,
            self.slice.hi,
            self.storage.base_address(),
            self.storage.capacity()
        )
    }
}

/// Maximum readable bytes rendered by the `Debug` hex dump.
const DEBUG_DUMP_LIMIT: usize = 1024;

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")?;
        let readable = self.readable_slice();
        let shown = &readable[..readable.len().min(DEBUG_DUMP_LIMIT)];
        write!(f, "\nreadable bytes (max {DEBUG_DUMP_LIMIT}):")?;
        for (offset, byte) in shown.iter().enumerate() {
            if offset % 16 == 0 {
                write!(f, "\n    ")?;
            }
            write!(f, "{byte:02x} ")?;
        }
        if readable.len() > shown.len() {
            write!(f, "\n    ... ({} more bytes)", readable.len() - shown.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn buffer(capacity: usize) -> ByteBuffer {
        ByteBufferAllocator::new().buffer(capacity)
    }

    #[test]
    fn test_fresh_buffer_indices() {
        init_test("test_fresh_buffer_indices");
        let buf = buffer(16);
        crate::assert_with_log!(buf.reader_index() == 0, "reader", 0_usize, buf.reader_index());
        crate::assert_with_log!(buf.writer_index() == 0, "writer", 0_usize, buf.writer_index());
        crate::assert_with_log!(buf.capacity() == 16, "capacity", 16_usize, buf.capacity());
        crate::assert_with_log!(
            buf.writable_bytes() == 16,
            "writable",
            16_usize,
            buf.writable_bytes()
        );
        crate::test_complete!("test_fresh_buffer_indices");
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        init_test("test_capacity_rounds_to_power_of_two");
        let buf = buffer(100);
        crate::assert_with_log!(buf.capacity() == 128, "capacity", 128_usize, buf.capacity());
        let empty = buffer(0);
        crate::assert_with_log!(empty.capacity() == 0, "zero", 0_usize, empty.capacity());
        crate::test_complete!("test_capacity_rounds_to_power_of_two");
    }

    #[test]
    fn test_set_get_round_trip() {
        init_test("test_set_get_round_trip");
        let mut buf = buffer(16);
        let written = buf.set_bytes(&[1, 2, 3, 4], 3);
        crate::assert_with_log!(written == 4, "written", 4_usize, written);
        let bytes = buf.get_bytes(3, 4);
        crate::assert_with_log!(bytes == [1, 2, 3, 4], "bytes", [1, 2, 3, 4], bytes);
        // set does not move the writer index
        crate::assert_with_log!(buf.writer_index() == 0, "writer", 0_usize, buf.writer_index());
        crate::test_complete!("test_set_get_round_trip");
    }

    #[test]
    fn test_set_bytes_grows_past_capacity() {
        init_test("test_set_bytes_grows_past_capacity");
        let mut buf = buffer(4);
        let written = buf.set_bytes(&[9; 10], 2);
        crate::assert_with_log!(written == 10, "written", 10_usize, written);
        crate::assert_with_log!(buf.capacity() >= 12, "capacity", 12_usize, buf.capacity());
        let bytes = buf.get_bytes(2, 10);
        crate::assert_with_log!(bytes == [9; 10], "bytes", [9_u8; 10], bytes);
        crate::test_complete!("test_set_bytes_grows_past_capacity");
    }

    #[test]
    fn test_set_bytes_iter_matches_contiguous_set() {
        init_test("test_set_bytes_iter_matches_contiguous_set");
        let mut direct = buffer(8);
        let mut via_iter = buffer(8);
        let data = [5_u8, 6, 7, 8, 9];
        direct.set_bytes(&data, 1);
        let written = via_iter.set_bytes_iter(data.iter().copied(), 1);
        crate::assert_with_log!(written == 5, "written", 5_usize, written);
        let a = direct.get_bytes(1, 5);
        let b = via_iter.get_bytes(1, 5);
        crate::assert_with_log!(a == b, "post-state identical", a, b);
        crate::test_complete!("test_set_bytes_iter_matches_contiguous_set");
    }

    #[test]
    fn test_set_bytes_iter_grows_past_size_hint() {
        init_test("test_set_bytes_iter_grows_past_size_hint");
        let mut buf = buffer(1);
        // An iterator whose size_hint underestimates its true length.
        let iter = (0..200_u32).map(|n| (n % 251) as u8).filter(|_| true);
        let written = buf.set_bytes_iter(iter, 0);
        crate::assert_with_log!(written == 200, "written", 200_usize, written);
        let expected: Vec<u8> = (0..200_u32).map(|n| (n % 251) as u8).collect();
        let bytes = buf.get_bytes(0, 200);
        crate::assert_with_log!(bytes == expected, "bytes", &expected, bytes);
        crate::test_complete!("test_set_bytes_iter_grows_past_size_hint");
    }

    #[test]
    fn test_write_read_sequential() {
        init_test("test_write_read_sequential");
        let mut buf = buffer(16);
        buf.write_bytes(&[0xDE, 0xAD]);
        buf.write_bytes(&[0xBE, 0xEF]);
        crate::assert_with_log!(buf.writer_index() == 4, "writer", 4_usize, buf.writer_index());
        let first = buf.read_bytes(3).expect("3 bytes are readable");
        crate::assert_with_log!(first == [0xDE, 0xAD, 0xBE], "first", [0xDE, 0xAD, 0xBE], first);
        crate::assert_with_log!(buf.reader_index() == 3, "reader", 3_usize, buf.reader_index());
        let missing = buf.read_bytes(2);
        crate::assert_with_log!(missing.is_none(), "underflow is None", true, missing.is_none());
        crate::test_complete!("test_write_read_sequential");
    }

    #[test]
    fn test_write_repeating_byte() {
        init_test("test_write_repeating_byte");
        let mut buf = buffer(2);
        let written = buf.write_repeating_byte(0x41, 100);
        crate::assert_with_log!(written == 100, "written", 100_usize, written);
        let bytes = buf.read_bytes(100).expect("100 bytes are readable");
        crate::assert_with_log!(bytes == [0x41; 100], "bytes", [0x41_u8; 100], bytes);
        crate::test_complete!("test_write_repeating_byte");
    }

    #[test]
    fn test_clone_is_isolated_after_write() {
        init_test("test_clone_is_isolated_after_write");
        let mut original = buffer(16);
        original.write_bytes(&[1, 2, 3, 4]);
        let mut cloned = original.clone();
        cloned.set_bytes(&[9, 9], 0);
        let original_bytes = original.get_bytes(0, 4);
        crate::assert_with_log!(
            original_bytes == [1, 2, 3, 4],
            "original untouched",
            [1, 2, 3, 4],
            original_bytes
        );
        let cloned_bytes = cloned.get_bytes(0, 4);
        crate::assert_with_log!(
            cloned_bytes == [9, 9, 3, 4],
            "clone diverged",
            [9, 9, 3, 4],
            cloned_bytes
        );
        crate::test_complete!("test_clone_is_isolated_after_write");
    }

    #[test]
    fn test_slice_shares_then_diverges() {
        init_test("test_slice_shares_then_diverges");
        let mut parent = buffer(16);
        parent.write_bytes(&[0xCA, 0xFE, 0xBA, 0xBE, 0x01, 0x02]);
        let mut child = parent.get_slice(2, 4).expect("range is in capacity");
        crate::assert_with_log!(child.capacity() == 4, "capacity", 4_usize, child.capacity());
        crate::assert_with_log!(
            child.reader_index() == 0,
            "reader",
            0_usize,
            child.reader_index()
        );
        crate::assert_with_log!(
            child.writer_index() == 4,
            "writer",
            4_usize,
            child.writer_index()
        );
        let view = child.get_bytes(0, 4).to_vec();
        crate::assert_with_log!(
            view == [0xBA, 0xBE, 0x01, 0x02],
            "window",
            [0xBA, 0xBE, 0x01, 0x02],
            view
        );
        child.set_bytes(&[0xFF], 0);
        let parent_byte = parent.get_bytes(2, 1);
        crate::assert_with_log!(parent_byte == [0xBA], "parent untouched", [0xBA], parent_byte);
        crate::test_complete!("test_slice_shares_then_diverges");
    }

    #[test]
    fn test_get_slice_bounds() {
        init_test("test_get_slice_bounds");
        let buf = buffer(8);
        let at_end = buf.get_slice(4, 4);
        crate::assert_with_log!(at_end.is_some(), "at+len == capacity", true, at_end.is_some());
        let past_end = buf.get_slice(4, 5);
        crate::assert_with_log!(past_end.is_none(), "past end is None", true, past_end.is_none());
        crate::test_complete!("test_get_slice_bounds");
    }

    #[test]
    fn test_sole_slice_grows_within_storage_headroom() {
        init_test("test_sole_slice_grows_within_storage_headroom");
        let mut parent = buffer(32);
        parent.write_bytes(&[1, 2, 3, 4, 5]);
        let mut child = parent.get_slice(0, 5).expect("range is in capacity");
        drop(parent);
        // The sole owner of a 32-byte region behind a 5-byte window: growth
        // extends the window into the existing headroom without touching
        // the allocator.
        let address_before = child.storage_ref().base_address();
        let written = child.write_bytes(&[9; 10]);
        crate::assert_with_log!(written == 10, "written", 10_usize, written);
        crate::assert_with_log!(
            child.capacity() >= 15,
            "window extended",
            15_usize,
            child.capacity()
        );
        let address_after = child.storage_ref().base_address();
        crate::assert_with_log!(
            address_after == address_before,
            "no reallocation",
            address_before,
            address_after
        );
        let bytes = child.get_bytes(0, 15);
        let expected = [1, 2, 3, 4, 5, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9];
        crate::assert_with_log!(bytes == expected, "contents", expected, bytes);
        crate::test_complete!("test_sole_slice_grows_within_storage_headroom");
    }

    #[test]
    fn test_sole_slice_grows_past_storage_headroom() {
        init_test("test_sole_slice_grows_past_storage_headroom");
        let mut parent = buffer(8);
        parent.write_bytes(&[1, 2, 3, 4, 5]);
        let mut child = parent.get_slice(0, 5).expect("range is in capacity");
        drop(parent);
        // 25 bytes cannot fit in the 8-byte region; the region itself must
        // grow, preserving the prefix.
        let written = child.write_bytes(&[7; 20]);
        crate::assert_with_log!(written == 20, "written", 20_usize, written);
        crate::assert_with_log!(
            child.capacity() >= 25,
            "window grown",
            25_usize,
            child.capacity()
        );
        let head = child.get_bytes(0, 5);
        crate::assert_with_log!(head == [1, 2, 3, 4, 5], "prefix kept", [1, 2, 3, 4, 5], head);
        let tail = child.get_bytes(5, 20);
        crate::assert_with_log!(tail == [7; 20], "tail", [7_u8; 20], tail);
        crate::test_complete!("test_sole_slice_grows_past_storage_headroom");
    }

    #[test]
    fn test_discard_read_bytes_in_place() {
        init_test("test_discard_read_bytes_in_place");
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2, 3, 4, 5, 6]);
        let _ = buf.read_bytes(2);
        let capacity_before = buf.capacity();
        let discarded = buf.discard_read_bytes();
        crate::assert_with_log!(discarded, "discarded", true, discarded);
        crate::assert_with_log!(buf.reader_index() == 0, "reader", 0_usize, buf.reader_index());
        crate::assert_with_log!(buf.writer_index() == 4, "writer", 4_usize, buf.writer_index());
        crate::assert_with_log!(
            buf.capacity() == capacity_before,
            "capacity preserved",
            capacity_before,
            buf.capacity()
        );
        let bytes = buf.get_bytes(0, 4);
        crate::assert_with_log!(bytes == [3, 4, 5, 6], "shifted", [3, 4, 5, 6], bytes);
        let again = buf.discard_read_bytes();
        crate::assert_with_log!(!again, "reader at zero is a no-op", false, again);
        crate::test_complete!("test_discard_read_bytes_in_place");
    }

    #[test]
    fn test_discard_read_bytes_on_shared_storage() {
        init_test("test_discard_read_bytes_on_shared_storage");
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2, 3, 4, 5, 6]);
        let snapshot = buf.clone();
        let _ = buf.read_bytes(4);
        let discarded = buf.discard_read_bytes();
        crate::assert_with_log!(discarded, "discarded", true, discarded);
        let bytes = buf.get_bytes(0, 2);
        crate::assert_with_log!(bytes == [5, 6], "shifted", [5, 6], bytes);
        let snapshot_bytes = snapshot.get_bytes(0, 6);
        crate::assert_with_log!(
            snapshot_bytes == [1, 2, 3, 4, 5, 6],
            "snapshot untouched",
            [1, 2, 3, 4, 5, 6],
            snapshot_bytes
        );
        crate::test_complete!("test_discard_read_bytes_on_shared_storage");
    }

    #[test]
    fn test_clear_unique_keeps_storage() {
        init_test("test_clear_unique_keeps_storage");
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2, 3]);
        let address_before = buf.storage_ref().base_address();
        buf.clear();
        crate::assert_with_log!(buf.reader_index() == 0, "reader", 0_usize, buf.reader_index());
        crate::assert_with_log!(buf.writer_index() == 0, "writer", 0_usize, buf.writer_index());
        crate::assert_with_log!(buf.capacity() == 16, "capacity", 16_usize, buf.capacity());
        let address_after = buf.storage_ref().base_address();
        crate::assert_with_log!(
            address_after == address_before,
            "no reallocation",
            address_before,
            address_after
        );
        crate::test_complete!("test_clear_unique_keeps_storage");
    }

    #[test]
    fn test_clear_shared_leaves_sharer_readable() {
        init_test("test_clear_shared_leaves_sharer_readable");
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2, 3]);
        let mut snapshot = buf.clone();
        buf.clear();
        crate::assert_with_log!(buf.capacity() == 16, "capacity", 16_usize, buf.capacity());
        crate::assert_with_log!(buf.writer_index() == 0, "writer", 0_usize, buf.writer_index());
        let bytes = snapshot.read_bytes(3).expect("snapshot still readable");
        crate::assert_with_log!(bytes == [1, 2, 3], "snapshot", [1, 2, 3], bytes);
        crate::test_complete!("test_clear_shared_leaves_sharer_readable");
    }

    #[test]
    fn test_change_capacity_noop_and_shrink() {
        init_test("test_change_capacity_noop_and_shrink");
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2, 3, 4]);
        let address_before = buf.storage_ref().base_address();
        buf.change_capacity(16);
        let address_after = buf.storage_ref().base_address();
        crate::assert_with_log!(
            address_after == address_before,
            "exact capacity is a no-op",
            address_before,
            address_after
        );
        buf.change_capacity(4);
        crate::assert_with_log!(buf.capacity() == 4, "shrunk", 4_usize, buf.capacity());
        let bytes = buf.get_bytes(0, 4);
        crate::assert_with_log!(bytes == [1, 2, 3, 4], "bytes kept", [1, 2, 3, 4], bytes);
        crate::test_complete!("test_change_capacity_noop_and_shrink");
    }

    #[test]
    #[should_panic(expected = "below the writer index")]
    fn test_change_capacity_below_writer_index_panics() {
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2, 3, 4]);
        buf.change_capacity(3);
    }

    #[test]
    #[should_panic(expected = "would pass the writer index")]
    fn test_move_reader_past_writer_panics() {
        let mut buf = buffer(16);
        buf.write_bytes(&[1, 2]);
        buf.move_reader_index_to(3);
    }

    #[test]
    #[should_panic(expected = "would pass the capacity")]
    fn test_move_writer_past_capacity_panics() {
        let mut buf = buffer(16);
        buf.move_writer_index_to(17);
    }

    #[test]
    #[should_panic(expected = "exceeds the 32-bit index space")]
    fn test_growth_past_u32_max_panics() {
        let mut buf = buffer(16);
        // The arithmetic check fires before any allocation is attempted.
        buf.set_bytes(&[0, 0], (u32::MAX - 1) as usize);
    }

    #[test]
    fn test_reserve_capacity() {
        init_test("test_reserve_capacity");
        let mut buf = buffer(4);
        buf.write_bytes(&[1, 2, 3]);
        buf.reserve_capacity(64);
        crate::assert_with_log!(
            buf.writable_bytes() >= 64,
            "writable after reserve",
            64_usize,
            buf.writable_bytes()
        );
        let bytes = buf.get_bytes(0, 3);
        crate::assert_with_log!(bytes == [1, 2, 3], "bytes kept", [1, 2, 3], bytes);
        crate::test_complete!("test_reserve_capacity");
    }

    #[test]
    fn test_equality_over_readable_window() {
        init_test("test_equality_over_readable_window");
        let mut a = buffer(16);
        a.write_bytes(&[0, 0, 7, 8, 9]);
        a.move_reader_index_to(2);
        let mut b = buffer(64);
        b.write_bytes(&[7, 8, 9]);
        crate::assert_with_log!(a == b, "offset irrelevant", true, a == b);
        crate::assert_with_log!(b == a, "symmetric", true, b == a);
        let _ = b.read_bytes(1);
        crate::assert_with_log!(a != b, "windows differ", true, a != b);
        crate::test_complete!("test_equality_over_readable_window");
    }

    #[test]
    fn test_equality_same_storage_fast_path() {
        init_test("test_equality_same_storage_fast_path");
        let mut a = buffer(16);
        a.write_bytes(&[1, 2, 3]);
        let b = a.clone();
        crate::assert_with_log!(a == b, "clone equal", true, a == b);
        crate::test_complete!("test_equality_same_storage_fast_path");
    }

    #[test]
    fn test_display_and_debug_render() {
        init_test("test_display_and_debug_render");
        let mut buf = buffer(16);
        buf.write_bytes(&[0xAB, 0xCD]);
        let display = format!("{buf}");
        let ok = display.contains("reader: 0") && display.contains("capacity: 16");
        crate::assert_with_log!(ok, "display summary", true, ok);
        let debug = format!("{buf:?}");
        let ok = debug.contains("ab cd");
        crate::assert_with_log!(ok, "debug hex dump", true, ok);
        crate::test_complete!("test_display_and_debug_render");
    }

    #[test]
    fn test_debug_dump_is_bounded() {
        init_test("test_debug_dump_is_bounded");
        let mut buf = buffer(16);
        buf.write_repeating_byte(0x55, 3000);
        let debug = format!("{buf:?}");
        let ok = debug.contains("... (1976 more bytes)");
        crate::assert_with_log!(ok, "dump bounded at 1024", true, ok);
        crate::test_complete!("test_debug_dump_is_bounded");
    }

    #[test]
    fn test_indeterminate_get_does_not_trap() {
        init_test("test_indeterminate_get_does_not_trap");
        let buf = buffer(32);
        // Never-written bytes hold unspecified values; the read must simply
        // not panic.
        let bytes = buf.get_bytes(0, 32);
        crate::assert_with_log!(bytes.len() == 32, "length", 32_usize, bytes.len());
        crate::test_complete!("test_indeterminate_get_does_not_trap");
    }
}
