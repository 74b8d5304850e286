//! Wirebuf: copy-on-write byte buffers for high-performance network I/O.
//!
//! # Overview
//!
//! Wirebuf provides the universal byte carrier for pipeline stages: frames
//! read from sockets, partially parsed protocol units, outbound payloads,
//! and slices handed between stages. A [`ByteBuffer`] is a small value -
//! a storage reference, a window, and two 32-bit cursors - designed to be
//! passed, cloned, and sliced by value without copying bytes until a write
//! forces divergence.
//!
//! # Core Guarantees
//!
//! - **Cheap sharing**: cloning and slicing are O(1); storage is
//!   reference-counted with an atomic count, so clones may cross threads
//! - **Write isolation**: no write through one buffer is ever observed
//!   through another - the first mutation of shared storage copies
//! - **Amortized growth**: capacities are powers of two and double until a
//!   request fits, clamped at `u32::MAX`
//! - **Split cursor discipline**: sequential `read_*`/`write_*` respect the
//!   reader/writer indices; random `get_*`/`set_*` trust the caller
//! - **Pluggable allocation**: every region flows through four C-convention
//!   hooks captured in a [`ByteBufferAllocator`], system-bound by default
//! - **No hidden suspension**: every operation is synchronous; misuse of the
//!   structural contracts panics rather than limping on
//!
//! # Module Structure
//!
//! - [`alloc`]: Allocator handles and the four allocation hooks
//! - [`buffer`]: The `ByteBuffer` value type and its operations
//! - [`views`]: Scoped raw views for direct I/O, storage lifetime handles
//! - [`tracing_compat`]: Feature-gated structured logging shims
//! - [`test_utils`]: Logging and assertion helpers shared by the test suites
//!
//! # Example
//!
//! ```
//! use wirebuf::ByteBufferAllocator;
//!
//! let allocator = ByteBufferAllocator::new();
//! let mut buf = allocator.buffer(64);
//!
//! buf.write_bytes(b"\x00\x2aping");
//! let header = buf.read_bytes(2).expect("header is readable");
//! assert_eq!(header, [0x00, 0x2a]);
//!
//! // Zero-copy hand-off of the payload to the next stage.
//! let payload = buf.read_slice(4).expect("payload is readable");
//! payload.with_readable_bytes(|bytes| assert_eq!(bytes, b"ping"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]

pub mod alloc;
pub mod buffer;
mod storage;
pub mod test_utils;
pub mod tracing_compat;
pub mod views;

// Re-exports for convenient access to core types
pub use alloc::{AllocateFn, ByteBufferAllocator, CopyFn, FreeFn, ReallocateFn};
pub use buffer::ByteBuffer;
pub use views::StorageHandle;
