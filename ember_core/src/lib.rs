//! Ember VM core primitives.
//!
//! This crate holds the lowest layer of the Ember runtime: the raw machine
//! address model and the byte-oriented variable-length codec used by the
//! suite format and the symbol tables.
//!
//! # Architecture
//!
//! - [`addr`]: `Address` and the machine word constants. Addresses are
//!   opaque `usize` values with just enough arithmetic for the runtime
//!   (add, diff, word alignment, raw byte access).
//!
//! - [`bytes`]: the codec. [`bytes::ByteBuffer`] is the growable encoder
//!   buffer; [`bytes::Decoder`] is the single decode algorithm, generic
//!   over a [`bytes::ByteSource`] so the same code reads from an in-memory
//!   array or directly from live heap memory.
//!
//! # Error model
//!
//! Nothing in this crate returns `Result`. Malformed input streams and
//! violated preconditions indicate bugs in upstream callers (class metadata
//! is validated before it is ever encoded) and fail with fatal assertions.

#![warn(clippy::all)]

pub mod addr;
pub mod bytes;

pub use addr::{Address, BITS_PER_WORD, BYTES_PER_WORD, LOG2_BYTES_PER_WORD};
pub use bytes::{BufferSource, ByteBuffer, ByteSource, Decoder, MemorySource};
