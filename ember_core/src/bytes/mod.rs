//! Byte-oriented variable-length codec.
//!
//! Symbol tables and suite headers store non-negative integers and UTF-16
//! strings in a space-saving encoding: integers use 7 bits per byte with a
//! continuation bit, strings use a length prefix followed by modified UTF-8
//! code units. The encoding is symmetric between [`ByteBuffer`] (the
//! writer) and [`Decoder`] (the reader).
//!
//! The reader side is written once against the [`ByteSource`] capability
//! and instantiated for two media: a borrowed byte array
//! ([`BufferSource`]) and live heap memory ([`MemorySource`]).
//!
//! # Integer encoding
//!
//! Values are limited to 28 bits and encoded little-end-first, 7 bits per
//! byte; a set high bit marks a continuation byte:
//!
//! ```text
//!     Value range               Bytes used for encoding
//!     0       .. 127                 1
//!     128     .. 16383               2
//!     16384   .. 2097151             3
//!     2097152 .. 268435455           4
//! ```
//!
//! # String encoding
//!
//! A string is its UTF-16 code-unit count (encoded as an unsigned short)
//! followed by one modified-UTF-8 sequence per code unit. The code unit 0
//! is encoded in the 2-byte form `[0xC0, 0x80]` so that encoded string data
//! never contains a raw zero byte. This is a wire-format requirement, not
//! an implementation choice.

mod buffer;
mod decoder;
mod source;

pub use buffer::{ByteBuffer, MIN_TABLE_LEN};
pub use decoder::Decoder;
pub use source::{BufferSource, ByteSource, MemorySource};

/// Largest value representable by the variable-length integer encoding.
pub const MAX_ENCODABLE_INT: u32 = 0x0FFF_FFFF;
