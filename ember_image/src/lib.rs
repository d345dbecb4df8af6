//! Ember VM object-memory images.
//!
//! An object-memory image (a "suite") is a serialized snapshot of a heap
//! region: the raw memory bytes, an oop map locating every pointer word
//! inside them, and a header binding the image to the parent image it was
//! built against. Images form a strictly-ordered dependency chain; loading
//! one means verifying its parent's integrity hash, acquiring the memory
//! (by copying or by referencing a pre-existing range), and relocating the
//! recorded pointers to wherever the memory actually landed.
//!
//! # Format
//!
//! ```text
//!    ObjectMemory {
//!        u4   magic              // 0xDEADBEEF
//!        u2   minor_version;
//!        u2   major_version;
//!        u4   attributes;        // mask of the Attributes bits
//!        u4   parent_hash;
//!        utf8 parent_uri;        // codec string encoding
//!        u4   root;              // offset (in bytes) in 'memory' of the root
//!        u4   size;              // size (in bytes) of 'memory'
//!        u1   oopmap[((size / word_size) + 7) / 8];
//!        u1   padding[n];        // 0 <= n < word_size, aligns 'memory'
//!        u1   memory[size];
//!        u1   typemap[size];     // only if the typemap attribute is set
//!    }
//! ```
//!
//! Multi-byte header fields are big-endian regardless of the memory
//! region's own byte order, which is declared by an attribute bit.
//!
//! # Errors
//!
//! A parent-hash mismatch (or any other integrity failure) is reported as
//! a [`LoadError`] for the loading subsystem to branch on — the one
//! recoverable error class in the runtime core.

#![warn(clippy::all)]

pub mod format;
pub mod loader;
pub mod memory;
pub mod oopmap;
pub mod reader;
pub mod registry;
pub mod writer;

mod relocate;

pub use format::{oop_map_size_in_bytes, Attributes, MAGIC, MAJOR_VERSION, MINOR_VERSION};
pub use loader::{ImageLoader, LoadError, ObjectMemoryImage};
pub use memory::{compute_hash, MemoryRegion, ObjectMemory};
pub use oopmap::OopMap;
pub use reader::{ImageReader, MemoryReader, SliceReader};
pub use registry::ImageRegistry;
pub use writer::{ControlBlock, ImageWriter};
