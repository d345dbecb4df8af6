//! Ember VM heap bitmap.
//!
//! One bit-vector over every heap word, worn by two hats at two different
//! times:
//!
//! - **Mutator phase**: the bits are a generational write barrier. Every
//!   reference-typed store dirties the bit for the stored-into word, so a
//!   partial collection can find old-to-young pointers without rescanning
//!   the whole old generation.
//!
//! - **Collector phase**: the same bits are the mark bits of the
//!   mark-compact collector, walked with a single-pass iterator over set
//!   bits in an address range.
//!
//! # Concurrency
//!
//! Write-barrier sets arrive from arbitrary mutator threads with no
//! locking: a bit set is idempotent and commutative, and the barrier only
//! has to end up a superset of the dirtied words before the collector
//! looks at it. The bit words are therefore plain relaxed atomics. The
//! mark/iterate phases run inside a stop-the-world pause where the
//! collector is the sole user; the iterator's single-active-scan assertion
//! guards against programmer error, not races.
//!
//! # Usage
//!
//! ```
//! use ember_core::{Address, BYTES_PER_WORD};
//! use ember_gc::{write_barrier, Bitmap};
//!
//! let heap = Address::from_usize(0x10000);
//! let bitmap = Bitmap::new(heap, 64 * BYTES_PER_WORD);
//!
//! // Mutator: record a pointer store.
//! write_barrier(&bitmap, heap.add(2 * BYTES_PER_WORD));
//!
//! // Collector: walk the dirty words.
//! bitmap.start_iteration(heap, heap.add(64 * BYTES_PER_WORD), false);
//! assert_eq!(bitmap.iteration_next(), Some(heap.add(2 * BYTES_PER_WORD)));
//! assert_eq!(bitmap.iteration_next(), None);
//! bitmap.terminate_iteration();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod bitmap;
mod stats;

pub use barrier::{update_write_barrier_for_pointer_arraycopy, write_barrier};
pub use bitmap::Bitmap;
pub use stats::BitmapStats;
