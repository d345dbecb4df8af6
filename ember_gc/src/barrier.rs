//! Write-barrier entry points.
//!
//! Every reference-typed store in the mutator goes through one of these.
//! The barrier only records which heap words *may* now hold interesting
//! pointers; precision is the collector's problem. That makes the fast
//! path a single shift/mask/or with no locking.

use ember_core::{Address, BYTES_PER_WORD};

use crate::bitmap::Bitmap;

/// Write barrier for a pointer store.
///
/// Call after storing a reference into the heap word at `ea`. Safe to call
/// from any number of mutator threads concurrently: setting a bit twice is
/// the same as setting it once.
///
/// # Example
///
/// ```ignore
/// // obj.field = value;
/// write_barrier(&bitmap, field_address);
/// ```
#[inline(always)]
pub fn write_barrier(bitmap: &Bitmap, ea: Address) {
    bitmap.set_bit(ea);
}

/// Bulk write barrier for a block copy of reference-typed array elements.
///
/// Conservatively dirties every destination slot of the copy rather than
/// bit-testing each element: `length` reference-sized slots starting at
/// element `dst_pos` of the array body at `dst`.
#[inline]
pub fn update_write_barrier_for_pointer_arraycopy(
    bitmap: &Bitmap,
    dst: Address,
    dst_pos: usize,
    length: usize,
) {
    let start = dst.add(dst_pos * BYTES_PER_WORD);
    let end = start.add(length * BYTES_PER_WORD);
    bitmap.set_bits(start, end);
}
