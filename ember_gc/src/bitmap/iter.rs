//! Single-pass iteration over set bits in an address range.
//!
//! The iterator is part of the bitmap itself rather than a per-caller
//! object: only one collection pass is ever active system-wide, so there
//! is exactly one scan state per heap. The `in_use` guard turns an
//! accidental nested scan into a fatal assertion instead of silent
//! corruption.

use std::sync::atomic::Ordering;

use ember_core::{Address, BITS_PER_WORD, BYTES_PER_WORD};

use super::{Bitmap, BYTES_COVERED_PER_WORD};

impl Bitmap {
    /// Begin iterating over the addresses in `[start, end)` whose bits are
    /// set.
    ///
    /// With `is_object_range` set, both bounds are advanced by one word
    /// before use: a set bit marks an object's header, and the iteration
    /// yields the address of the object's *body*, one word later. The end
    /// bound moves with it so that a zero-length object whose body sits
    /// exactly at the range end is still yielded.
    ///
    /// Starting a second iteration while one is active is a fatal
    /// assertion; finish with [`terminate_iteration`](Self::terminate_iteration)
    /// first (exhaustion alone does not release the iterator).
    pub fn start_iteration(&self, start: Address, end: Address, is_object_range: bool) {
        assert!(
            !self.iter_in_use.swap(true, Ordering::Acquire),
            "bitmap iteration already active"
        );
        debug_assert!(start <= end);
        debug_assert!(
            {
                let (cs, ce) = self.coverage_bounds();
                start.as_usize() >= cs && end.as_usize() <= ce
            },
            "iteration range outside bitmap coverage"
        );

        let offset = if is_object_range { BYTES_PER_WORD } else { 0 };
        self.iter_body_offset.store(offset, Ordering::Relaxed);
        self.iter_next.store(start.as_usize() + offset, Ordering::Relaxed);
        self.iter_end.store(end.as_usize() + offset, Ordering::Relaxed);
        self.stats().record_iteration_started();
    }

    /// Yield the next ascending address whose bit is set, or `None` when
    /// no set bits remain before the range end.
    ///
    /// `None` does not release the iterator; the caller either stops
    /// calling and terminates, or has already decided to abandon the scan.
    pub fn iteration_next(&self) -> Option<Address> {
        assert!(
            self.iter_in_use.load(Ordering::Relaxed),
            "no active bitmap iteration"
        );

        let offset = self.iter_body_offset.load(Ordering::Relaxed);
        let end = self.iter_end.load(Ordering::Relaxed);
        // Work on bit addresses: the yielded address is the bit address
        // plus `offset`.
        let stop = end - offset;
        let mut ea = self.iter_next.load(Ordering::Relaxed) - offset;

        while ea < stop {
            let bit = ea / BYTES_PER_WORD;
            let masked = self.load_word_masked(bit);
            let word_index = bit / BITS_PER_WORD;
            if masked != 0 {
                let found_bit = word_index * BITS_PER_WORD + masked.trailing_zeros() as usize;
                let found = found_bit * BYTES_PER_WORD;
                if found < stop {
                    self.iter_next
                        .store(found + offset + BYTES_PER_WORD, Ordering::Relaxed);
                    self.stats().record_address_yielded();
                    return Some(Address::from_usize(found + offset));
                }
                break;
            }
            // No set bit at or above `ea` in this bitmap word; jump to the
            // next word's first covered address.
            ea = (word_index + 1) * BYTES_COVERED_PER_WORD;
        }

        self.iter_next.store(end, Ordering::Relaxed);
        None
    }

    /// End the current iteration, whether or not it ran to exhaustion.
    pub fn terminate_iteration(&self) {
        assert!(
            self.iter_in_use.load(Ordering::Relaxed),
            "no active bitmap iteration"
        );
        self.iter_next.store(0, Ordering::Relaxed);
        self.iter_in_use.store(false, Ordering::Release);
    }

    /// Whether an iteration is currently active.
    #[inline]
    pub fn iteration_in_use(&self) -> bool {
        self.iter_in_use.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_addr(heap: Address, index: usize) -> Address {
        heap.add(index * BYTES_PER_WORD)
    }

    #[test]
    fn test_iteration_yields_set_bits_in_ascending_order() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.set_bit(word_addr(heap, 5));
        bitmap.set_bit(word_addr(heap, 2));

        bitmap.start_iteration(heap, word_addr(heap, 8), false);
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 2)));
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 5)));
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    fn test_iteration_respects_range_bounds() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 16 * BYTES_PER_WORD);
        for i in [0usize, 3, 7, 12, 15] {
            bitmap.set_bit(word_addr(heap, i));
        }

        bitmap.start_iteration(word_addr(heap, 3), word_addr(heap, 12), false);
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 3)));
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 7)));
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    fn test_object_range_yields_body_addresses() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.set_bit(word_addr(heap, 2));

        bitmap.start_iteration(heap, word_addr(heap, 8), true);
        // The bit marks the header at word 2; the body is one word later.
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 3)));
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    fn test_object_range_includes_end_boundary_body() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        // A zero-length object whose header is the last word of the
        // range: its body coincides with the range end.
        bitmap.set_bit(word_addr(heap, 7));

        bitmap.start_iteration(heap, word_addr(heap, 8), true);
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 8)));
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    fn test_non_object_range_excludes_end_boundary() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.set_bit(word_addr(heap, 7));

        bitmap.start_iteration(heap, word_addr(heap, 7), false);
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    #[should_panic(expected = "bitmap iteration already active")]
    fn test_reentrant_start_is_fatal() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.start_iteration(heap, word_addr(heap, 8), false);
        bitmap.start_iteration(heap, word_addr(heap, 8), false);
    }

    #[test]
    #[should_panic(expected = "no active bitmap iteration")]
    fn test_next_without_start_is_fatal() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.iteration_next();
    }

    #[test]
    fn test_terminate_mid_scan_allows_fresh_start() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.set_bit(word_addr(heap, 1));
        bitmap.set_bit(word_addr(heap, 6));

        bitmap.start_iteration(heap, word_addr(heap, 8), false);
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 1)));
        bitmap.terminate_iteration();
        assert!(!bitmap.iteration_in_use());

        bitmap.start_iteration(heap, word_addr(heap, 8), false);
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 1)));
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, 6)));
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    fn test_iteration_across_bitmap_word_boundaries() {
        let heap = Address::from_usize(0x10000);
        let words = 3 * BITS_PER_WORD;
        let bitmap = Bitmap::new(heap, words * BYTES_PER_WORD);
        let set: Vec<usize> = vec![0, BITS_PER_WORD - 1, BITS_PER_WORD, 2 * BITS_PER_WORD + 5];
        for &i in &set {
            bitmap.set_bit(word_addr(heap, i));
        }

        bitmap.start_iteration(heap, word_addr(heap, words), false);
        let mut seen = Vec::new();
        while let Some(ea) = bitmap.iteration_next() {
            seen.push(ea.diff(heap) / BYTES_PER_WORD);
        }
        bitmap.terminate_iteration();
        assert_eq!(seen, set);
    }

    #[test]
    fn test_sparse_scan_skips_empty_words_quickly() {
        let heap = Address::from_usize(0x10000);
        let words = 16 * BITS_PER_WORD;
        let bitmap = Bitmap::new(heap, words * BYTES_PER_WORD);
        bitmap.set_bit(word_addr(heap, words - 1));

        bitmap.start_iteration(heap, word_addr(heap, words), false);
        assert_eq!(bitmap.iteration_next(), Some(word_addr(heap, words - 1)));
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }

    #[test]
    fn test_empty_range_yields_nothing() {
        let heap = Address::from_usize(0x8000);
        let bitmap = Bitmap::new(heap, 8 * BYTES_PER_WORD);
        bitmap.start_iteration(word_addr(heap, 4), word_addr(heap, 4), false);
        assert_eq!(bitmap.iteration_next(), None);
        bitmap.terminate_iteration();
    }
}
