//! Bitmap activity counters.
//!
//! Cheap always-on counters for tuning and debugging; everything is a
//! relaxed atomic so recording never perturbs the phases being measured.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing write-barrier and mark-phase activity.
#[derive(Debug)]
pub struct BitmapStats {
    /// Bulk ranges dirtied via `set_bits` (arraycopy barriers included).
    pub ranges_dirtied: AtomicU64,
    /// Iterations started over the bitmap.
    pub iterations_started: AtomicU64,
    /// Addresses yielded across all iterations.
    pub addresses_yielded: AtomicU64,
}

impl BitmapStats {
    /// Create zeroed counters.
    pub const fn new() -> BitmapStats {
        BitmapStats {
            ranges_dirtied: AtomicU64::new(0),
            iterations_started: AtomicU64::new(0),
            addresses_yielded: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_range_dirtied(&self) {
        self.ranges_dirtied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_iteration_started(&self) {
        self.iterations_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_address_yielded(&self) {
        self.addresses_yielded.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.ranges_dirtied.store(0, Ordering::Relaxed);
        self.iterations_started.store(0, Ordering::Relaxed);
        self.addresses_yielded.store(0, Ordering::Relaxed);
    }

    /// Print a one-look summary to stderr.
    pub fn print_summary(&self) {
        eprintln!("=== Bitmap Statistics ===");
        eprintln!(
            "Ranges dirtied: {}",
            self.ranges_dirtied.load(Ordering::Relaxed)
        );
        eprintln!(
            "Iterations: {} ({} addresses yielded)",
            self.iterations_started.load(Ordering::Relaxed),
            self.addresses_yielded.load(Ordering::Relaxed)
        );
    }
}

impl Default for BitmapStats {
    fn default() -> Self {
        Self::new()
    }
}
