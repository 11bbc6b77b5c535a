//! Synchronization primitives with optional loom support.
//!
//! The arena's byte accounting is the only state shared across segments
//! without a lock, so it is the part modelled under loom. Segment state is
//! guarded by `parking_lot::Mutex` and uses std types directly.

#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicUsize, Ordering};

/// Spin loop hint for CAS retry loops.
///
/// Under loom this yields so the model checker can schedule other threads.
#[inline]
pub fn spin_loop() {
    #[cfg(not(feature = "loom"))]
    std::hint::spin_loop();

    #[cfg(feature = "loom")]
    loom::thread::yield_now();
}
