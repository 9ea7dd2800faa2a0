//! Atomic types used for meter state.
//!
//! Every rate a meter publishes is a floating-point value that readers load independently of the
//! writers refreshing it.  We store those values as their bit patterns inside an atomic 64-bit
//! integer, which requires a 64-bit atomic regardless of whether the standard library exposes one
//! for the target architecture.
//!
//! As such, the 64-bit atomics are re-exported here for the rest of the crate to utilize.

use std::sync::atomic::Ordering;

#[cfg(target_pointer_width = "32")]
pub use portable_atomic::{AtomicI64, AtomicU64};
#[cfg(not(target_pointer_width = "32"))]
pub use std::sync::atomic::{AtomicI64, AtomicU64};

/// An `f64` which can be loaded and stored atomically.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Creates a new `AtomicF64` holding the given value.
    pub fn new(value: f64) -> Self {
        Self { bits: AtomicU64::new(value.to_bits()) }
    }

    /// Loads the current value.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Publishes a new value.
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::AtomicF64;

    #[test]
    fn store_and_load() {
        let value = AtomicF64::default();
        assert_eq!(value.load(), 0.0);

        value.store(1.25);
        assert_eq!(value.load(), 1.25);

        value.store(-3.5);
        assert_eq!(value.load(), -3.5);
    }
}
