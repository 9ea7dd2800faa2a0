use std::sync::Arc;

use crate::{Meter, MeterFn};

/// A read-only, point-in-time copy of a meter.
///
/// Produced by [`StandardMeter::freeze`](crate::StandardMeter::freeze), or through
/// [`Meter::snapshot`].  Its values never change after creation, even as the meter it was taken from
/// keeps being marked and ticked.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeterSnapshot {
    pub(crate) count: i64,
    pub(crate) rate1: f64,
    pub(crate) rate5: f64,
    pub(crate) rate15: f64,
    pub(crate) rate_mean: f64,
    pub(crate) rate_step: f64,
}

impl MeterFn for MeterSnapshot {
    fn count(&self) -> i64 {
        self.count
    }

    /// Snapshots are read-only: marking one is a bug in the caller.
    fn mark(&self, _n: i64) {
        panic!("mark called on a meter snapshot");
    }

    fn rate1(&self) -> f64 {
        self.rate1
    }

    fn rate5(&self) -> f64 {
        self.rate5
    }

    fn rate15(&self) -> f64 {
        self.rate15
    }

    fn rate_mean(&self) -> f64 {
        self.rate_mean
    }

    /// The step rate as refreshed when the snapshot was taken.
    fn rate_step(&self) -> f64 {
        self.rate_step
    }

    fn snapshot(&self) -> Meter {
        Meter::from_arc(Arc::new(self.clone()))
    }

    fn stop(&self) {}
}
