use crate::{Meter, MeterFn};

/// A no-op meter.
///
/// Used in place of a clocked meter when meters are disabled, so that instrumented call sites do not
/// need to branch on whether or not metrics are enabled.  Counts and rates are always zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMeter;

impl MeterFn for NoopMeter {
    fn count(&self) -> i64 {
        0
    }

    fn mark(&self, _n: i64) {}

    fn rate1(&self) -> f64 {
        0.0
    }

    fn rate5(&self) -> f64 {
        0.0
    }

    fn rate15(&self) -> f64 {
        0.0
    }

    fn rate_mean(&self) -> f64 {
        0.0
    }

    fn rate_step(&self) -> f64 {
        0.0
    }

    fn snapshot(&self) -> Meter {
        Meter::noop()
    }

    fn stop(&self) {}
}
