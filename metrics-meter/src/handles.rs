use std::{fmt, sync::Arc};

use metrics::{Counter, CounterFn};

use crate::NoopMeter;

/// A meter handler.
///
/// This is the capability set shared by every flavor of meter: the clocked
/// [`StandardMeter`](crate::StandardMeter), the frozen [`MeterSnapshot`](crate::MeterSnapshot), and
/// the inert [`NoopMeter`].  Call sites only ever see it through a [`Meter`], so they never need to
/// care which flavor they were given.
///
/// Rates are in events per second.  Each rate is published on its own, so two rates read by two
/// separate calls are not guaranteed to reflect the same set of events.
pub trait MeterFn {
    /// Gets the number of events recorded.
    fn count(&self) -> i64;

    /// Records the occurrence of `n` events.
    fn mark(&self, n: i64);

    /// Gets the one-minute moving average rate.
    fn rate1(&self) -> f64;

    /// Gets the five-minute moving average rate.
    fn rate5(&self) -> f64;

    /// Gets the fifteen-minute moving average rate.
    fn rate15(&self) -> f64;

    /// Gets the mean rate since the meter was created.
    fn rate_mean(&self) -> f64;

    /// Gets the rate since the step rate was last refreshed.
    fn rate_step(&self) -> f64;

    /// Takes a read-only, point-in-time copy of the meter.
    fn snapshot(&self) -> Meter;

    /// Stops the meter.
    fn stop(&self);
}

/// A meter.
///
/// Cheap to clone: all clones refer to the same underlying meter.
#[derive(Clone, Default)]
pub struct Meter {
    inner: Option<Arc<dyn MeterFn + Send + Sync>>,
}

impl Meter {
    /// Creates a no-op `Meter` which does nothing.
    ///
    /// Suitable when a handle must be provided that does nothing i.e. meters are disabled
    /// process-wide, or in tests that do not care about rates.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Creates a `Meter` based on a shared handler.
    pub fn from_arc<F: MeterFn + Send + Sync + 'static>(a: Arc<F>) -> Self {
        Self { inner: Some(a) }
    }

    /// Whether or not this handle does nothing.
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&dyn MeterFn) -> T) -> T {
        match &self.inner {
            Some(inner) => f(inner.as_ref()),
            None => f(&NoopMeter),
        }
    }

    /// Gets the number of events recorded.
    pub fn count(&self) -> i64 {
        self.with_inner(|m| m.count())
    }

    /// Records the occurrence of `n` events.
    ///
    /// ## Panics
    ///
    /// Panics if this handle refers to a snapshot, as snapshots are read-only.
    pub fn mark(&self, n: i64) {
        self.with_inner(|m| m.mark(n))
    }

    /// Gets the one-minute moving average rate, in events per second.
    pub fn rate1(&self) -> f64 {
        self.with_inner(|m| m.rate1())
    }

    /// Gets the five-minute moving average rate, in events per second.
    pub fn rate5(&self) -> f64 {
        self.with_inner(|m| m.rate5())
    }

    /// Gets the fifteen-minute moving average rate, in events per second.
    pub fn rate15(&self) -> f64 {
        self.with_inner(|m| m.rate15())
    }

    /// Gets the mean rate since creation, in events per second.
    pub fn rate_mean(&self) -> f64 {
        self.with_inner(|m| m.rate_mean())
    }

    /// Gets the rate since the step rate was last refreshed, in events per second.
    ///
    /// For a live meter, this refreshes the step rate, so it reflects the caller's own read cadence.
    pub fn rate_step(&self) -> f64 {
        self.with_inner(|m| m.rate_step())
    }

    /// Takes a read-only, point-in-time copy of the meter.
    pub fn snapshot(&self) -> Meter {
        self.with_inner(|m| m.snapshot())
    }

    /// Stops the meter.
    ///
    /// Subsequent calls to [`mark`](Meter::mark) are ignored, and the meter is no longer ticked.
    pub fn stop(&self) {
        self.with_inner(|m| m.stop())
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("noop", &self.is_noop())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Renders the meter the way a periodic textual reporter prints it.
impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count:       {:>9}", self.count())?;
        writeln!(f, "1-min rate:  {:>12.2}", self.rate1())?;
        writeln!(f, "5-min rate:  {:>12.2}", self.rate5())?;
        writeln!(f, "15-min rate: {:>12.2}", self.rate15())?;
        write!(f, "mean rate:   {:>12.2}", self.rate_mean())
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Allows a meter to back a `metrics` counter.
///
/// `increment` marks the given number of events.  `absolute` marks the difference between the given
/// value and the current count, if positive; concurrent callers racing on `absolute` may both
/// observe the same current count.
impl CounterFn for Meter {
    fn increment(&self, value: u64) {
        self.mark(saturating_i64(value));
    }

    fn absolute(&self, value: u64) {
        let target = saturating_i64(value);
        let current = self.count();
        if target > current {
            self.mark(target.saturating_sub(current));
        }
    }
}

impl From<Meter> for Counter {
    fn from(meter: Meter) -> Counter {
        Counter::from_arc(Arc::new(meter))
    }
}

#[cfg(test)]
mod tests {
    use super::Meter;
    use crate::{Arbiter, ArbiterBuilder};
    use metrics::Counter;

    #[test]
    fn noop_handle() {
        let meter = Meter::noop();
        assert!(meter.is_noop());

        meter.mark(42);
        assert_eq!(meter.count(), 0);
        assert_eq!(meter.rate1(), 0.0);
        assert_eq!(meter.rate_step(), 0.0);
        assert!(meter.snapshot().is_noop());
        meter.stop();
    }

    #[test]
    fn clones_share_state() {
        let arbiter: Arbiter = ArbiterBuilder::new().build_manual();
        let meter = arbiter.meter();
        let other = meter.clone();

        meter.mark(3);
        other.mark(4);
        assert_eq!(meter.count(), 7);
        assert_eq!(other.count(), 7);
    }

    #[test]
    fn display_renders_snapshot() {
        let arbiter = ArbiterBuilder::new().build_manual();
        let meter = arbiter.meter();
        meter.mark(1_234);

        let rendered = meter.snapshot().to_string();
        assert_eq!(rendered.lines().next(), Some("count:            1234"));
        assert_eq!(rendered.lines().count(), 5);
    }

    #[test]
    fn display_block() {
        let rendered = Meter::noop().to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "count:               0");
        assert_eq!(lines[1], "1-min rate:          0.00");
        assert_eq!(lines[4], "mean rate:           0.00");
    }

    #[test]
    fn backs_metrics_counter() {
        let arbiter = ArbiterBuilder::new().build_manual();
        let meter = arbiter.meter();
        let counter = Counter::from(meter.clone());

        counter.increment(5);
        assert_eq!(meter.count(), 5);

        counter.absolute(12);
        assert_eq!(meter.count(), 12);

        // Never moves backwards.
        counter.absolute(3);
        assert_eq!(meter.count(), 12);
    }
}
