use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quanta::{Clock, Instant};
use tracing::trace;

use crate::atomics::{AtomicF64, AtomicI64};
use crate::ewma::{Ewma, FIFTEEN_MINUTES, FIVE_MINUTES, ONE_MINUTE};
use crate::{Arbiter, Meter, MeterFn, MeterSnapshot, Tick};

/// State used to compute the step rate, only touched with the meter's lock held.
struct StepState {
    last_count: i64,
    last_time: Instant,
}

/// A clocked meter.
///
/// Counts events and derives one-, five-, and fifteen-minute moving average rates, as well as the
/// mean rate since creation.  The moving averages are advanced by the [`Arbiter`] the meter was
/// created by, which ticks every live meter on a shared interval.
///
/// Marking, and reading the count or any of the moving average rates, only ever performs atomic
/// loads and stores, so they never block.  Every rate is published independently, so a reader may
/// observe e.g. a one-minute rate reflecting a later mark than the five-minute rate it read just
/// before.
///
/// [`rate_step`](MeterFn::rate_step), [`snapshot`](MeterFn::snapshot) and [`stop`](MeterFn::stop)
/// take the meter's lock, but never block marks or plain rate reads.
///
/// When a meter is stopped, or the last reference to it is dropped, it is removed from its arbiter.
pub struct StandardMeter {
    count: AtomicI64,
    rate1: AtomicF64,
    rate5: AtomicF64,
    rate15: AtomicF64,
    rate_mean: AtomicF64,
    rate_step: AtomicF64,
    a1: Ewma,
    a5: Ewma,
    a15: Ewma,
    stopped: AtomicBool,
    start: Instant,
    step: Mutex<StepState>,
    clock: Clock,
    arbiter: Arbiter,
}

impl StandardMeter {
    /// Creates a new meter, ticked at the interval of the given arbiter.
    ///
    /// The meter is not registered: callers go through [`Arbiter::standard_meter`].
    pub(crate) fn new(arbiter: Arbiter) -> StandardMeter {
        let clock = arbiter.clock().clone();
        let interval = arbiter.tick_interval();
        let start = clock.now();

        StandardMeter {
            count: AtomicI64::new(0),
            rate1: AtomicF64::default(),
            rate5: AtomicF64::default(),
            rate15: AtomicF64::default(),
            rate_mean: AtomicF64::default(),
            rate_step: AtomicF64::default(),
            a1: Ewma::new(ONE_MINUTE, interval),
            a5: Ewma::new(FIVE_MINUTES, interval),
            a15: Ewma::new(FIFTEEN_MINUTES, interval),
            stopped: AtomicBool::new(false),
            start,
            step: Mutex::new(StepState { last_count: 0, last_time: start }),
            clock,
            arbiter,
        }
    }

    /// Whether or not the meter has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Refreshes every rate, including the step rate, and takes a read-only copy of the meter.
    pub fn freeze(&self) -> MeterSnapshot {
        let mut step = self.step.lock();
        let count = self.refresh_step(&mut step);

        MeterSnapshot {
            count,
            rate1: self.rate1.load(),
            rate5: self.rate5.load(),
            rate15: self.rate15.load(),
            rate_mean: self.rate_mean.load(),
            rate_step: self.rate_step.load(),
        }
    }

    /// Publishes the moving averages and the mean rate as of `now`.
    fn publish(&self, now: Instant, count: i64) {
        self.rate1.store(self.a1.rate());
        self.rate5.store(self.a5.rate());
        self.rate15.store(self.a15.rate());

        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        if elapsed > 0.0 {
            self.rate_mean.store(count as f64 / elapsed);
        }
    }

    /// Publishes every rate, including the step rate, and returns the count they were computed for.
    fn refresh_step(&self, step: &mut StepState) -> i64 {
        let now = self.clock.now();
        let count = self.count();
        self.publish(now, count);

        // With no time elapsed there is no step to measure, so keep accumulating into the next one.
        let elapsed = now.saturating_duration_since(step.last_time).as_secs_f64();
        if elapsed > 0.0 {
            self.rate_step.store(count.wrapping_sub(step.last_count) as f64 / elapsed);
            step.last_count = count;
            step.last_time = now;
        }

        count
    }
}

impl MeterFn for StandardMeter {
    fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    /// Records `n` events.  Does nothing once the meter is stopped.
    ///
    /// The count wraps around on overflow.
    fn mark(&self, n: i64) {
        if self.is_stopped() {
            return;
        }

        let count = self.count.fetch_add(n, Ordering::AcqRel).wrapping_add(n);
        self.a1.update(n);
        self.a5.update(n);
        self.a15.update(n);
        self.publish(self.clock.now(), count);
    }

    fn rate1(&self) -> f64 {
        self.rate1.load()
    }

    fn rate5(&self) -> f64 {
        self.rate5.load()
    }

    fn rate15(&self) -> f64 {
        self.rate15.load()
    }

    fn rate_mean(&self) -> f64 {
        self.rate_mean.load()
    }

    fn rate_step(&self) -> f64 {
        let mut step = self.step.lock();
        let _ = self.refresh_step(&mut step);
        self.rate_step.load()
    }

    fn snapshot(&self) -> Meter {
        Meter::from_arc(Arc::new(self.freeze()))
    }

    fn stop(&self) {
        let was_stopped = {
            let _step = self.step.lock();
            self.stopped.swap(true, Ordering::AcqRel)
        };

        if !was_stopped {
            let _ = self.arbiter.deregister(self);
            trace!(count = self.count(), "meter stopped");
        }
    }
}

impl Tick for StandardMeter {
    fn tick(&self, now: Instant) {
        self.a1.tick();
        self.a5.tick();
        self.a15.tick();
        self.publish(now, self.count());
    }
}

impl Drop for StandardMeter {
    fn drop(&mut self) {
        let _ = self.arbiter.deregister(&*self);
    }
}

impl fmt::Debug for StandardMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardMeter")
            .field("count", &self.count())
            .field("rate1", &self.rate1())
            .field("rate5", &self.rate5())
            .field("rate15", &self.rate15())
            .field("rate_mean", &self.rate_mean())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
