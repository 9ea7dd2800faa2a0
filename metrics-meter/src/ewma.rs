//! Exponentially-weighted moving averages.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::atomics::{AtomicF64, AtomicI64};

/// Interval at which the arbiter ticks meters, unless configured otherwise.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Window of the one-minute average.
pub const ONE_MINUTE: Duration = Duration::from_secs(60);

/// Window of the five-minute average.
pub const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);

/// Window of the fifteen-minute average.
pub const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// A time-decaying event rate.
///
/// Events are accumulated with [`update`](Ewma::update) from any number of threads, and folded into
/// the average once per tick interval by [`tick`](Ewma::tick).  The decay constant is fixed at
/// construction so that, after one averaging window's worth of ticks, the weight of older data has
/// decayed to `1/e`.
///
/// `tick` must not run concurrently with itself: the arbiter serializes its tick passes, which is
/// the only place meters are ticked from.
#[derive(Debug)]
pub struct Ewma {
    alpha: f64,
    interval: f64,
    uncounted: AtomicI64,
    rate: AtomicF64,
    initialized: AtomicBool,
}

impl Ewma {
    /// Creates a new `Ewma` averaging over `window`, ticked every `interval`.
    pub fn new(window: Duration, interval: Duration) -> Ewma {
        let alpha = 1.0 - (-interval.as_secs_f64() / window.as_secs_f64()).exp();
        Ewma::with_alpha(alpha, interval)
    }

    /// Creates a new `Ewma` with an explicit decay constant.
    pub fn with_alpha(alpha: f64, interval: Duration) -> Ewma {
        Ewma {
            alpha,
            interval: interval.as_secs_f64(),
            uncounted: AtomicI64::new(0),
            rate: AtomicF64::new(0.0),
            initialized: AtomicBool::new(false),
        }
    }

    /// One-minute average, ticked at the default interval.
    pub fn one_minute() -> Ewma {
        Ewma::new(ONE_MINUTE, DEFAULT_TICK_INTERVAL)
    }

    /// Five-minute average, ticked at the default interval.
    pub fn five_minute() -> Ewma {
        Ewma::new(FIVE_MINUTES, DEFAULT_TICK_INTERVAL)
    }

    /// Fifteen-minute average, ticked at the default interval.
    pub fn fifteen_minute() -> Ewma {
        Ewma::new(FIFTEEN_MINUTES, DEFAULT_TICK_INTERVAL)
    }

    /// Gets the decay constant.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Records `n` events that occurred since the last tick.
    pub fn update(&self, n: i64) {
        let _ = self.uncounted.fetch_add(n, Ordering::AcqRel);
    }

    /// Folds the events seen since the last tick into the average.
    pub fn tick(&self) {
        let count = self.uncounted.swap(0, Ordering::AcqRel);
        let instant_rate = count as f64 / self.interval;

        if self.initialized.load(Ordering::Acquire) {
            let rate = self.rate.load();
            self.rate.store(rate + self.alpha * (instant_rate - rate));
        } else {
            self.rate.store(instant_rate);
            self.initialized.store(true, Ordering::Release);
        }
    }

    /// Gets the current rate, in events per second.
    ///
    /// Before the first tick, this is zero.
    pub fn rate(&self) -> f64 {
        self.rate.load()
    }
}
