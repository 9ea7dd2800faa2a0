use std::time::Duration;

use quanta::Clock;

use super::{Arbiter, ArbiterError, LoopState};
use crate::ewma::DEFAULT_TICK_INTERVAL;

const DEFAULT_THREAD_NAME: &str = "metrics-meter-arbiter";

/// Builder for creating an [`Arbiter`].
///
/// Most applications never need one: [`Arbiter::global`] is built with the defaults below.  A
/// dedicated arbiter is useful to tick a group of meters at a different interval, or to drive
/// meters by hand against a mocked [`Clock`] in tests.
#[derive(Debug)]
pub struct ArbiterBuilder {
    tick_interval: Duration,
    clock: Option<Clock>,
    thread_name: String,
    enabled: bool,
}

impl ArbiterBuilder {
    /// Creates a new [`ArbiterBuilder`].
    pub fn new() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            clock: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            enabled: true,
        }
    }

    /// Sets the interval at which meters are ticked.
    ///
    /// The moving averages of every meter created by the arbiter are tuned to this interval.
    ///
    /// Defaults to 5 seconds.
    ///
    /// ## Errors
    ///
    /// If the duration given is zero, an error variant will be thrown.
    pub fn set_tick_interval(mut self, interval: Duration) -> Result<Self, ArbiterError> {
        if interval.is_zero() {
            return Err(ArbiterError::ZeroTickInterval);
        }

        self.tick_interval = interval;
        Ok(self)
    }

    /// Sets the clock used to timestamp ticks and compute the mean and step rates.
    ///
    /// Defaults to [`Clock::new`].
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the name of the ticking thread.
    ///
    /// Defaults to `metrics-meter-arbiter`.
    #[must_use]
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets whether or not the arbiter hands out clocked meters.
    ///
    /// When disabled, [`Arbiter::meter`] returns no-op meters.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the arbiter.
    ///
    /// The ticking thread is spawned when the first meter is registered.
    pub fn build(self) -> Arbiter {
        self.build_with_state(LoopState::Idle)
    }

    /// Builds an arbiter without a ticking thread.
    ///
    /// Meters are only ticked when [`Arbiter::tick`] is called, which allows driving them
    /// deterministically alongside a mocked clock.
    pub fn build_manual(self) -> Arbiter {
        self.build_with_state(LoopState::Manual)
    }

    fn build_with_state(self, state: LoopState) -> Arbiter {
        let clock = self.clock.unwrap_or_else(Clock::new);
        Arbiter::from_parts(clock, self.tick_interval, self.thread_name, self.enabled, state)
    }
}

impl Default for ArbiterBuilder {
    fn default() -> Self {
        ArbiterBuilder::new()
    }
}
