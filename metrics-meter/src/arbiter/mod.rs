//! Shared scheduling of meter ticks.
//!
//! Every clocked meter needs its moving averages advanced on a fixed interval.  Rather than running
//! one timer per meter, meters are registered with an [`Arbiter`], which owns a single background
//! thread that ticks every registered meter once per interval.
//!
//! The arbiter only tracks membership: it holds weak references to its meters, so a meter that is no
//! longer referenced anywhere else is reclaimed, and removes itself from the arbiter as it goes.
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use quanta::{Clock, Instant};
use tracing::{debug, error, trace, warn};

mod builder;
pub use self::builder::ArbiterBuilder;

mod errors;
pub use self::errors::ArbiterError;

use crate::{meters_enabled, Meter, StandardMeter};

static GLOBAL_ARBITER: Lazy<Arbiter> = Lazy::new(|| ArbiterBuilder::new().build());

/// Something that is advanced on every tick of an [`Arbiter`].
pub trait Tick: Send + Sync {
    /// Advances internal state, as of `now`.
    ///
    /// An arbiter never calls this concurrently with itself.
    fn tick(&self, now: Instant);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoopState {
    Idle,
    Running,
    Manual,
}

struct Shared {
    meters: RwLock<HashMap<usize, Weak<dyn Tick>>>,
    state: Mutex<LoopState>,
    pass: Mutex<()>,
    clock: Clock,
    tick_interval: Duration,
    thread_name: String,
    enabled: bool,
}

/// Ticks every registered meter on a shared interval, from a single background thread.
///
/// Handles are cheap to clone, and all clones refer to the same arbiter.  The background thread is
/// spawned lazily, by the first registration, and runs for as long as the arbiter exists, even when
/// no meters are registered.
#[derive(Clone)]
pub struct Arbiter {
    shared: Arc<Shared>,
}

fn identity<T: ?Sized>(meter: *const T) -> usize {
    meter.cast::<()>() as usize
}

impl Arbiter {
    pub(crate) fn from_parts(
        clock: Clock,
        tick_interval: Duration,
        thread_name: String,
        enabled: bool,
        state: LoopState,
    ) -> Arbiter {
        let shared = Shared {
            meters: RwLock::new(HashMap::new()),
            state: Mutex::new(state),
            pass: Mutex::new(()),
            clock,
            tick_interval,
            thread_name,
            enabled,
        };

        Arbiter { shared: Arc::new(shared) }
    }

    /// Gets the process-wide arbiter.
    ///
    /// It ticks every 5 seconds, and is created the first time it is accessed.
    pub fn global() -> &'static Arbiter {
        &GLOBAL_ARBITER
    }

    /// Creates a meter ticked by this arbiter.
    ///
    /// If meters are disabled, either for this arbiter or process-wide via
    /// [`set_meters_enabled`](crate::set_meters_enabled), a no-op meter is returned instead.
    pub fn meter(&self) -> Meter {
        if !self.shared.enabled || !meters_enabled() {
            return Meter::noop();
        }

        Meter::from_arc(self.standard_meter())
    }

    /// Creates a clocked meter ticked by this arbiter.
    ///
    /// Unlike [`meter`](Arbiter::meter), this always creates a clocked meter.
    pub fn standard_meter(&self) -> Arc<StandardMeter> {
        let meter = Arc::new(StandardMeter::new(self.clone()));
        self.register(&meter);
        meter
    }

    /// Registers `meter` to be ticked.
    ///
    /// The arbiter only holds a weak reference to it.  If the ticking thread is not yet running, it
    /// is started; failing to spawn it is logged, and retried on the next registration.
    pub fn register<T: Tick + 'static>(&self, meter: &Arc<T>) {
        let id = identity(Arc::as_ptr(meter));
        let weak: Weak<T> = Arc::downgrade(meter);
        let weak: Weak<dyn Tick> = weak;
        let total = {
            let mut meters = self.shared.meters.write();
            meters.insert(id, weak);
            meters.len()
        };
        trace!(total, "registered meter");

        if let Err(e) = self.ensure_running() {
            error!(error = %e, "failed to start meter arbiter, meters will not be ticked");
        }
    }

    /// Deregisters `meter`, so it is no longer ticked.
    ///
    /// Returns `true` if the meter was registered.  Deregistering a meter more than once is harmless.
    pub fn deregister<T: ?Sized>(&self, meter: &T) -> bool {
        let id = identity(meter as *const T);
        let removed = self.shared.meters.write().remove(&id).is_some();
        if removed {
            trace!("deregistered meter");
        }
        removed
    }

    /// Starts the ticking thread, if it is not already running.
    ///
    /// ## Errors
    ///
    /// If the arbiter was built with [`ArbiterBuilder::build_manual`], or the thread cannot be
    /// spawned, an error variant will be returned.
    pub fn start(&self) -> Result<(), ArbiterError> {
        if *self.shared.state.lock() == LoopState::Manual {
            return Err(ArbiterError::ManuallyDriven);
        }

        self.ensure_running()
    }

    fn ensure_running(&self) -> Result<(), ArbiterError> {
        let mut state = self.shared.state.lock();
        if *state != LoopState::Idle {
            return Ok(());
        }

        let shared = Arc::downgrade(&self.shared);
        let interval = self.shared.tick_interval;
        thread::Builder::new()
            .name(self.shared.thread_name.clone())
            .spawn(move || run(shared, interval))?;

        *state = LoopState::Running;
        debug!(?interval, "meter arbiter started");
        Ok(())
    }

    /// Ticks every registered meter once.
    ///
    /// This is what the ticking thread runs on every interval.  Passes never overlap: concurrent
    /// callers wait for the pass in progress to finish.  A meter that panics while being ticked is
    /// skipped for the remainder of the pass, and does not prevent the other meters from being
    /// ticked.  Entries whose meter has been dropped without deregistering are removed.
    pub fn tick(&self) {
        let _pass = self.shared.pass.lock();
        let now = self.shared.clock.now();

        // Meters upgraded for this pass are released only once the read lock is gone: dropping the
        // last reference to a meter deregisters it, which needs the write lock.
        let mut live = Vec::new();
        let mut dead = Vec::new();
        {
            let meters = self.shared.meters.read();
            live.reserve(meters.len());
            for (id, meter) in meters.iter() {
                let Some(meter) = meter.upgrade() else {
                    dead.push(*id);
                    continue;
                };
                if panic::catch_unwind(AssertUnwindSafe(|| meter.tick(now))).is_err() {
                    warn!("meter panicked while ticking, skipping it for this pass");
                }
                live.push(meter);
            }
        }
        drop(live);

        if !dead.is_empty() {
            self.prune(&dead);
        }
    }

    /// Removes the given entries, if their meter is still gone.
    ///
    /// A dead entry keeps its allocation alive, so no other meter can have taken its address.
    fn prune(&self, ids: &[usize]) {
        let mut meters = self.shared.meters.write();
        let mut pruned = 0;
        for id in ids {
            if meters.get(id).is_some_and(|meter| meter.strong_count() == 0) {
                meters.remove(id);
                pruned += 1;
            }
        }
        if pruned > 0 {
            trace!(pruned, total = meters.len(), "pruned dropped meters");
        }
    }

    /// Gets the number of registered meters.
    pub fn len(&self) -> usize {
        self.shared.meters.read().len()
    }

    /// Whether or not no meters are registered.
    pub fn is_empty(&self) -> bool {
        self.shared.meters.read().is_empty()
    }

    /// Whether or not the ticking thread has been started.
    pub fn is_running(&self) -> bool {
        *self.shared.state.lock() == LoopState::Running
    }

    /// Gets the tick interval.
    pub fn tick_interval(&self) -> Duration {
        self.shared.tick_interval
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.shared.clock
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("meters", &self.len())
            .field("state", &*self.shared.state.lock())
            .field("tick_interval", &self.shared.tick_interval)
            .finish_non_exhaustive()
    }
}

fn run(shared: Weak<Shared>, interval: Duration) {
    let mut next = std::time::Instant::now() + interval;
    loop {
        let now = std::time::Instant::now();
        if next > now {
            thread::sleep(next - now);
        }

        match shared.upgrade() {
            Some(shared) => Arbiter { shared }.tick(),
            None => {
                debug!("meter arbiter dropped, ticking thread exiting");
                return;
            }
        }

        // Missed ticks are skipped rather than fired back to back.
        next += interval;
        let now = std::time::Instant::now();
        if next <= now {
            next = now + interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use approx::assert_relative_eq;
    use quanta::{Clock, Instant};

    use super::{Arbiter, ArbiterBuilder, ArbiterError, Tick};
    use crate::MeterFn;

    #[derive(Default)]
    struct CountingTick(AtomicUsize);

    impl Tick for CountingTick {
        fn tick(&self, _now: Instant) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingTick;

    impl Tick for PanickingTick {
        fn tick(&self, _now: Instant) {
            panic!("tick failed");
        }
    }

    fn manual_arbiter() -> (Arbiter, Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        (ArbiterBuilder::new().with_clock(clock).build_manual(), mock)
    }

    #[test]
    fn ticks_each_registered_once_per_pass() {
        let (arbiter, _mock) = manual_arbiter();
        let first = Arc::new(CountingTick::default());
        let second = Arc::new(CountingTick::default());
        arbiter.register(&first);
        arbiter.register(&second);
        // Registering twice does not tick twice.
        arbiter.register(&first);
        assert_eq!(arbiter.len(), 2);

        arbiter.tick();
        arbiter.tick();
        assert_eq!(first.0.load(Ordering::SeqCst), 2);
        assert_eq!(second.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deregister_is_idempotent() {
        let (arbiter, _mock) = manual_arbiter();
        let ticked = Arc::new(CountingTick::default());
        arbiter.register(&ticked);

        assert!(arbiter.deregister(&*ticked));
        assert!(!arbiter.deregister(&*ticked));
        assert!(arbiter.is_empty());

        arbiter.tick();
        assert_eq!(ticked.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_tick_is_harmless() {
        let (arbiter, _mock) = manual_arbiter();
        arbiter.tick();
        assert!(arbiter.is_empty());
    }

    #[test]
    fn dead_references_are_pruned() {
        let (arbiter, _mock) = manual_arbiter();
        let kept = Arc::new(CountingTick::default());
        arbiter.register(&kept);

        // Plain `Tick` implementors do not deregister on drop: the next pass removes them.
        for _ in 0..1_000 {
            let ticked = Arc::new(CountingTick::default());
            arbiter.register(&ticked);
            drop(ticked);
            arbiter.tick();
            assert_eq!(arbiter.len(), 1);
        }
        assert_eq!(kept.0.load(Ordering::SeqCst), 1_000);
    }

    #[test]
    fn meter_registered_twice_is_pruned_from_other_arbiter() {
        let (arbiter, _mock) = manual_arbiter();
        let (other, _other_mock) = manual_arbiter();
        let meter = arbiter.standard_meter();
        other.register(&meter);
        assert_eq!(other.len(), 1);

        // Dropping only deregisters from the arbiter the meter was created by.
        drop(meter);
        assert!(arbiter.is_empty());
        assert_eq!(other.len(), 1);

        other.tick();
        assert!(other.is_empty());
    }

    #[test]
    fn panicking_meter_is_isolated() {
        let (arbiter, mock) = manual_arbiter();
        let bad = Arc::new(PanickingTick);
        let counting = Arc::new(CountingTick::default());
        let meter = arbiter.standard_meter();
        arbiter.register(&bad);
        arbiter.register(&counting);

        meter.mark(10);
        mock.increment(Duration::from_secs(5));
        arbiter.tick();
        arbiter.tick();

        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
        assert!(meter.rate1() > 0.0);
        assert_eq!(arbiter.len(), 3);
    }

    #[test]
    fn stopped_meter_is_no_longer_ticked() {
        let (arbiter, mock) = manual_arbiter();
        let first = arbiter.standard_meter();
        let second = arbiter.standard_meter();

        first.mark(10);
        second.mark(10);
        mock.increment(Duration::from_secs(5));
        arbiter.tick();
        assert_relative_eq!(first.rate1(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(second.rate1(), 2.0, epsilon = 1e-9);

        first.stop();
        assert_eq!(arbiter.len(), 1);

        let frozen = first.rate1();
        let mut previous = second.rate1();
        for _ in 0..5 {
            mock.increment(Duration::from_secs(5));
            arbiter.tick();
            assert!(second.rate1() < previous);
            previous = second.rate1();
        }
        assert_eq!(first.rate1(), frozen);
    }

    #[test]
    fn manual_arbiter_never_starts() {
        let (arbiter, _mock) = manual_arbiter();
        let _meter = arbiter.standard_meter();
        assert!(!arbiter.is_running());
        assert!(matches!(arbiter.start(), Err(ArbiterError::ManuallyDriven)));
    }

    #[test]
    fn first_registration_starts_once() {
        let arbiter = ArbiterBuilder::new().build();
        assert!(!arbiter.is_running());

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let meter = arbiter.standard_meter();
                    meter.mark(1);
                    meter.stop();
                });
            }
        });

        assert!(arbiter.is_running());
        assert!(arbiter.is_empty());
        assert!(arbiter.start().is_ok());
    }
}
