//! Event meters with exponentially-weighted moving average rates.
//!
//! A meter counts discrete events and derives smoothed event rates from them: one-, five-, and
//! fifteen-minute exponentially-weighted moving averages, the mean rate since the meter was
//! created, and a step rate measured between reads.
//!
//! Meters are built to be marked at a very high frequency from any number of threads while being
//! read concurrently by reporting code.  Marking, and reading the count or the moving averages,
//! never takes a lock.
//!
//! # Ticking
//! Moving averages only change when they are ticked.  Rather than each meter running its own timer,
//! meters are registered with an [`Arbiter`], which ticks every registered meter once per interval
//! (5 seconds, by default) from a single background thread.  [`new_meter`] registers meters with
//! the process-wide arbiter, whose thread is spawned when the first meter is created.
//!
//! Dedicated arbiters can be built with [`ArbiterBuilder`], including ones driven by hand, which
//! pairs well with a mocked [`quanta::Clock`] in tests.
//!
//! # Consistency
//! Every rate is published on its own.  Reading two rates in two separate calls may observe them at
//! slightly different points in time.  [`Meter::snapshot`] refreshes every rate under the meter's
//! lock and returns a read-only copy which never changes afterwards.  Marking a snapshot panics.
//!
//! # Disabling meters
//! When [`set_meters_enabled`] is called with `false`, meters created from that point on are no-op
//! meters.  They expose the same interface, so call sites do not need to change.
//!
//! # Examples
//!
//! ```rust
//! use metrics_meter::new_meter;
//!
//! let meter = new_meter();
//! meter.mark(3);
//! assert_eq!(meter.count(), 3);
//!
//! let snapshot = meter.snapshot();
//! meter.mark(2);
//! assert_eq!(snapshot.count(), 3);
//!
//! meter.stop();
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

use std::sync::atomic::{AtomicBool, Ordering};

mod arbiter;
pub use self::arbiter::{Arbiter, ArbiterBuilder, ArbiterError, Tick};

mod atomics;

pub mod ewma;

mod handles;
pub use self::handles::{Meter, MeterFn};

mod meter;
pub use self::meter::StandardMeter;

mod noop;
pub use self::noop::NoopMeter;

mod snapshot;
pub use self::snapshot::MeterSnapshot;

static METERS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Sets whether or not newly created meters are clocked.
///
/// When disabled, [`new_meter`] and [`Arbiter::meter`] return no-op meters.  Meters created
/// beforehand are unaffected.
pub fn set_meters_enabled(enabled: bool) {
    METERS_ENABLED.store(enabled, Ordering::Release);
}

/// Whether or not newly created meters are clocked.
pub fn meters_enabled() -> bool {
    METERS_ENABLED.load(Ordering::Acquire)
}

/// Creates a meter ticked by the process-wide [`Arbiter`].
///
/// Call [`Meter::stop`] once the meter is no longer of use, or drop every handle to it, so that it
/// is no longer ticked.
pub fn new_meter() -> Meter {
    Arbiter::global().meter()
}
