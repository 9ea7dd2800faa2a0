use metrics_meter::{meters_enabled, new_meter, set_meters_enabled, ArbiterBuilder};

// Toggling the process-wide switch would race with any other test creating meters, so this lives
// in its own test binary, as a single test.
#[test]
fn process_wide_switch() {
    assert!(meters_enabled());
    let before = new_meter();
    assert!(!before.is_noop());

    set_meters_enabled(false);
    assert!(!meters_enabled());

    let disabled = new_meter();
    assert!(disabled.is_noop());
    disabled.mark(10);
    assert_eq!(disabled.count(), 0);
    assert_eq!(disabled.rate1(), 0.0);
    assert!(disabled.snapshot().is_noop());
    disabled.stop();

    // Dedicated arbiters honor the switch as well.
    let arbiter = ArbiterBuilder::new().build_manual();
    assert!(arbiter.meter().is_noop());
    assert!(arbiter.is_empty());

    // Meters created beforehand keep working.
    before.mark(2);
    assert_eq!(before.count(), 2);

    set_meters_enabled(true);
    let after = new_meter();
    assert!(!after.is_noop());
    after.mark(1);
    assert_eq!(after.count(), 1);

    before.stop();
    after.stop();
}
