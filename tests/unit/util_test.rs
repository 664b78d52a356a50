//! Tests for clock sources and telemetry helpers

use prometheus_looper::core::MessagePrinter;
use prometheus_looper::util::{
    init_tracing, uptime_ms, Clock, ManualClock, MonotonicClock, TracingPrinter,
};
use std::time::Duration;

#[test]
fn test_monotonic_clock_advances() {
    let clock = MonotonicClock;
    let first = clock.uptime_ms();
    std::thread::sleep(Duration::from_millis(5));
    let second = clock.uptime_ms();
    assert!(second >= first + 5);
    assert!(uptime_ms() >= second);
}

#[test]
fn test_manual_clock_never_goes_backwards() {
    let clock = ManualClock::new(100);
    assert_eq!(clock.advance(50), 150);
    clock.set(120);
    assert_eq!(clock.uptime_ms(), 150);
    clock.set(400);
    assert_eq!(clock.uptime_ms(), 400);
}

#[test]
fn test_tracing_printer_without_subscriber() {
    init_tracing();
    let printer = TracingPrinter::new("util");
    printer.println("<<<<< Finished to util message");
}
