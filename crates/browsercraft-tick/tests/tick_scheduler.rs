//! Integration tests for the tick scheduler.
//!
//! Time is paused in every async test, so `sleep_until` resolves as soon as
//! the runtime auto-advances the clock to the deadline.

use std::time::Duration;

use browsercraft_tick::{
    MAX_INTERVAL, MIN_INTERVAL, TickConfig, TickError, TickScheduler, TickState, interval_from_hz,
};
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_millis(50);

fn no_jitter() -> TickScheduler {
    TickScheduler::new(TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::default()
    })
}

fn running() -> TickScheduler {
    let mut s = no_jitter();
    s.start(INTERVAL).unwrap();
    s
}

// =========================================================================
// Config
// =========================================================================

#[test]
fn test_interval_from_hz() {
    assert_eq!(interval_from_hz(20), Duration::from_millis(50));
    assert_eq!(interval_from_hz(60), Duration::from_secs_f64(1.0 / 60.0));
    assert_eq!(interval_from_hz(0), MAX_INTERVAL);
    assert_eq!(interval_from_hz(1_000_000), MIN_INTERVAL);
}

#[test]
fn test_validated_orders_thresholds() {
    let cfg = TickConfig {
        budget_warn_threshold: 3.0,
        budget_critical_threshold: 0.5,
        ..TickConfig::default()
    }
    .validated();
    assert_eq!(cfg.budget_critical_threshold, 0.5);
    assert_eq!(cfg.budget_warn_threshold, 0.5);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[test]
fn test_new_scheduler_is_idle() {
    let s = no_jitter();
    assert_eq!(s.state(), TickState::Idle);
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.interval(), None);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_already_running() {
    let mut s = running();
    assert_eq!(s.start(INTERVAL), Err(TickError::AlreadyRunning));
    assert_eq!(s.state(), TickState::Running);
    assert_eq!(s.interval(), Some(INTERVAL));
}

#[tokio::test(start_paused = true)]
async fn test_start_after_stop_fails() {
    let mut s = running();
    s.stop();
    assert_eq!(s.start(INTERVAL), Err(TickError::Stopped));
    assert_eq!(s.state(), TickState::Stopped);
}

#[test]
fn test_stop_from_idle_is_terminal() {
    let mut s = no_jitter();
    s.stop();
    s.stop();
    assert_eq!(s.state(), TickState::Stopped);
    assert_eq!(s.start(INTERVAL), Err(TickError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_start_clamps_interval() {
    let mut s = no_jitter();
    s.start(Duration::ZERO).unwrap();
    assert_eq!(s.interval(), Some(MIN_INTERVAL));
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_scheduler_never_fires() {
    let mut s = no_jitter();
    let result = tokio::time::timeout(Duration::from_secs(5), s.wait_for_tick()).await;
    assert!(result.is_err(), "idle scheduler should pend");
}

#[tokio::test(start_paused = true)]
async fn test_stopped_scheduler_never_fires() {
    let mut s = running();
    s.wait_for_tick().await;
    s.stop();
    let result = tokio::time::timeout(Duration::from_secs(5), s.wait_for_tick()).await;
    assert!(result.is_err(), "stopped scheduler should pend");
    assert_eq!(s.tick_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_numbered_with_fixed_dt() {
    let mut s = running();
    for expected in 1..=5 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(info.dt, INTERVAL);
        assert!(!info.overrun);
        assert_eq!(info.late_by, Duration::ZERO);
    }
    assert_eq!(s.tick_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_on_time_ticks_keep_cadence() {
    let start = Instant::now();
    let mut s = running();
    for _ in 0..4 {
        s.wait_for_tick().await;
    }
    assert_eq!(start.elapsed(), INTERVAL * 4);
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_fires_immediately_without_catch_up() {
    let mut s = running();

    // Miss three deadlines.
    tokio::time::advance(INTERVAL * 3 + Duration::from_millis(20)).await;

    let before = Instant::now();
    let info = s.wait_for_tick().await;
    assert_eq!(before.elapsed(), Duration::ZERO);
    assert_eq!(info.tick, 1);
    assert!(info.overrun);
    assert_eq!(info.late_by, INTERVAL * 2 + Duration::from_millis(20));

    // The next deadline is one interval from the late tick, not a burst.
    let after_late = Instant::now();
    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 2);
    assert!(!info.overrun);
    assert_eq!(after_late.elapsed(), INTERVAL);
    assert_eq!(s.metrics().total_overruns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_only_the_first_tick() {
    let mut s = TickScheduler::new(TickConfig {
        initial_jitter_us: 5_000,
        ..TickConfig::default()
    });
    let start = Instant::now();
    s.start(INTERVAL).unwrap();

    s.wait_for_tick().await;
    let first = start.elapsed();
    assert!(first >= INTERVAL && first < INTERVAL + Duration::from_millis(5));

    let mark = Instant::now();
    s.wait_for_tick().await;
    assert_eq!(mark.elapsed(), INTERVAL);
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_metrics_count_ticks() {
    let mut s = running();
    for _ in 0..3 {
        s.wait_for_tick().await;
        s.record_tick_end();
    }
    let m = s.metrics();
    assert_eq!(m.total_ticks, 3);
    assert_eq!(m.total_overruns, 0);
}

#[test]
fn test_record_without_tick_is_ignored() {
    let mut s = no_jitter();
    s.record_tick_end();
    assert_eq!(s.metrics().max_tick_time, Duration::ZERO);
}
