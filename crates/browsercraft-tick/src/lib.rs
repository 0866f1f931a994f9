//! Fixed-interval tick scheduler for Browsercraft lobbies.
//!
//! A scheduler is single-use: it starts [`Idle`](TickState::Idle), runs once
//! [`started`](TickScheduler::start), and after [`stop`](TickScheduler::stop)
//! it stays [`Stopped`](TickState::Stopped) for good.
//!
//! # Drift
//!
//! When a deadline has already passed by the time the scheduler is polled
//! (the previous tick ran long, or the runtime was busy), the tick fires
//! immediately and the following deadline is measured from that moment.
//! Missed ticks are never replayed and two ticks never overlap.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         tick = scheduler.wait_for_tick() => {
//!             let frame = intake.drain_all(&registry);
//!             let snapshot = sim.advance(&frame, tick.dt);
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Shortest interval [`TickScheduler::start`] accepts (1 kHz).
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Longest interval [`TickScheduler::start`] accepts.
pub const MAX_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    #[error("tick scheduler is already running")]
    AlreadyRunning,

    #[error("tick scheduler was stopped and cannot be restarted")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    Running,
    Stopped,
}

/// Budget monitoring and startup settings.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Fraction of the interval (0.0–1.0) above which a tick logs a warning.
    pub budget_warn_threshold: f64,
    pub budget_critical_threshold: f64,
    pub metrics_enabled: bool,
    /// Upper bound of the random delay (µs) added to the first deadline, so
    /// lobbies created together do not tick in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    /// Clamps thresholds into `0.0..=1.0` with warn ≤ critical.
    pub fn validated(mut self) -> Self {
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        self
    }
}

/// Interval for a tick rate. A rate of zero maps to [`MAX_INTERVAL`].
pub fn interval_from_hz(tick_rate_hz: u32) -> Duration {
    if tick_rate_hz == 0 {
        return MAX_INTERVAL;
    }
    clamp_interval(Duration::from_secs_f64(1.0 / f64::from(tick_rate_hz)))
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_INTERVAL, MAX_INTERVAL)
}

/// Returned by [`TickScheduler::wait_for_tick`] for every tick that fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// Always the configured interval, never the measured wall time.
    pub dt: Duration,
    /// The tick fired more than 10% of an interval after its deadline.
    pub overrun: bool,
    pub late_by: Duration,
}

/// Timing of the simulation work reported through
/// [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    /// Exponential moving average (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last tick's work time over the interval. Above 1.0 means overrun.
    pub budget_utilization: f64,
}

/// Drives one lobby's fixed-rate loop.
pub struct TickScheduler {
    config: TickConfig,
    state: TickState,
    interval: Duration,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    /// Set when a tick fires, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        Self {
            config: config.validated(),
            state: TickState::Idle,
            interval: Duration::ZERO,
            tick_count: 0,
            next_tick: None,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Starts firing every `interval`, clamped to
    /// `[MIN_INTERVAL, MAX_INTERVAL]`.
    pub fn start(&mut self, interval: Duration) -> Result<(), TickError> {
        match self.state {
            TickState::Running => return Err(TickError::AlreadyRunning),
            TickState::Stopped => return Err(TickError::Stopped),
            TickState::Idle => {}
        }

        let clamped = clamp_interval(interval);
        if clamped != interval {
            warn!(
                requested_ms = interval.as_secs_f64() * 1000.0,
                clamped_ms = clamped.as_secs_f64() * 1000.0,
                "tick interval out of range, clamping"
            );
        }

        let jitter = if self.config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..self.config.initial_jitter_us))
        } else {
            Duration::ZERO
        };

        self.interval = clamped;
        self.next_tick = Some(TokioInstant::now() + clamped + jitter);
        self.state = TickState::Running;
        debug!(
            interval_ms = clamped.as_secs_f64() * 1000.0,
            jitter_us = jitter.as_micros() as u64,
            "tick scheduler started"
        );
        Ok(())
    }

    /// Stops the scheduler for good. Idempotent.
    pub fn stop(&mut self) {
        if self.state != TickState::Stopped {
            debug!(tick = self.tick_count, "tick scheduler stopped");
        }
        self.state = TickState::Stopped;
        self.next_tick = None;
        self.tick_start = None;
    }

    /// Waits for the next deadline. Pends forever unless the scheduler is
    /// running, which makes it safe as a `select!` branch in any state.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let next = match (self.state, self.next_tick) {
            (TickState::Running, Some(next)) => next,
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        let interval = self.interval;
        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > interval / 10;

        self.next_tick = Some(if late_by.is_zero() {
            next + interval
        } else {
            now + interval
        });
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        if overrun {
            self.metrics.total_overruns += 1;
            warn!(
                tick = self.tick_count,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick fired late, rescheduling from now"
            );
        }
        self.metrics.total_ticks += 1;
        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: interval,
            overrun,
            late_by,
        }
    }

    /// Marks the end of the work for the tick that just fired, feeding the
    /// budget warnings and metrics. A call without a preceding tick is ignored.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= self.config.budget_critical_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.interval.as_secs_f64() * 1000.0,
                "tick exceeded its budget"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            debug!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick close to its budget"
            );
        }

        if self.config.metrics_enabled {
            self.metrics.max_tick_time = self.metrics.max_tick_time.max(elapsed);
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            self.metrics.avg_tick_time =
                Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
        }
    }

    pub fn state(&self) -> TickState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TickState::Running
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The interval while running.
    pub fn interval(&self) -> Option<Duration> {
        self.is_running().then_some(self.interval)
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
