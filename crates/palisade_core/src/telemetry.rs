//! Hook timing and dispatch statistics.
//!
//! Two concerns live here: the per-plugin [`HookTelemetry`] that backs the
//! slow-hook warnings, and the manager-wide [`DispatchMonitor`] that counts
//! broadcasts, returned values, conflicts, and handler failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A single hook call slower than this earns a warning.
pub(crate) const SLOW_HOOK_THRESHOLD: Duration = Duration::from_millis(200);

/// Length of the rolling window behind the average-duration warning.
pub(crate) const HOOK_TIME_WINDOW: Duration = Duration::from_secs(10);

/// What one recorded sample asks the dispatcher to warn about.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct TimingReport {
    /// Set when the single call exceeded [`SLOW_HOOK_THRESHOLD`].
    pub slow_call: Option<Duration>,
    /// Set when a window closed with a mean call duration over the
    /// threshold; carries that mean.
    pub window_average: Option<Duration>,
}

#[derive(Default)]
struct TimingState {
    per_hook: HashMap<String, Duration>,
    total: Duration,
    window_started: Option<Instant>,
    window_sum: Duration,
    window_calls: u32,
}

/// Per-plugin hook timing.
///
/// Samples are recorded only for non-core plugins at nesting depth zero;
/// the nesting counter lives here so nested `call_hook` invocations never
/// restart the clock.
#[derive(Default)]
pub struct HookTelemetry {
    nesting: AtomicU32,
    state: Mutex<TimingState>,
}

impl HookTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a hook call; returns the nesting depth before entry.
    pub(crate) fn enter(&self) -> u32 {
        self.nesting.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn exit(&self) {
        self.nesting.fetch_sub(1, Ordering::SeqCst);
    }

    /// Current nesting depth.
    pub fn depth(&self) -> u32 {
        self.nesting.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self, hook: &str, duration: Duration) -> TimingReport {
        self.record_at(hook, duration, Instant::now())
    }

    /// Record one completed top-level call as of `now`.
    pub(crate) fn record_at(&self, hook: &str, duration: Duration, now: Instant) -> TimingReport {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        *state.per_hook.entry(hook.to_string()).or_default() += duration;
        state.total += duration;

        let mut report = TimingReport {
            slow_call: (duration > SLOW_HOOK_THRESHOLD).then_some(duration),
            ..TimingReport::default()
        };

        let started = *state.window_started.get_or_insert(now);
        state.window_sum += duration;
        state.window_calls += 1;
        if now.saturating_duration_since(started) >= HOOK_TIME_WINDOW {
            let average = state.window_sum / state.window_calls;
            if average > SLOW_HOOK_THRESHOLD {
                report.window_average = Some(average);
            }
            state.window_started = Some(now);
            state.window_sum = Duration::ZERO;
            state.window_calls = 0;
        }
        report
    }

    /// Cumulative time spent in all of this plugin's hooks.
    pub fn total_hook_time(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total
    }

    /// Cumulative time spent in one hook, if it ever ran.
    pub fn hook_time(&self, hook: &str) -> Option<Duration> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .per_hook
            .get(hook)
            .copied()
    }
}

/// Counters describing manager-level hook dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Broadcasts started, whether or not anyone was subscribed.
    pub hook_calls: u64,
    /// Non-null values collected from subscribers.
    pub values_returned: u64,
    /// Broadcasts that ended in a logged conflict.
    pub conflicts: u64,
    /// Subscriber calls that failed or panicked.
    pub handler_failures: u64,
}

/// Tracks [`DispatchStats`] for one manager.
pub struct DispatchMonitor {
    stats: RwLock<DispatchStats>,
}

impl DispatchMonitor {
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(DispatchStats::default()),
        }
    }

    pub(crate) fn record_call(&self) {
        self.write().hook_calls += 1;
    }

    pub(crate) fn record_returns(&self, count: u64) {
        self.write().values_returned += count;
    }

    pub(crate) fn record_conflict(&self) {
        self.write().conflicts += 1;
    }

    pub(crate) fn record_failure(&self) {
        self.write().handler_failures += 1;
    }

    /// Snapshot the current counters.
    pub fn get_stats(&self) -> DispatchStats {
        self.stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DispatchStats> {
        self.stats.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DispatchMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_single_call_is_reported() {
        let telemetry = HookTelemetry::new();
        let report = telemetry.record("OnTick", Duration::from_millis(250));
        assert_eq!(report.slow_call, Some(Duration::from_millis(250)));

        let report = telemetry.record("OnTick", Duration::from_millis(5));
        assert_eq!(report.slow_call, None);
    }

    #[test]
    fn window_close_reports_high_average() {
        let telemetry = HookTelemetry::new();
        let t0 = Instant::now();

        let report = telemetry.record_at("OnTick", Duration::from_millis(300), t0);
        assert_eq!(report.window_average, None);

        // Window closes on the next sample past the ten-second mark.
        let report =
            telemetry.record_at("OnTick", Duration::from_millis(300), t0 + Duration::from_secs(11));
        assert_eq!(report.window_average, Some(Duration::from_millis(300)));
    }

    #[test]
    fn window_close_is_quiet_when_average_is_low() {
        let telemetry = HookTelemetry::new();
        let t0 = Instant::now();

        // One spike among many fast calls keeps the mean under threshold.
        telemetry.record_at("OnTick", Duration::from_millis(300), t0);
        for _ in 0..9 {
            telemetry.record_at("OnTick", Duration::from_millis(10), t0 + Duration::from_secs(1));
        }
        let report =
            telemetry.record_at("OnTick", Duration::from_millis(10), t0 + Duration::from_secs(11));
        assert_eq!(report.window_average, None);
    }

    #[test]
    fn window_resets_after_close() {
        let telemetry = HookTelemetry::new();
        let t0 = Instant::now();

        telemetry.record_at("OnTick", Duration::from_millis(400), t0);
        telemetry.record_at("OnTick", Duration::from_millis(400), t0 + Duration::from_secs(11));

        // Fresh window: a fast sample well past the old one stays quiet.
        let report = telemetry.record_at(
            "OnTick",
            Duration::from_millis(10),
            t0 + Duration::from_secs(23),
        );
        assert_eq!(report.window_average, None);
    }

    #[test]
    fn per_hook_and_total_times_accumulate() {
        let telemetry = HookTelemetry::new();
        telemetry.record("OnTick", Duration::from_millis(30));
        telemetry.record("OnTick", Duration::from_millis(20));
        telemetry.record("OnSave", Duration::from_millis(10));

        assert_eq!(telemetry.hook_time("OnTick"), Some(Duration::from_millis(50)));
        assert_eq!(telemetry.hook_time("OnSave"), Some(Duration::from_millis(10)));
        assert_eq!(telemetry.hook_time("OnLoad"), None);
        assert_eq!(telemetry.total_hook_time(), Duration::from_millis(60));
    }

    #[test]
    fn nesting_counter_tracks_depth() {
        let telemetry = HookTelemetry::new();
        assert_eq!(telemetry.enter(), 0);
        assert_eq!(telemetry.enter(), 1);
        assert_eq!(telemetry.depth(), 2);
        telemetry.exit();
        telemetry.exit();
        assert_eq!(telemetry.depth(), 0);
    }

    #[test]
    fn dispatch_monitor_counts() {
        let monitor = DispatchMonitor::new();
        monitor.record_call();
        monitor.record_call();
        monitor.record_returns(3);
        monitor.record_conflict();
        monitor.record_failure();

        let stats = monitor.get_stats();
        assert_eq!(stats.hook_calls, 2);
        assert_eq!(stats.values_returned, 3);
        assert_eq!(stats.conflicts, 1);
        assert_eq!(stats.handler_failures, 1);
    }
}
