use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::telemetry::StatsReport;

/// Running statistics of a load driver.
///
/// Workers record each request result, the reporter takes
/// a [`StatsReport`] on a fixed interval. Throughput and failure
/// rate cover the time since the previous report, the average
/// response time covers the whole run.
#[derive(Debug)]
pub struct DriverStats {
    active_users: AtomicU64,
    window_requests: AtomicU64,
    window_failures: AtomicU64,
    total_requests: AtomicU64,
    total_response_time_us: AtomicU64,
    window_start: Mutex<Instant>,
}

impl Default for DriverStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverStats {
    pub fn new() -> Self {
        Self {
            active_users: AtomicU64::new(0),
            window_requests: AtomicU64::new(0),
            window_failures: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            window_start: Mutex::new(Instant::now()),
        }
    }

    pub fn user_started(&self) {
        self.active_users.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_stopped(&self) {
        let _ = self
            .active_users
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn active_users(&self) -> u64 {
        self.active_users.load(Ordering::Relaxed)
    }

    pub fn record(&self, response_time: Duration, failed: bool) {
        self.window_requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.window_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(
            u64::try_from(response_time.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Take a report and start a new window.
    pub fn take_report(&self) -> StatsReport {
        self.take_report_at(Instant::now())
    }

    fn take_report_at(&self, now: Instant) -> StatsReport {
        let elapsed = {
            let mut window_start = self.window_start.lock();
            let elapsed = now.saturating_duration_since(*window_start);
            *window_start = now;
            elapsed.as_secs_f64()
        };

        let requests = self.window_requests.swap(0, Ordering::Relaxed);
        let failures = self.window_failures.swap(0, Ordering::Relaxed);

        let per_second = |count: u64| {
            if elapsed > 0. {
                count as f64 / elapsed
            } else {
                0.
            }
        };

        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let avg_response_time_ms = if total_requests > 0 {
            self.total_response_time_us.load(Ordering::Relaxed) as f64
                / total_requests as f64
                / 1_000.
        } else {
            0.
        };

        StatsReport {
            requests_per_second: per_second(requests),
            failures_per_second: per_second(failures),
            avg_response_time_ms,
            active_users: self.active_users(),
        }
    }
}
